//! Topic existence check, close ordering and name restore, with jobs recorded instead of run.

mod common;

use std::time::Duration;

use common::{setup_recorded, GROUP_ID};
use desk_core::ApiResponse;
use support_bot::messages;
use support_bot::topic::{TopicLifecycle, MAX_TOPIC_NAME_LENGTH};

/// **Test: Errors other than "topic missing" leave the topic linked.**
///
/// **Setup:** One customer per answer: 403, 429 and 500 to the check message.
/// **Action:** auto_rename, which checks the topic before renaming.
/// **Expected:** The rename is scheduled and `topic_id` is kept in every case.
#[tokio::test]
async fn test_inconclusive_check_keeps_topic() {
    let t = setup_recorded().await;
    let topics = TopicLifecycle::new(t.desk.clone());
    let answers = [
        ApiResponse::failure(403, "Forbidden: not enough rights to send text messages"),
        ApiResponse::rate_limited(10),
        ApiResponse::failure(500, "Internal Server Error"),
    ];

    for (i, answer) in answers.into_iter().enumerate() {
        let topic_id = 700 + i as i64;
        let customer = t.customer_with_topic(600 + i as i64, topic_id).await;
        t.api.script("sendMessage", answer);

        assert!(topics.auto_rename(&customer).await.unwrap());

        let reloaded = t.desk.db.customers.get(customer.id).await.unwrap();
        assert_eq!(reloaded.topic_id, Some(topic_id));
        let renames = t.jobs.queries("editForumTopic");
        assert!(renames
            .iter()
            .any(|(p, _)| p["message_thread_id"] == topic_id));
    }
}

/// **Test: TOPIC_NOT_FOUND and TOPIC_DELETED unlink the topic.**
///
/// **Setup:** Two customers with topics and a stored contact card id.
/// **Action:** auto_rename with the check message answering each "missing" error.
/// **Expected:** No rename; `topic_id` and the card id are cleared.
#[tokio::test]
async fn test_missing_topic_is_unlinked() {
    let t = setup_recorded().await;
    let topics = TopicLifecycle::new(t.desk.clone());
    let answers = [
        "Bad Request: message thread not found",
        "Bad Request: TOPIC_DELETED",
    ];

    for (i, description) in answers.into_iter().enumerate() {
        let topic_id = 800 + i as i64;
        let customer = t.customer_with_topic(610 + i as i64, topic_id).await;
        t.desk
            .db
            .customers
            .set_contact_message_id(customer.id, Some(44))
            .await
            .unwrap();
        t.api
            .script("sendMessage", ApiResponse::failure(400, description));

        assert!(!topics.auto_rename(&customer).await.unwrap());

        let reloaded = t.desk.db.customers.get(customer.id).await.unwrap();
        assert_eq!(reloaded.topic_id, None);
        assert_eq!(reloaded.contact_info_message_id, None);
    }
    assert!(t.jobs.queries("editForumTopic").is_empty());
}

/// **Test: A successful check message is deleted shortly after.**
#[tokio::test]
async fn test_check_message_is_cleaned_up() {
    let t = setup_recorded().await;
    let customer = t.customer_with_topic(620, 900).await;

    assert!(TopicLifecycle::new(t.desk.clone()).exists(&customer).await);

    let check = &t.api.calls("sendMessage")[0];
    assert_eq!(check["chat_id"], GROUP_ID);
    assert_eq!(check["message_thread_id"], 900);
    let deletes = t.jobs.queries("deleteMessage");
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].0["chat_id"], GROUP_ID);
    assert_eq!(deletes[0].1, Duration::from_millis(500));
}

/// **Test: Close notifies the customer, then switches the icon, then closes the topic.**
///
/// **Setup:** Customer with topic 910; outgoing icon configured.
/// **Action:** close.
/// **Expected:** Notice now, icon edit after 1s, closeForumTopic after 2s.
#[tokio::test]
async fn test_close_orders_icon_before_close() {
    let t = setup_recorded().await;
    let customer = t.customer_with_topic(630, 910).await;

    TopicLifecycle::new(t.desk.clone()).close(&customer);

    let notices = t.jobs.queries("sendMessage");
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].0["chat_id"], 630);
    assert_eq!(notices[0].0["text"], messages::TOPIC_CLOSED);
    assert_eq!(notices[0].1, Duration::ZERO);

    let icons = t.jobs.queries("editForumTopic");
    assert_eq!(icons.len(), 1);
    assert_eq!(icons[0].0["icon_custom_emoji_id"], "icon-out");
    assert_eq!(icons[0].0["message_thread_id"], 910);

    let closes = t.jobs.queries("closeForumTopic");
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].0["message_thread_id"], 910);

    assert_eq!(icons[0].1, Duration::from_secs(1));
    assert_eq!(closes[0].1, Duration::from_secs(2));
    assert!(icons[0].1 < closes[0].1);
}

/// **Test: Restoring the default name drops the custom name and renames to the generated one.**
///
/// **Setup:** Customer with custom name "VIP client".
/// **Action:** restore_default_name.
/// **Expected:** Custom flag cleared; `#<id> <name> <phone>` stored and sent.
#[tokio::test]
async fn test_restore_default_name() {
    let t = setup_recorded().await;
    let customer = t.customer_with_topic(640, 920).await;
    t.desk
        .db
        .customers
        .set_custom_topic_name(customer.id, "VIP client")
        .await
        .unwrap();
    let customer = t.desk.db.customers.get(customer.id).await.unwrap();
    assert!(customer.has_custom_topic_name());

    let name = TopicLifecycle::new(t.desk.clone())
        .restore_default_name(&customer)
        .await
        .unwrap();

    let expected = format!("#{} Anna Petrova +375291112233", customer.display_id());
    assert_eq!(name, expected);
    let reloaded = t.desk.db.customers.get(customer.id).await.unwrap();
    assert!(!reloaded.has_custom_topic_name());
    let renames = t.jobs.queries("editForumTopic");
    assert_eq!(renames.len(), 1);
    assert_eq!(renames[0].0["name"], expected.as_str());
    assert_eq!(renames[0].0["message_thread_id"], 920);
}

/// **Test: A restored name longer than the limit is cut, keeping the `#<id>` prefix.**
#[tokio::test]
async fn test_restore_default_name_truncates() {
    let t = setup_recorded().await;
    let customer = t.customer_with_topic(650, 930).await;
    t.desk
        .db
        .customers
        .update_contact_fields(
            customer.id,
            &storage::ContactUpdate::full_name("Aleksandra ".repeat(18)),
        )
        .await
        .unwrap();
    let customer = t.desk.db.customers.get(customer.id).await.unwrap();

    let name = TopicLifecycle::new(t.desk.clone())
        .restore_default_name(&customer)
        .await
        .unwrap();

    assert!(name.chars().count() <= MAX_TOPIC_NAME_LENGTH);
    assert!(name.starts_with(&format!("#{} Aleksandra", customer.display_id())));
    let sent = &t.jobs.queries("editForumTopic")[0].0;
    assert!(sent["name"].as_str().unwrap().chars().count() <= MAX_TOPIC_NAME_LENGTH);
}
