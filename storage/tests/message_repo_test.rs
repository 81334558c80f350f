//! Integration tests for [`storage::MessageRepository`].

use desk_core::Platform;
use storage::{CustomerProfile, Database, MessageDirection, MessageRecord};
use tempfile::TempDir;

async fn setup_test_db() -> (Database, TempDir, i64) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("desk.db");
    let db = Database::connect(path.to_str().unwrap())
        .await
        .expect("open database");
    let customer = db
        .customers
        .get_or_create(Platform::Telegram, 100, &CustomerProfile::default())
        .await
        .expect("customer");
    (db, dir, customer.id)
}

/// **Test: Saved message can be read back by id with every field intact.**
///
/// **Setup:** One customer.
/// **Action:** Save an outgoing photo record; load by id.
/// **Expected:** All fields equal the saved record.
#[tokio::test]
async fn test_save_and_get_by_id() {
    let (db, _dir, customer_id) = setup_test_db().await;
    let record = MessageRecord::new(
        customer_id,
        MessageDirection::Outgoing,
        "photo",
        "caption",
        Some(10),
        Some(20),
    );

    db.messages.save(&record).await.unwrap();
    let loaded = db.messages.get_message_by_id(&record.id).await.unwrap().unwrap();

    assert_eq!(loaded.customer_id, customer_id);
    assert_eq!(loaded.direction, "outgoing");
    assert_eq!(loaded.message_type, "photo");
    assert_eq!(loaded.content, "caption");
    assert_eq!(loaded.source_message_id, Some(10));
    assert_eq!(loaded.delivered_message_id, Some(20));
}

/// **Test: has_incoming only counts customer-originated messages.**
///
/// **Setup:** One customer with a single outgoing message.
/// **Action:** Check has_incoming before and after logging an incoming message.
/// **Expected:** false, then true.
#[tokio::test]
async fn test_has_incoming() {
    let (db, _dir, customer_id) = setup_test_db().await;
    let outgoing = MessageRecord::new(customer_id, MessageDirection::Outgoing, "text", "reply", None, None);
    db.messages.save(&outgoing).await.unwrap();
    assert!(!db.messages.has_incoming(customer_id).await.unwrap());

    let incoming = MessageRecord::new(customer_id, MessageDirection::Incoming, "text", "hello", Some(1), Some(2));
    db.messages.save(&incoming).await.unwrap();
    assert!(db.messages.has_incoming(customer_id).await.unwrap());
}

/// **Test: recent_for_customer honours the limit and returns newest first.**
///
/// **Setup:** Three messages saved in order.
/// **Action:** `recent_for_customer(id, 2)`.
/// **Expected:** Two records, the last saved first; count is 3.
#[tokio::test]
async fn test_recent_for_customer() {
    let (db, _dir, customer_id) = setup_test_db().await;
    for (i, text) in ["one", "two", "three"].iter().enumerate() {
        let record = MessageRecord::new(customer_id, MessageDirection::Incoming, "text", *text, Some(i as i64), None);
        db.messages.save(&record).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let recent = db.messages.recent_for_customer(customer_id, 2).await.unwrap();

    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].content, "three");
    assert_eq!(recent[1].content, "two");
    assert_eq!(db.messages.count_for_customer(customer_id).await.unwrap(), 3);
}
