//! Operator actions. Each runs against a live desk; queued side effects are drained by the caller.

use anyhow::{bail, Context, Result};
use desk_core::Platform;
use desk_telegram::{CommandRegistrar, CommandScope};
use storage::Customer;
use support_bot::broadcast::{BroadcastFanout, TopicSetup};
use support_bot::jobs::JobOutcome;
use support_bot::topic::TopicLifecycle;
use support_bot::{BotConfig, Desk};

use crate::cli::{BroadcastAction, CommandsAction, CustomerSelector, TopicAction};
use crate::menus::{group_menu, private_menu};

pub async fn find_customer(desk: &Desk, selector: CustomerSelector) -> Result<Customer> {
    let customer = match (selector.user_id, selector.chat_id) {
        (Some(id), _) => desk.db.customers.find_by_id(id).await?,
        (None, Some(chat_id)) => {
            desk.db
                .customers
                .find_by_chat(Platform::Telegram, chat_id)
                .await?
        }
        (None, None) => bail!("one of --user-id, --chat-id or --all is required"),
    };
    customer.context("customer not found")
}

pub async fn topic(desk: &Desk, action: TopicAction) -> Result<()> {
    let topics = TopicLifecycle::new(desk.clone());
    match action {
        TopicAction::Delete { customer, cascade } => {
            let customer = find_customer(desk, customer).await?;
            topics.delete(&customer, cascade).await?;
            if cascade {
                println!("Customer {} deleted with topic and messages.", customer.id);
            } else {
                println!("Topic of customer {} deleted and unlinked.", customer.id);
            }
        }
        TopicAction::Recreate { customer } => {
            let customer = find_customer(desk, customer).await?;
            let topic_id = topics.recreate(&customer).await?;
            println!("Customer {} now uses topic {}.", customer.id, topic_id);
        }
        TopicAction::Restore {
            user_id,
            chat_id,
            all,
        } => {
            if all {
                let count = topics.restore_missing().await?;
                println!("Topic creation scheduled for {} customer(s).", count);
                return Ok(());
            }
            let customer = find_customer(desk, CustomerSelector { user_id, chat_id }).await?;
            if let Some(topic_id) = customer.topic_id {
                println!("Customer {} already has topic {}.", customer.id, topic_id);
                return Ok(());
            }
            match topics.create(customer.id).await {
                JobOutcome::Done => {
                    let topic_id = desk.customer(customer.id).await?.topic_id;
                    println!("Customer {} now uses topic {:?}.", customer.id, topic_id);
                }
                other => bail!("topic not created: {:?}", other),
            }
        }
    }
    Ok(())
}

pub async fn broadcast(desk: &Desk, action: BroadcastAction) -> Result<()> {
    let fanout = BroadcastFanout::new(desk.clone());
    match action {
        BroadcastAction::Status { batch, limit } => {
            let batches = fanout.status(batch.as_deref(), limit).await?;
            if batches.is_empty() {
                println!("No broadcast batches.");
                return Ok(());
            }
            println!(
                "{:<36} {:<20} {:<12} {:>6} {:>9} {:>6} {:>7} {}",
                "id", "created", "method", "total", "delivered", "failed", "pending", "state"
            );
            println!("{}", "-".repeat(120));
            for b in &batches {
                let state = if b.cancelled {
                    "cancelled"
                } else if b.is_finished() {
                    "finished"
                } else {
                    "running"
                };
                println!(
                    "{:<36} {:<20} {:<12} {:>6} {:>9} {:>6} {:>7} {}",
                    b.id,
                    b.created_at.format("%Y-%m-%d %H:%M:%S"),
                    b.method,
                    b.total,
                    b.delivered,
                    b.failed,
                    b.pending(),
                    state
                );
            }
        }
        BroadcastAction::Cancel { batch } => {
            if fanout.cancel(&batch).await? {
                println!("Broadcast {} cancelled.", batch);
            } else {
                println!("Broadcast {} not found or already cancelled.", batch);
            }
        }
        BroadcastAction::Check => {
            let topic = desk.settings.broadcast_topic;
            match topic.id() {
                Some(id) => println!("Broadcast topic: {} in group {}", id, desk.group_id()),
                None => println!("Broadcast disabled: TELEGRAM_BROADCAST_TOPIC_ID unset or invalid."),
            }
            let recipients = desk.db.customers.broadcast_recipients().await?;
            println!("Eligible recipients: {}", recipients.len());
        }
        BroadcastAction::Setup { name, force } => {
            match fanout
                .setup_topic(&name, force)
                .await
                .context("creating broadcast topic")?
            {
                TopicSetup::Existing(id) => {
                    println!("Broadcast topic already configured: {}", id);
                    println!("Use --force to create a new one.");
                }
                TopicSetup::Created(id) => {
                    println!("Broadcast topic \"{}\" created in group {}.", name.trim(), desk.group_id());
                    println!("Add to your environment:");
                    println!("TELEGRAM_BROADCAST_TOPIC_ID={}", id);
                }
            }
        }
    }
    Ok(())
}

pub async fn commands(config: &BotConfig, action: CommandsAction) -> Result<()> {
    let registrar = CommandRegistrar::new(&config.base().telegram())?;
    let group = CommandScope::Chat(config.group_id());
    match action {
        CommandsAction::Set => {
            registrar
                .set_commands(CommandScope::AllPrivateChats, &private_menu())
                .await?;
            registrar.set_commands(group, &group_menu()).await?;
            println!("Command menus registered.");
        }
        CommandsAction::Show => {
            for (label, scope) in [("Private chats", CommandScope::AllPrivateChats), ("Support group", group)] {
                let commands = registrar.get_commands(scope).await?;
                println!("{} ({}):", label, commands.len());
                for c in commands {
                    println!("  /{:<20} {}", c.command, c.description);
                }
            }
        }
    }
    Ok(())
}
