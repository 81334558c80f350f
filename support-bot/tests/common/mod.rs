//! Shared fixtures: a scripted Bot API fake and a fully wired desk on a temp SQLite file.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use desk_core::{
    ApiResponse, InboundUpdate, Platform, SourceType, TelegramApi, UpdateKind, User,
};
use handler_chain::HandlerChain;
use serde_json::{json, Value};
use storage::{ContactUpdate, Customer, CustomerProfile, Database};
use support_bot::cache::MemoryCache;
use support_bot::config::{BroadcastTopic, DeskSettings, TopicIcons};
use support_bot::jobs::{QueueDispatcher, RecordingDispatcher};
use support_bot::{assemble, Desk, WebhookState};
use tempfile::TempDir;

pub const GROUP_ID: i64 = -1001234567890;
pub const BROADCAST_TOPIC: i64 = 77;
pub const MANAGER_ID: i64 = 9001;

/// Bot API fake: records every call, answers from per-method scripts, succeeds otherwise.
///
/// Default answers carry a fresh `message_id`; `createForumTopic` also gets a fresh
/// `message_thread_id`, and sends into a topic echo the thread id back.
pub struct FakeTelegramApi {
    calls: Mutex<Vec<(String, Value)>>,
    scripts: Mutex<HashMap<String, VecDeque<ApiResponse>>>,
    next_id: AtomicI64,
}

impl FakeTelegramApi {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1000),
        }
    }

    /// Queues one answer for the next call of `method`.
    pub fn script(&self, method: &str, response: ApiResponse) {
        self.scripts
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls(method).len()
    }

    /// `sendMessage` calls whose text equals `text`.
    pub fn sent_texts(&self, text: &str) -> Vec<Value> {
        self.calls("sendMessage")
            .into_iter()
            .filter(|p| p["text"] == text)
            .collect()
    }
}

#[async_trait]
impl TelegramApi for FakeTelegramApi {
    async fn send_query(&self, method: &str, params: Value) -> ApiResponse {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        if method == "createForumTopic" {
            // Widens the window for concurrent creators.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        match method {
            "createForumTopic" => ApiResponse::success(json!({
                "message_thread_id": id,
                "name": params["name"],
                "icon_color": 7322096,
            })),
            m if m.starts_with("send") => ApiResponse::success(json!({
                "message_id": id,
                "message_thread_id": params.get("message_thread_id"),
            })),
            _ => ApiResponse::success(json!(true)),
        }
    }
}

/// Desk wired to [`FakeTelegramApi`] with a running job worker.
pub struct TestDesk {
    pub api: Arc<FakeTelegramApi>,
    pub desk: Desk,
    pub chain: Arc<HandlerChain>,
    pub dispatcher: QueueDispatcher,
    _dir: TempDir,
}

pub fn settings() -> DeskSettings {
    DeskSettings {
        group_id: GROUP_ID,
        broadcast_topic: BroadcastTopic::new(BROADCAST_TOPIC),
        webhook_secret: Some("s3cret".to_string()),
        icons: TopicIcons {
            incoming: Some("icon-in".to_string()),
            outgoing: Some("icon-out".to_string()),
            successful: None,
        },
        job_workers: 4,
    }
}

pub async fn setup() -> TestDesk {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("desk.db");
    let db = Database::connect(path.to_str().unwrap())
        .await
        .expect("open database");
    let api = Arc::new(FakeTelegramApi::new());
    let components = assemble(api.clone(), db, settings());
    let chain = components.chain.clone();
    let desk = components.desk.clone();
    let dispatcher = components.dispatcher.clone();
    components.worker.spawn();
    TestDesk {
        api,
        desk,
        chain,
        dispatcher,
        _dir: dir,
    }
}

impl TestDesk {
    pub fn webhook_state(&self) -> WebhookState {
        WebhookState {
            chain: self.chain.clone(),
            desk: self.desk.clone(),
        }
    }

    /// Runs one update through the chain and waits for every job it caused.
    pub async fn deliver(&self, update: &InboundUpdate) {
        self.chain.handle(update).await.expect("chain");
        self.settle().await;
    }

    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(30), self.dispatcher.wait_idle())
            .await
            .expect("jobs did not settle");
    }

    pub async fn customer(&self, id: i64) -> Customer {
        self.desk.db.customers.get(id).await.expect("customer")
    }

    /// Telegram customer with all contact fields filled in.
    pub async fn registered_customer(&self, chat_id: i64) -> Customer {
        let customer = self
            .desk
            .db
            .customers
            .get_or_create(Platform::Telegram, chat_id, &profile("Anna"))
            .await
            .unwrap();
        self.desk
            .db
            .customers
            .update_contact_fields(
                customer.id,
                &ContactUpdate {
                    full_name: Some("Anna Petrova".into()),
                    phone_number: Some("+375291112233".into()),
                    email: Some("anna@example.com".into()),
                },
            )
            .await
            .unwrap()
    }
}

/// Desk whose jobs are only recorded, for asserting what gets scheduled and when.
pub struct RecordedDesk {
    pub api: Arc<FakeTelegramApi>,
    pub desk: Desk,
    pub jobs: Arc<RecordingDispatcher>,
    _dir: TempDir,
}

pub async fn setup_recorded() -> RecordedDesk {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("recorded.db");
    let db = Database::connect(path.to_str().unwrap())
        .await
        .expect("open database");
    let api = Arc::new(FakeTelegramApi::new());
    let jobs = Arc::new(RecordingDispatcher::new());
    let desk = Desk::new(
        api.clone(),
        db,
        Arc::new(MemoryCache::new()),
        jobs.clone(),
        settings(),
    );
    RecordedDesk {
        api,
        desk,
        jobs,
        _dir: dir,
    }
}

impl RecordedDesk {
    /// Registered Telegram customer linked to `topic_id`.
    pub async fn customer_with_topic(&self, chat_id: i64, topic_id: i64) -> Customer {
        let customers = &self.desk.db.customers;
        let customer = customers
            .get_or_create(Platform::Telegram, chat_id, &profile("Anna"))
            .await
            .unwrap();
        customers
            .update_contact_fields(
                customer.id,
                &ContactUpdate {
                    full_name: Some("Anna Petrova".into()),
                    phone_number: Some("+375291112233".into()),
                    email: Some("anna@example.com".into()),
                },
            )
            .await
            .unwrap();
        customers.set_topic_id(customer.id, topic_id).await.unwrap();
        customers.get(customer.id).await.unwrap()
    }
}

pub fn profile(first_name: &str) -> CustomerProfile {
    CustomerProfile {
        username: Some(format!("{}_user", first_name.to_lowercase())),
        first_name: Some(first_name.to_string()),
        last_name: None,
    }
}

pub fn private_text(update_id: i64, chat_id: i64, text: &str) -> InboundUpdate {
    let mut update = InboundUpdate::new(update_id, UpdateKind::Message, SourceType::Private, chat_id);
    update.message_id = Some(update_id * 10);
    update.from = Some(User {
        id: chat_id,
        is_bot: false,
        username: Some("anna_user".into()),
        first_name: Some("Anna".into()),
        last_name: None,
    });
    update.text = Some(text.to_string());
    update
}

pub fn topic_text(update_id: i64, topic_id: i64, text: &str) -> InboundUpdate {
    let mut update =
        InboundUpdate::new(update_id, UpdateKind::Message, SourceType::Supergroup, GROUP_ID);
    update.message_id = Some(update_id * 10);
    update.thread_id = Some(topic_id);
    update.from = Some(User {
        id: MANAGER_ID,
        is_bot: false,
        username: Some("manager".into()),
        first_name: Some("Max".into()),
        last_name: None,
    });
    update.text = Some(text.to_string());
    update
}
