//! Component factory: builds the desk context, handler chain and job worker from config.
//! Isolates assembly from the runner so tests and the CLI can inject their own Bot API.

use std::sync::Arc;

use anyhow::Result;
use desk_core::TelegramApi;
use desk_telegram::HttpTelegramApi;
use handler_chain::HandlerChain;
use storage::Database;
use tracing::{error, info, instrument};

use crate::cache::{KeyValueCache, MemoryCache};
use crate::config::{BotConfig, DeskSettings};
use crate::desk::Desk;
use crate::handlers::{
    BroadcastHandler, CallbackHandler, GroupHandler, LoggingMiddleware, PrivateHandler,
    UpdateFilter,
};
use crate::jobs::{DeskJobHandler, Dispatcher, JobWorker, QueueDispatcher};
use crate::webhook::WebhookState;

/// Everything the service runs: shared context, update chain and the (not yet spawned) worker.
pub struct DeskComponents {
    pub desk: Desk,
    pub chain: Arc<HandlerChain>,
    pub dispatcher: QueueDispatcher,
    pub worker: JobWorker,
}

impl DeskComponents {
    pub fn webhook_state(&self) -> WebhookState {
        WebhookState {
            chain: self.chain.clone(),
            desk: self.desk.clone(),
        }
    }
}

/// Filter and log first, then callbacks, broadcast, group topics and private chats.
pub fn build_handler_chain(desk: &Desk) -> HandlerChain {
    HandlerChain::new()
        .add_middleware(Arc::new(UpdateFilter))
        .add_middleware(Arc::new(LoggingMiddleware))
        .add_handler(Arc::new(CallbackHandler::new(desk.clone())))
        .add_handler(Arc::new(BroadcastHandler::new(desk.clone())))
        .add_handler(Arc::new(GroupHandler::new(desk.clone())))
        .add_handler(Arc::new(PrivateHandler::new(desk.clone())))
}

/// Wires components around an already opened database and a Bot API implementation.
pub fn assemble(api: Arc<dyn TelegramApi>, db: Database, settings: DeskSettings) -> DeskComponents {
    let cache: Arc<dyn KeyValueCache> = Arc::new(MemoryCache::new());
    let (dispatcher, queue) = QueueDispatcher::new();
    let workers = settings.job_workers;
    let jobs: Arc<dyn Dispatcher> = Arc::new(dispatcher.clone());
    let desk = Desk::new(api, db, cache, jobs, settings);

    let chain = Arc::new(build_handler_chain(&desk));
    let worker = JobWorker::new(queue, Arc::new(DeskJobHandler::new(desk.clone())), workers);

    DeskComponents {
        desk,
        chain,
        dispatcher,
        worker,
    }
}

/// Opens storage and the HTTP Bot API client, then assembles.
#[instrument(skip(config))]
pub async fn build_components(config: &BotConfig) -> Result<DeskComponents> {
    let db = Database::connect(config.database_url()).await.map_err(|e| {
        error!(
            error = %e,
            database_url = %config.database_url(),
            "Failed to initialize storage"
        );
        anyhow::anyhow!("Failed to initialize storage: {}", e)
    })?;

    let api: Arc<dyn TelegramApi> = Arc::new(HttpTelegramApi::new(&config.base().telegram())?);
    info!(
        group_id = config.group_id(),
        broadcast_topic = ?config.desk().broadcast_topic.id(),
        workers = config.desk().job_workers,
        "Components built"
    );
    Ok(assemble(api, db, config.desk().clone()))
}
