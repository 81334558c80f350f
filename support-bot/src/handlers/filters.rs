//! Middleware: drop updates the desk never acts on, and log the rest.

use async_trait::async_trait;
use desk_core::{HandlerResponse, InboundUpdate, Middleware, Result, UpdateKind};
use tracing::{debug, info, instrument};

/// Drops pinned-message service updates, edited messages and unsupported update kinds.
pub struct UpdateFilter;

#[async_trait]
impl Middleware for UpdateFilter {
    async fn before(&self, update: &InboundUpdate) -> Result<bool> {
        let drop_reason = if update.is_pinned {
            Some("pinned")
        } else if update.is_edited || update.kind == UpdateKind::EditedMessage {
            Some("edited")
        } else if update.kind == UpdateKind::Other {
            Some("unsupported")
        } else {
            None
        };
        match drop_reason {
            Some(reason) => {
                debug!(update_id = update.update_id, reason, "Update dropped");
                Ok(false)
            }
            None => Ok(true),
        }
    }
}

/// Logs each update on entry and the chain's response on exit.
pub struct LoggingMiddleware;

#[async_trait]
impl Middleware for LoggingMiddleware {
    #[instrument(skip(self, update))]
    async fn before(&self, update: &InboundUpdate) -> Result<bool> {
        info!(
            update_id = update.update_id,
            chat_id = update.chat_id,
            thread_id = ?update.thread_id,
            from = ?update.from.as_ref().map(|u| u.id),
            kind = ?update.kind,
            "Received update"
        );
        Ok(true)
    }

    #[instrument(skip(self, update, response))]
    async fn after(&self, update: &InboundUpdate, response: &HandlerResponse) -> Result<()> {
        debug!(update_id = update.update_id, response = ?response, "Processed update");
        Ok(())
    }
}
