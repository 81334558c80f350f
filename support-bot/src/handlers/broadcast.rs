//! Broadcast topic messages; runs before the topic relay so they never reach a customer topic.

use async_trait::async_trait;
use desk_core::{Handler, HandlerResponse, InboundUpdate, Result, UpdateKind};
use tracing::instrument;

use crate::broadcast::BroadcastFanout;
use crate::desk::Desk;

pub struct BroadcastHandler {
    fanout: BroadcastFanout,
}

impl BroadcastHandler {
    pub fn new(desk: Desk) -> Self {
        Self {
            fanout: BroadcastFanout::new(desk),
        }
    }
}

#[async_trait]
impl Handler for BroadcastHandler {
    #[instrument(skip(self, update), fields(update_id = update.update_id))]
    async fn handle(&self, update: &InboundUpdate) -> Result<HandlerResponse> {
        if update.kind != UpdateKind::Message || !self.fanout.is_broadcast(update) {
            return Ok(HandlerResponse::Continue);
        }
        self.fanout.handle(update).await?;
        Ok(HandlerResponse::Stop)
    }
}
