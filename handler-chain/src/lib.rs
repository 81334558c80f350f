//! # Handler chain
//!
//! Runs a sequence of middleware (before/after) and handlers for each inbound update. Middleware can
//! drop the update; the first handler that returns Stop ends handler execution; after callbacks run in
//! reverse order. A failing handler is logged and the chain keeps going, so one broken step never
//! prevents the webhook from being acknowledged.

use desk_core::{Handler, HandlerResponse, InboundUpdate, Middleware, Result};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Chain of middleware and handlers: middleware run in order (before), then handlers; middleware after run in reverse order.
#[derive(Clone, Default)]
pub struct HandlerChain {
    middleware: Vec<Arc<dyn Middleware>>,
    handlers: Vec<Arc<dyn Handler>>,
}

impl HandlerChain {
    /// Creates an empty chain (no middleware, no handlers).
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a middleware (runs before handlers, after in reverse).
    pub fn add_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Appends a handler (runs in order; first Stop ends handler phase).
    pub fn add_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs middleware before, handler before, handlers, then all after hooks in reverse.
    /// Returns Stop if any step consumed the update, Continue otherwise.
    #[instrument(skip(self, update), fields(update_id = update.update_id, chat_id = update.chat_id))]
    pub async fn handle(&self, update: &InboundUpdate) -> Result<HandlerResponse> {
        info!(
            kind = ?update.kind,
            source = ?update.source,
            thread_id = ?update.thread_id,
            "step: handler_chain started"
        );

        for mw in &self.middleware {
            let mw_name = std::any::type_name_of_val(mw.as_ref());
            if !mw.before(update).await? {
                info!(middleware = %mw_name, "step: middleware before returned false, chain stopped");
                return Ok(HandlerResponse::Stop);
            }
            debug!(middleware = %mw_name, "step: middleware before done");
        }

        for handler in &self.handlers {
            let handler_name = std::any::type_name_of_val(handler.as_ref());
            if !handler.before(update).await? {
                info!(handler = %handler_name, "step: handler before returned false, chain stopped");
                return Ok(HandlerResponse::Stop);
            }
        }

        let mut final_response = HandlerResponse::Continue;
        for handler in &self.handlers {
            let handler_name = std::any::type_name_of_val(handler.as_ref());
            let response = match handler.handle(update).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(handler = %handler_name, error = %e, "step: handler failed, continuing");
                    HandlerResponse::Ignore
                }
            };
            debug!(handler = %handler_name, response = ?response, "step: handler done");

            if response == HandlerResponse::Stop {
                info!(handler = %handler_name, "step: handler chain stopped by handler");
                final_response = response;
                break;
            }
        }

        for handler in self.handlers.iter().rev() {
            handler.after(update, &final_response).await?;
        }
        for mw in self.middleware.iter().rev() {
            mw.after(update, &final_response).await?;
        }

        info!(response = ?final_response, "step: handler_chain finished");
        Ok(final_response)
    }
}

// Tests live in tests/handler_chain_test.rs
