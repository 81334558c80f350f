//! Integration tests for [`handler_chain::HandlerChain`].
//!
//! Covers: before/after ordering, handler before stopping the chain, Stop ending the handle phase,
//! middleware dropping an update, and a failing handler not aborting the chain.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use desk_core::{
    DeskError, Handler, HandlerResponse, InboundUpdate, Middleware, SourceType, UpdateKind,
};
use handler_chain::HandlerChain;

fn create_test_update(text: &str) -> InboundUpdate {
    let mut update = InboundUpdate::new(1001, UpdateKind::Message, SourceType::Private, 456);
    update.message_id = Some(7);
    update.text = Some(text.to_string());
    update
}

struct CountingHandler {
    handle_count: Arc<AtomicUsize>,
    response: HandlerResponse,
}

#[async_trait::async_trait]
impl Handler for CountingHandler {
    async fn handle(&self, _update: &InboundUpdate) -> desk_core::Result<HandlerResponse> {
        self.handle_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

struct OrderRecorder {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait::async_trait]
impl Handler for OrderRecorder {
    async fn before(&self, _update: &InboundUpdate) -> desk_core::Result<bool> {
        self.log.lock().unwrap().push(format!("before:{}", self.name));
        Ok(true)
    }

    async fn after(
        &self,
        _update: &InboundUpdate,
        _response: &HandlerResponse,
    ) -> desk_core::Result<()> {
        self.log.lock().unwrap().push(format!("after:{}", self.name));
        Ok(())
    }
}

/// **Test: Before hooks run first to last, after hooks last to first.**
///
/// **Setup:** Two recording handlers `a` and `b`.
/// **Action:** `chain.handle(&update)`.
/// **Expected:** Log is before:a, before:b, after:b, after:a; response is Continue.
#[tokio::test]
async fn test_before_after_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let chain = HandlerChain::new()
        .add_handler(Arc::new(OrderRecorder {
            name: "a",
            log: log.clone(),
        }))
        .add_handler(Arc::new(OrderRecorder {
            name: "b",
            log: log.clone(),
        }));

    let result = chain.handle(&create_test_update("hi")).await.unwrap();

    assert_eq!(result, HandlerResponse::Continue);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["before:a", "before:b", "after:b", "after:a"]
    );
}

/// **Test: Handler before returns false stops the chain; handle is not run.**
///
/// **Setup:** One blocking handler (before returns false), one counting handler.
/// **Action:** `chain.handle(&update)`.
/// **Expected:** result is Stop; handle_count=0.
#[tokio::test]
async fn test_handler_before_stops_chain() {
    struct BlockingHandler;

    #[async_trait::async_trait]
    impl Handler for BlockingHandler {
        async fn before(&self, _update: &InboundUpdate) -> desk_core::Result<bool> {
            Ok(false)
        }
    }

    let handle_count = Arc::new(AtomicUsize::new(0));
    let chain = HandlerChain::new()
        .add_handler(Arc::new(BlockingHandler))
        .add_handler(Arc::new(CountingHandler {
            handle_count: handle_count.clone(),
            response: HandlerResponse::Continue,
        }));

    let result = chain.handle(&create_test_update("test")).await.unwrap();

    assert_eq!(result, HandlerResponse::Stop);
    assert_eq!(handle_count.load(Ordering::SeqCst), 0);
}

/// **Test: Stop from the first handler skips later handlers.**
///
/// **Setup:** Handler returning Stop, then a counting handler.
/// **Action:** `chain.handle(&update)`.
/// **Expected:** result is Stop; second handler never runs.
#[tokio::test]
async fn test_stop_ends_handle_phase() {
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let chain = HandlerChain::new()
        .add_handler(Arc::new(CountingHandler {
            handle_count: first.clone(),
            response: HandlerResponse::Stop,
        }))
        .add_handler(Arc::new(CountingHandler {
            handle_count: second.clone(),
            response: HandlerResponse::Continue,
        }));

    let result = chain.handle(&create_test_update("test")).await.unwrap();

    assert_eq!(result, HandlerResponse::Stop);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 0);
}

/// **Test: A handler error is swallowed and the next handler still runs.**
///
/// **Setup:** Failing handler, then a counting handler returning Stop.
/// **Action:** `chain.handle(&update)`.
/// **Expected:** Ok(Stop); counting handler ran once.
#[tokio::test]
async fn test_failing_handler_does_not_abort_chain() {
    struct FailingHandler;

    #[async_trait::async_trait]
    impl Handler for FailingHandler {
        async fn handle(&self, _update: &InboundUpdate) -> desk_core::Result<HandlerResponse> {
            Err(DeskError::Unknown("boom".to_string()))
        }
    }

    let count = Arc::new(AtomicUsize::new(0));
    let chain = HandlerChain::new()
        .add_handler(Arc::new(FailingHandler))
        .add_handler(Arc::new(CountingHandler {
            handle_count: count.clone(),
            response: HandlerResponse::Stop,
        }));

    let result = chain.handle(&create_test_update("test")).await.unwrap();

    assert_eq!(result, HandlerResponse::Stop);
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

/// **Test: Middleware returning false drops the update before any handler.**
///
/// **Setup:** Middleware rejecting pinned updates; counting handler.
/// **Action:** handle a pinned update, then a normal one.
/// **Expected:** First call returns Stop with no handler run; second call runs the handler.
#[tokio::test]
async fn test_middleware_drops_update() {
    struct SkipPinned;

    #[async_trait::async_trait]
    impl Middleware for SkipPinned {
        async fn before(&self, update: &InboundUpdate) -> desk_core::Result<bool> {
            Ok(!update.is_pinned)
        }
    }

    let count = Arc::new(AtomicUsize::new(0));
    let chain = HandlerChain::new()
        .add_middleware(Arc::new(SkipPinned))
        .add_handler(Arc::new(CountingHandler {
            handle_count: count.clone(),
            response: HandlerResponse::Continue,
        }));

    let mut pinned = create_test_update("");
    pinned.is_pinned = true;
    assert_eq!(chain.handle(&pinned).await.unwrap(), HandlerResponse::Stop);
    assert_eq!(count.load(Ordering::SeqCst), 0);

    chain.handle(&create_test_update("hello")).await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
}
