// Shared helpers for runtime integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use workcore::{
    ChannelCallback, HandlerError, HandlerOutcome, Termination, WorkItem, WorkItemContext,
    WorkItemHandler,
};
use workruntime::{ExecutionEngine, HandlerRegistry, RuntimeConfig};

type Behaviour = dyn Fn(u32, &WorkItem) -> Result<HandlerOutcome, HandlerError> + Send + Sync;

/// Handler whose outcome is computed by a closure over (attempt, item).
pub struct ScriptedHandler {
    work_item_type: String,
    behaviour: Box<Behaviour>,
    pub executions: AtomicU32,
    pub aborts: AtomicU32,
}

impl ScriptedHandler {
    pub fn new(
        work_item_type: &str,
        behaviour: impl Fn(u32, &WorkItem) -> Result<HandlerOutcome, HandlerError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            work_item_type: work_item_type.to_string(),
            behaviour: Box::new(behaviour),
            executions: AtomicU32::new(0),
            aborts: AtomicU32::new(0),
        })
    }

    pub fn executions(&self) -> u32 {
        self.executions.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> u32 {
        self.aborts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkItemHandler for ScriptedHandler {
    fn work_item_type(&self) -> &str {
        &self.work_item_type
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        self.executions.fetch_add(1, Ordering::SeqCst);
        (self.behaviour)(ctx.attempt, &ctx.item)
    }

    async fn abort(&self, _item: &workcore::WorkItem) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handler that parks until its item is cancelled, then reports cancellation.
pub struct ParkingHandler {
    pub started: tokio::sync::Notify,
    pub aborts: AtomicU32,
}

impl ParkingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: tokio::sync::Notify::new(),
            aborts: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl WorkItemHandler for ParkingHandler {
    fn work_item_type(&self) -> &str {
        "park"
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        self.started.notify_one();
        ctx.cancellation.cancelled().await;
        Err(HandlerError::Cancelled)
    }

    async fn abort(&self, _item: &workcore::WorkItem) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

pub fn engine_with(
    handler: Arc<dyn WorkItemHandler>,
    config: RuntimeConfig,
) -> (ExecutionEngine, UnboundedReceiver<Termination>) {
    init_tracing();
    let registry = Arc::new(HandlerRegistry::new());
    registry.register(handler).expect("register handler");
    let (callback, terminations) = ChannelCallback::channel();
    let engine = ExecutionEngine::new(registry, Arc::new(callback), &config);
    (engine, terminations)
}

/// Config with a fast retry policy
pub fn fast_config(max_attempts: u32) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.retry.max_attempts = max_attempts;
    config.retry.delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config
}

pub async fn next_termination(terminations: &mut UnboundedReceiver<Termination>) -> Termination {
    tokio::time::timeout(Duration::from_secs(5), terminations.recv())
        .await
        .expect("termination within 5s")
        .expect("callback channel open")
}

/// Assert nothing else arrives shortly after
pub async fn assert_no_more(terminations: &mut UnboundedReceiver<Termination>) {
    let extra = tokio::time::timeout(Duration::from_millis(50), terminations.recv()).await;
    assert!(extra.is_err(), "unexpected extra termination: {:?}", extra);
}
