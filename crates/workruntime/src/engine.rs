use crate::config::RuntimeConfig;
use crate::registry::HandlerRegistry;
use crate::strategy::{Action, StrategyResolver};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use workcore::{
    AbortReason, EngineError, EventBus, FailureSignal, HandlerError, HandlerOutcome,
    ProcessCallback, ProcessFault, Results, WorkItem, WorkItemContext, WorkItemEvent,
    WorkItemHandler, WorkItemId, WorkItemState,
};

/// Dispatches work items to handlers and reports their outcome.
///
/// Every started item runs on its own Tokio task and receives exactly one
/// terminal callback. Cloning is cheap; clones share the same engine.
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    registry: Arc<HandlerRegistry>,
    callback: Arc<dyn ProcessCallback>,
    resolver: StrategyResolver,
    event_bus: Arc<EventBus>,
    in_flight: Mutex<HashMap<WorkItemId, InFlight>>,
    in_flight_count: watch::Sender<usize>,
    permits: Arc<Semaphore>,
    attempt_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl ExecutionEngine {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        callback: Arc<dyn ProcessCallback>,
        config: &RuntimeConfig,
    ) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        Self::with_event_bus(registry, callback, event_bus, config)
    }

    pub fn with_event_bus(
        registry: Arc<HandlerRegistry>,
        callback: Arc<dyn ProcessCallback>,
        event_bus: Arc<EventBus>,
        config: &RuntimeConfig,
    ) -> Self {
        let (in_flight_count, _) = watch::channel(0);
        Self {
            inner: Arc::new(EngineInner {
                registry,
                callback,
                resolver: StrategyResolver::new(config.retry.clone(), config.on_retry_exhausted),
                event_bus,
                in_flight: Mutex::new(HashMap::new()),
                in_flight_count,
                permits: Arc::new(Semaphore::new(config.max_concurrent_items.max(1))),
                attempt_timeout: config.attempt_timeout_ms.map(Duration::from_millis),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Schedule `item` for execution.
    ///
    /// Returns as soon as the item is accepted; the outcome arrives through
    /// the process callback. Must be called from within a Tokio runtime.
    pub fn start_work_item(&self, item: WorkItem) -> Result<ExecutionHandle, EngineError> {
        if item.state() != WorkItemState::Created {
            return Err(EngineError::NotDispatchable {
                id: item.id,
                state: item.state(),
            });
        }
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }

        let work_item_id = item.id;
        let cancellation = self.inner.shutdown.child_token();
        {
            let mut in_flight = self.inner.lock_in_flight();
            if in_flight.contains_key(&work_item_id) {
                return Err(EngineError::AlreadyActive(work_item_id));
            }
            in_flight.insert(
                work_item_id,
                InFlight {
                    cancellation: cancellation.clone(),
                    settled: false,
                },
            );
            self.inner.in_flight_count.send_replace(in_flight.len());
        }

        tracing::info!(
            work_item_id = %work_item_id,
            work_item_type = %item.work_item_type,
            process_instance_id = %item.process_instance_id(),
            "Work item accepted"
        );

        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            work_item_id,
        };
        let token = cancellation.clone();
        let join = tokio::spawn(async move {
            let state = guard.inner.run(item, token).await;
            drop(guard);
            state
        });

        Ok(ExecutionHandle {
            work_item_id,
            cancellation,
            join,
        })
    }

    /// Request cooperative cancellation of an in-flight item.
    ///
    /// The handler observes the request through `ctx.cancellation`; once its
    /// current invocation returns, the item is aborted with
    /// `AbortReason::Requested`. Items that already reached a terminal state
    /// are reported as `NotActive`.
    pub fn abort_work_item(&self, work_item_id: WorkItemId) -> Result<(), EngineError> {
        let in_flight = self.inner.lock_in_flight();
        let entry = in_flight
            .get(&work_item_id)
            .filter(|entry| !entry.settled)
            .ok_or(EngineError::NotActive(work_item_id))?;
        tracing::info!(work_item_id = %work_item_id, "Abort requested");
        entry.cancellation.cancel();
        Ok(())
    }

    /// Cancel every in-flight item and wait until all have been settled.
    /// New items are rejected afterwards.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down execution engine");
        self.inner.shutdown.cancel();
        let mut count = self.inner.in_flight_count.subscribe();
        let _ = count.wait_for(|n| *n == 0).await;
    }

    pub fn is_active(&self, work_item_id: WorkItemId) -> bool {
        self.inner
            .lock_in_flight()
            .get(&work_item_id)
            .is_some_and(|entry| !entry.settled)
    }

    pub fn active_items(&self) -> Vec<WorkItemId> {
        self.inner
            .lock_in_flight()
            .iter()
            .filter(|(_, entry)| !entry.settled)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.inner.registry
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<WorkItemEvent> {
        self.inner.event_bus.subscribe()
    }
}

impl EngineInner {
    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashMap<WorkItemId, InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark an item terminal; it stays in the table until its task ends.
    fn settle(&self, work_item_id: WorkItemId) {
        if let Some(entry) = self.lock_in_flight().get_mut(&work_item_id) {
            entry.settled = true;
        }
    }

    /// Wait for a concurrency permit, or `None` once the item is cancelled.
    async fn acquire_permit(&self, cancellation: &CancellationToken) -> Option<OwnedSemaphorePermit> {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        }
    }

    /// Run the handler's cleanup hook; a panic there is logged and swallowed
    /// so the terminal callback is still delivered.
    async fn run_abort_hook(&self, handler: &dyn WorkItemHandler, item: &WorkItem) {
        if let Err(panic) = AssertUnwindSafe(handler.abort(item)).catch_unwind().await {
            tracing::error!(
                work_item_id = %item.id,
                "Abort hook panicked: {}",
                panic_message(panic.as_ref())
            );
        }
    }

    /// Drive one item from `Created` to a terminal state.
    async fn run(&self, mut item: WorkItem, cancellation: CancellationToken) -> WorkItemState {
        let started = Instant::now();

        let mut permit = self.acquire_permit(&cancellation).await;

        if let Err(e) = item.transition_to(WorkItemState::Active) {
            tracing::error!("Cannot activate work item: {}", e);
            return item.state();
        }

        self.event_bus.emit(WorkItemEvent::WorkItemStarted {
            work_item_id: item.id,
            process_instance_id: item.process_instance_id(),
            work_item_type: item.work_item_type.clone(),
            timestamp: Utc::now(),
        });

        if permit.is_none() {
            self.finish_aborted(&mut item, AbortReason::Requested, None).await;
            return item.state();
        }

        let handler = match self.registry.lookup(&item.work_item_type) {
            Ok(handler) => handler,
            Err(e) => {
                tracing::warn!(work_item_id = %item.id, "{}", e);
                let reason = AbortReason::UnknownHandler {
                    work_item_type: item.work_item_type.clone(),
                };
                self.finish_aborted(&mut item, reason, None).await;
                return item.state();
            }
        };

        let mut attempt = 1;
        loop {
            let outcome = self
                .invoke(handler.as_ref(), &item, attempt, &cancellation)
                .await;

            if cancellation.is_cancelled() {
                self.finish_aborted(&mut item, AbortReason::Requested, Some(handler.as_ref()))
                    .await;
                break;
            }

            let signal = match outcome {
                Ok(results) => {
                    self.finish_completed(&mut item, results, attempt, started).await;
                    break;
                }
                Err(signal) => signal,
            };

            tracing::warn!(
                work_item_id = %item.id,
                attempt,
                strategy = ?signal.strategy,
                "Attempt failed: {}",
                signal
            );
            self.event_bus.emit(WorkItemEvent::AttemptFailed {
                work_item_id: item.id,
                attempt,
                code: signal.code.clone(),
                message: signal.message.clone(),
                timestamp: Utc::now(),
            });

            match self.resolver.resolve(&item, attempt, signal) {
                Action::Retry {
                    next_attempt,
                    delay,
                } => {
                    if let Err(e) = item.transition_to(WorkItemState::Active) {
                        tracing::error!("Cannot retry work item: {}", e);
                        break;
                    }
                    self.event_bus.emit(WorkItemEvent::RetryScheduled {
                        work_item_id: item.id,
                        next_attempt,
                        delay_ms: delay.as_millis() as u64,
                        timestamp: Utc::now(),
                    });

                    // Other items may run during the backoff
                    drop(permit.take());
                    let cancelled = tokio::select! {
                        _ = tokio::time::sleep(delay) => false,
                        _ = cancellation.cancelled() => true,
                    };
                    if !cancelled {
                        permit = self.acquire_permit(&cancellation).await;
                    }
                    if permit.is_none() {
                        self.finish_aborted(
                            &mut item,
                            AbortReason::Requested,
                            Some(handler.as_ref()),
                        )
                        .await;
                        break;
                    }
                    attempt = next_attempt;
                }
                Action::AbortItem(reason) => {
                    self.finish_aborted(&mut item, reason, Some(handler.as_ref()))
                        .await;
                    break;
                }
                Action::AbortProcess(fault) | Action::Propagate(fault) => {
                    self.finish_failed(&mut item, fault, handler.as_ref()).await;
                    break;
                }
                Action::CompleteWithError(results) => {
                    self.finish_completed(&mut item, results, attempt, started).await;
                    break;
                }
            }
        }

        item.state()
    }

    /// Run one handler invocation inside the failure boundary.
    ///
    /// Undeclared errors, panics and timeouts all become `Rethrow` signals.
    async fn invoke(
        &self,
        handler: &dyn WorkItemHandler,
        item: &WorkItem,
        attempt: u32,
        cancellation: &CancellationToken,
    ) -> Result<Results, FailureSignal> {
        self.event_bus.emit(WorkItemEvent::AttemptStarted {
            work_item_id: item.id,
            attempt,
            timestamp: Utc::now(),
        });

        let ctx = WorkItemContext::new(item.clone(), attempt, self.event_bus.create_emitter(item.id))
            .with_cancellation(cancellation.clone());
        let guarded = AssertUnwindSafe(handler.execute(ctx)).catch_unwind();

        let result = match self.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(result) => result,
                Err(_) => Ok(Err(HandlerError::Timeout {
                    millis: limit.as_millis() as u64,
                })),
            },
            None => guarded.await,
        };

        match result {
            Ok(Ok(HandlerOutcome::Completed(results))) => Ok(results),
            Ok(Ok(HandlerOutcome::Failed(signal))) => Err(signal),
            Ok(Err(e)) => {
                tracing::error!(work_item_id = %item.id, attempt, "Handler fault: {}", e);
                Err(FailureSignal::from(e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(work_item_id = %item.id, attempt, "Handler panicked: {}", message);
                Err(FailureSignal::from(HandlerError::Panicked(message)))
            }
        }
    }

    async fn finish_completed(
        &self,
        item: &mut WorkItem,
        results: Results,
        attempts: u32,
        started: Instant,
    ) {
        if let Err(e) = item.transition_to(WorkItemState::Completed) {
            tracing::error!("Dropping completion: {}", e);
            return;
        }
        self.settle(item.id);
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(work_item_id = %item.id, attempts, "Work item completed in {}ms", duration_ms);

        self.event_bus.emit(WorkItemEvent::WorkItemCompleted {
            work_item_id: item.id,
            attempts,
            duration_ms,
            timestamp: Utc::now(),
        });
        self.callback.complete(item, results).await;
    }

    async fn finish_aborted(
        &self,
        item: &mut WorkItem,
        reason: AbortReason,
        handler: Option<&dyn WorkItemHandler>,
    ) {
        if let Err(e) = item.transition_to(WorkItemState::Aborted) {
            tracing::error!("Dropping abort: {}", e);
            return;
        }
        self.settle(item.id);
        tracing::warn!(work_item_id = %item.id, "Work item aborted: {}", reason);

        if let Some(handler) = handler {
            self.run_abort_hook(handler, item).await;
        }
        self.event_bus.emit(WorkItemEvent::WorkItemAborted {
            work_item_id: item.id,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        self.callback.abort(item, reason).await;
    }

    async fn finish_failed(
        &self,
        item: &mut WorkItem,
        fault: ProcessFault,
        handler: &dyn WorkItemHandler,
    ) {
        if let Err(e) = item.transition_to(WorkItemState::Aborted) {
            tracing::error!("Dropping failure: {}", e);
            return;
        }
        self.settle(item.id);
        tracing::error!(work_item_id = %item.id, "Work item failed: {}", fault);

        self.run_abort_hook(handler, item).await;
        self.event_bus.emit(WorkItemEvent::WorkItemFailed {
            work_item_id: item.id,
            code: fault.signal.code.clone(),
            message: fault.signal.message.clone(),
            timestamp: Utc::now(),
        });
        self.callback.fail(item, fault).await;
    }
}

struct InFlight {
    cancellation: CancellationToken,
    settled: bool,
}

/// Removes the item from the in-flight table when its task ends, panicking
/// or not.
struct InFlightGuard {
    inner: Arc<EngineInner>,
    work_item_id: WorkItemId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.inner.lock_in_flight();
        in_flight.remove(&self.work_item_id);
        self.inner.in_flight_count.send_replace(in_flight.len());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Handle for one dispatched work item
pub struct ExecutionHandle {
    pub work_item_id: WorkItemId,
    cancellation: CancellationToken,
    join: JoinHandle<WorkItemState>,
}

impl ExecutionHandle {
    /// Request cooperative cancellation; see [`ExecutionEngine::abort_work_item`].
    pub fn abort(&self) {
        self.cancellation.cancel();
    }

    /// Wait for the item to settle and return its final state
    pub async fn wait(self) -> Result<WorkItemState, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::Execution(format!("Task join error: {}", e)))
    }
}
