use crate::{engine::ExecutionEngine, registry::HandlerRegistry, RuntimeConfig};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;
use workcore::{
    AbortReason, ChannelCallback, EngineError, FailureSignal, ProcessDefinition, ProcessError,
    ProcessFault, ProcessInstanceId, ProcessStatus, Termination, Value, WorkItem, WorkItemEvent,
    WorkItemId,
};

/// Final state of a process instance
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub instance_id: ProcessInstanceId,
    pub process_id: String,
    pub status: ProcessStatus,
    /// Output variables as selected by the definition
    pub variables: HashMap<String, Value>,
    pub fault: Option<ProcessFault>,
    pub abort_reason: Option<AbortReason>,
}

/// Minimal sequential process runtime driving the execution engine.
///
/// Each task of a definition becomes one work item; results are merged into
/// the instance variables and the next task is dispatched when the previous
/// one completes.
pub struct ProcessRuntime {
    engine: ExecutionEngine,
    definitions: RwLock<HashMap<String, Arc<ProcessDefinition>>>,
    instances: Arc<Mutex<HashMap<ProcessInstanceId, Instance>>>,
    driver: JoinHandle<()>,
}

struct Instance {
    definition: Arc<ProcessDefinition>,
    variables: HashMap<String, Value>,
    next_task: usize,
    current_item: Option<WorkItemId>,
    abort_requested: bool,
    done: Option<oneshot::Sender<ProcessOutcome>>,
}

type Instances = Mutex<HashMap<ProcessInstanceId, Instance>>;

impl ProcessRuntime {
    /// Create a runtime with the given registry. Must be called from within
    /// a Tokio runtime.
    pub fn new(registry: Arc<HandlerRegistry>, config: RuntimeConfig) -> Self {
        let (callback, terminations) = ChannelCallback::channel();
        let engine = ExecutionEngine::new(registry, Arc::new(callback), &config);
        let instances: Arc<Instances> = Arc::new(Mutex::new(HashMap::new()));

        let driver = tokio::spawn(drive(terminations, engine.clone(), Arc::clone(&instances)));

        Self {
            engine,
            definitions: RwLock::new(HashMap::new()),
            instances,
            driver,
        }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        self.engine.registry()
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<WorkItemEvent> {
        self.engine.subscribe_events()
    }

    /// Register a process definition; ids must be unique
    pub async fn register_definition(&self, definition: ProcessDefinition) -> Result<(), ProcessError> {
        definition.validate()?;
        let mut definitions = self.definitions.write().await;
        if definitions.contains_key(&definition.id) {
            return Err(ProcessError::Duplicate(definition.id));
        }
        tracing::info!("Registering process definition: {} ({})", definition.name, definition.id);
        definitions.insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    pub async fn definition(&self, process_id: &str) -> Option<Arc<ProcessDefinition>> {
        self.definitions.read().await.get(process_id).cloned()
    }

    pub async fn definitions(&self) -> Vec<Arc<ProcessDefinition>> {
        let mut list: Vec<_> = self.definitions.read().await.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Start an instance of `process_id` with the given initial variables
    pub async fn start_process(
        &self,
        process_id: &str,
        variables: HashMap<String, Value>,
    ) -> Result<ProcessHandle, EngineError> {
        let definition = self
            .definition(process_id)
            .await
            .ok_or_else(|| ProcessError::NotFound(process_id.to_string()))?;

        let instance_id = Uuid::new_v4();
        let (done, receiver) = oneshot::channel();

        tracing::info!(process_instance_id = %instance_id, "Starting process: {}", definition.id);

        let mut instances = lock(&self.instances);
        instances.insert(
            instance_id,
            Instance {
                definition,
                variables,
                next_task: 0,
                current_item: None,
                abort_requested: false,
                done: Some(done),
            },
        );
        advance(&self.engine, &mut instances, instance_id);

        Ok(ProcessHandle {
            instance_id,
            receiver,
        })
    }

    /// Start an instance and wait for it to finish
    pub async fn run_process(
        &self,
        process_id: &str,
        variables: HashMap<String, Value>,
    ) -> Result<ProcessOutcome, EngineError> {
        self.start_process(process_id, variables).await?.outcome().await
    }

    /// Abort the work item currently executing for an instance; the instance
    /// ends `Aborted` once the item settles, whatever its outcome.
    pub fn abort_process(&self, instance_id: ProcessInstanceId) -> Result<(), EngineError> {
        let current = {
            let mut instances = lock(&self.instances);
            let instance = instances
                .get_mut(&instance_id)
                .ok_or_else(|| ProcessError::NotFound(instance_id.to_string()))?;
            instance.abort_requested = true;
            instance.current_item
        };
        match current {
            // Already settled; the driver sees the flag when the termination arrives
            Some(work_item_id) => match self.engine.abort_work_item(work_item_id) {
                Err(EngineError::NotActive(_)) => Ok(()),
                other => other,
            },
            None => Ok(()),
        }
    }

    pub fn active_instances(&self) -> usize {
        lock(&self.instances).len()
    }
}

impl Drop for ProcessRuntime {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Handle for one running process instance
pub struct ProcessHandle {
    pub instance_id: ProcessInstanceId,
    receiver: oneshot::Receiver<ProcessOutcome>,
}

impl ProcessHandle {
    pub async fn outcome(self) -> Result<ProcessOutcome, EngineError> {
        self.receiver
            .await
            .map_err(|_| EngineError::Process(ProcessError::Dropped))
    }
}

fn lock(instances: &Instances) -> std::sync::MutexGuard<'_, HashMap<ProcessInstanceId, Instance>> {
    instances.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn drive(
    mut terminations: mpsc::UnboundedReceiver<Termination>,
    engine: ExecutionEngine,
    instances: Arc<Instances>,
) {
    while let Some(termination) = terminations.recv().await {
        let mut table = lock(&instances);
        on_termination(&engine, &mut table, termination);
    }
}

fn on_termination(
    engine: &ExecutionEngine,
    instances: &mut HashMap<ProcessInstanceId, Instance>,
    termination: Termination,
) {
    let instance_id = termination.item().process_instance_id();
    let Some(instance) = instances.get_mut(&instance_id) else {
        tracing::warn!(process_instance_id = %instance_id, "Termination for unknown process instance");
        return;
    };
    if instance.current_item != Some(termination.item().id) {
        tracing::warn!(
            process_instance_id = %instance_id,
            work_item_id = %termination.item().id,
            "Termination for a work item the instance is not waiting on"
        );
        return;
    }
    instance.current_item = None;
    let definition = Arc::clone(&instance.definition);
    let task = &definition.tasks[instance.next_task];

    match termination {
        Termination::Completed { results, .. } => {
            if task.outputs.is_empty() {
                instance.variables.extend(results);
            } else {
                for (result, variable) in &task.outputs {
                    let value = results.get(result).cloned().unwrap_or(Value::Null);
                    instance.variables.insert(variable.clone(), value);
                }
            }
            instance.next_task += 1;
        }
        Termination::Aborted { reason, .. } => {
            if instance.abort_requested || !task.continue_on_abort {
                finish(instances, instance_id, ProcessStatus::Aborted, None, Some(reason));
                return;
            }
            tracing::info!(process_instance_id = %instance_id, "Task '{}' aborted, continuing: {}", task.name, reason);
            instance.next_task += 1;
        }
        Termination::Failed { fault, .. } => {
            let boundary = task.boundary.as_ref().filter(|b| b.catches(&fault));
            let Some(boundary) = boundary else {
                finish(instances, instance_id, ProcessStatus::Failed, Some(fault), None);
                return;
            };
            tracing::info!(
                process_instance_id = %instance_id,
                "Boundary on task '{}' caught fault {}",
                task.name,
                fault.code()
            );
            let mut caught = HashMap::new();
            caught.insert("code".to_string(), Value::from(fault.signal.code.as_str()));
            caught.insert("message".to_string(), Value::from(fault.signal.message.as_str()));
            instance.variables.insert(boundary.variable.clone(), Value::Object(caught));
            instance.next_task += 1;
        }
    }

    if instance.abort_requested {
        finish(instances, instance_id, ProcessStatus::Aborted, None, Some(AbortReason::Requested));
        return;
    }
    advance(engine, instances, instance_id);
}

/// Dispatch the next task of an instance, or finish it when none is left.
fn advance(
    engine: &ExecutionEngine,
    instances: &mut HashMap<ProcessInstanceId, Instance>,
    instance_id: ProcessInstanceId,
) {
    let Some(instance) = instances.get_mut(&instance_id) else {
        return;
    };

    let definition = Arc::clone(&instance.definition);
    let Some(task) = definition.tasks.get(instance.next_task) else {
        finish(instances, instance_id, ProcessStatus::Completed, None, None);
        return;
    };

    let item = WorkItem::new(task.work_item_type.clone(), instance_id)
        .with_parameters(task.resolve_parameters(&instance.variables));
    let work_item_id = item.id;
    tracing::debug!(process_instance_id = %instance_id, "Dispatching task '{}'", task.name);

    match engine.start_work_item(item) {
        Ok(_) => instance.current_item = Some(work_item_id),
        Err(e) => {
            tracing::error!(process_instance_id = %instance_id, "Cannot dispatch task '{}': {}", task.name, e);
            let fault = ProcessFault::rethrown(FailureSignal::rethrow("dispatch_failed", e.to_string()), 0);
            finish(instances, instance_id, ProcessStatus::Failed, Some(fault), None);
        }
    }
}

fn finish(
    instances: &mut HashMap<ProcessInstanceId, Instance>,
    instance_id: ProcessInstanceId,
    status: ProcessStatus,
    fault: Option<ProcessFault>,
    abort_reason: Option<AbortReason>,
) {
    let Some(mut instance) = instances.remove(&instance_id) else {
        return;
    };
    tracing::info!(process_instance_id = %instance_id, "Process {} finished: {:?}", instance.definition.id, status);

    let outcome = ProcessOutcome {
        instance_id,
        process_id: instance.definition.id.clone(),
        status,
        variables: instance.definition.collect_outputs(&instance.variables),
        fault,
        abort_reason,
    };
    if let Some(done) = instance.done.take() {
        let _ = done.send(outcome);
    }
}
