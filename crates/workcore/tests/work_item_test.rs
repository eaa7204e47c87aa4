use std::collections::HashMap;
use uuid::Uuid;
use workcore::{
    AbortReason, EventBus, FailureSignal, HandlerEvent, HandlingStrategy, ProcessDefinition,
    TaskSpec, Value, WorkItem, WorkItemContext, WorkItemEvent, WorkItemState,
};

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn handler_events_reach_subscribers() {
    init_tracing();

    let bus = EventBus::new(16);
    let mut receiver = bus.subscribe();

    let item = WorkItem::new("custom-task", Uuid::new_v4()).with_parameter("Input", "John");
    let ctx = WorkItemContext::new(item.clone(), 1, bus.create_emitter(item.id));
    ctx.events.info("starting");
    ctx.events.progress(50.0, Some("halfway".to_string()));

    match receiver.recv().await.unwrap() {
        WorkItemEvent::HandlerEvent {
            work_item_id,
            event: HandlerEvent::Info { message },
            ..
        } => {
            assert_eq!(work_item_id, item.id);
            assert_eq!(message, "starting");
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(matches!(
        receiver.recv().await.unwrap(),
        WorkItemEvent::HandlerEvent {
            event: HandlerEvent::Progress { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn context_reads_parameters_and_cancellation() {
    let bus = EventBus::new(4);
    let item = WorkItem::new("custom-task", Uuid::new_v4()).with_parameter("Input", "John");
    let ctx = WorkItemContext::new(item.clone(), 2, bus.create_emitter(item.id));

    assert_eq!(ctx.require_str("Input").unwrap(), "John");
    assert!(ctx.require_parameter("Missing").is_err());
    assert_eq!(ctx.parameter_or("Missing", Value::from(3i64)), Value::from(3i64));
    assert!(!ctx.is_cancelled());

    ctx.cancellation.cancel();
    assert!(ctx.is_cancelled());
}

#[test]
fn terminal_states_are_sticky() {
    let mut item = WorkItem::new("custom-task", Uuid::new_v4());
    item.transition_to(WorkItemState::Active).unwrap();
    item.transition_to(WorkItemState::Active).unwrap();
    item.transition_to(WorkItemState::Completed).unwrap();

    assert!(item.transition_to(WorkItemState::Active).is_err());
    assert!(item.transition_to(WorkItemState::Aborted).is_err());
    assert_eq!(item.state(), WorkItemState::Completed);
}

#[test]
fn abort_reason_serializes_with_tag() {
    let reason = AbortReason::Declared {
        signal: FailureSignal::abort("quota", "quota exhausted"),
    };
    let json = serde_json::to_value(&reason).unwrap();
    assert_eq!(json["reason"], "declared");
    assert_eq!(json["signal"]["strategy"], "ABORT");

    let back: AbortReason = serde_json::from_value(json).unwrap();
    assert_eq!(back.signal().map(|s| s.strategy), Some(HandlingStrategy::Abort));
}

#[test]
fn process_definition_loads_from_json() {
    let json = r#"{
        "id": "hello",
        "name": "Hello",
        "tasks": [
            {
                "name": "greet",
                "work_item_type": "custom-task",
                "inputs": { "Input": "name" },
                "outputs": { "Result": "greeting" },
                "boundary": { "error_code": "error_handling", "variable": "failure" }
            }
        ],
        "outputs": ["greeting", "failure"]
    }"#;

    let definition: ProcessDefinition = serde_json::from_str(json).unwrap();
    definition.validate().unwrap();

    let task: &TaskSpec = &definition.tasks[0];
    assert!(!task.continue_on_abort);

    let mut variables = HashMap::new();
    variables.insert("name".to_string(), Value::from("John"));
    let parameters = task.resolve_parameters(&variables);
    assert_eq!(parameters["Input"], Value::from("John"));
}
