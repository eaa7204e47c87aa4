use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;
use workcore::{
    AbortReason, ChannelCallback, HandlingStrategy, ProcessStatus, Termination, Value, WorkItem,
};
use workhandlers::{register_all, register_processes, ERROR_HANDLING_CODE};
use workruntime::{ExecutionEngine, HandlerRegistry, ProcessRuntime, RuntimeConfig};

async fn runtime() -> ProcessRuntime {
    let registry = Arc::new(HandlerRegistry::new());
    register_all(&registry).unwrap();
    let runtime = ProcessRuntime::new(registry, RuntimeConfig::default());
    register_processes(&runtime).await.unwrap();
    runtime
}

fn violation(speed: f64) -> Value {
    let mut violation = HashMap::new();
    violation.insert("type".to_string(), Value::from("speed"));
    violation.insert("speedLimit".to_string(), Value::from(100.0));
    violation.insert("actualSpeed".to_string(), Value::from(speed));
    Value::Object(violation)
}

fn traffic_input(driver_id: &str, speed: f64) -> HashMap<String, Value> {
    let mut variables = HashMap::new();
    variables.insert("driverId".to_string(), Value::from(driver_id));
    variables.insert("violation".to_string(), violation(speed));
    variables
}

fn name(value: &str) -> HashMap<String, Value> {
    let mut variables = HashMap::new();
    variables.insert("name".to_string(), Value::from(value));
    variables
}

#[tokio::test]
async fn custom_task_greets() {
    let registry = Arc::new(HandlerRegistry::new());
    register_all(&registry).unwrap();
    let (callback, mut terminations) = ChannelCallback::channel();
    let engine = ExecutionEngine::new(registry, Arc::new(callback), &RuntimeConfig::default());

    let item = WorkItem::new("custom-task", Uuid::new_v4()).with_parameter("Input", "world");
    engine.start_work_item(item).unwrap();

    match terminations.recv().await.unwrap() {
        Termination::Completed { results, .. } => {
            assert_eq!(results.len(), 1);
            assert_eq!(results["Result"], Value::from("Hello world"));
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn custom_task_error_fails_the_process() {
    let runtime = runtime().await;
    let outcome = runtime.run_process("hello", name("trigger error")).await.unwrap();

    assert_eq!(outcome.status, ProcessStatus::Failed);
    let fault = outcome.fault.unwrap();
    assert_eq!(fault.code(), ERROR_HANDLING_CODE);
    assert_eq!(fault.signal.strategy, HandlingStrategy::Rethrow);
}

#[tokio::test]
async fn boundary_catches_custom_task_error() {
    let runtime = runtime().await;

    let ok = runtime.run_process("hello_boundary", name("John")).await.unwrap();
    assert_eq!(ok.status, ProcessStatus::Completed);
    assert_eq!(ok.variables["greeting"], Value::from("Hello John"));
    assert!(ok.variables["error"].is_null());

    let caught = runtime
        .run_process("hello_boundary", name("trigger error"))
        .await
        .unwrap();
    assert_eq!(caught.status, ProcessStatus::Completed);
    assert_eq!(
        caught.variables["error"].get("code").and_then(Value::as_str),
        Some(ERROR_HANDLING_CODE)
    );
    assert!(caught.variables["greeting"].is_null());
}

#[tokio::test]
async fn unregistered_type_is_aborted() {
    let registry = Arc::new(HandlerRegistry::new());
    register_all(&registry).unwrap();
    let (callback, mut terminations) = ChannelCallback::channel();
    let engine = ExecutionEngine::new(registry, Arc::new(callback), &RuntimeConfig::default());

    engine
        .start_work_item(WorkItem::new("unregistered", Uuid::new_v4()))
        .unwrap();

    match terminations.recv().await.unwrap() {
        Termination::Aborted { reason, .. } => {
            assert_eq!(reason.to_string(), "unknown handler: unregistered");
        }
        other => panic!("expected abort, got {:?}", other),
    }
}

#[tokio::test]
async fn traffic_decisions() {
    let runtime = runtime().await;

    let cases = [
        ("12345", 120.0, Some("No"), true),
        ("12345", 140.0, Some("Yes"), true),
        ("1234", 140.0, None, false),
    ];

    for (driver_id, speed, suspended, valid_license) in cases {
        let outcome = runtime
            .run_process("traffic_wih", traffic_input(driver_id, speed))
            .await
            .unwrap();
        assert_eq!(outcome.status, ProcessStatus::Completed, "driver {}", driver_id);

        let driver = &outcome.variables["driver"];
        assert_eq!(driver.get("validLicense").and_then(Value::as_bool), Some(valid_license));

        let response = &outcome.variables["trafficViolationResponse"];
        assert_eq!(
            response.get("Suspended").and_then(Value::as_str),
            suspended,
            "driver {} at {}",
            driver_id,
            speed
        );
        if suspended.is_none() {
            assert!(response.is_null());
        }
    }
}

#[tokio::test]
async fn unknown_driver_aborts_the_process() {
    let runtime = runtime().await;
    let outcome = runtime
        .run_process("traffic_wih", traffic_input("999", 140.0))
        .await
        .unwrap();

    assert_eq!(outcome.status, ProcessStatus::Aborted);
    match outcome.abort_reason {
        Some(AbortReason::Declared { signal }) => assert_eq!(signal.code, "driver_not_found"),
        other => panic!("unexpected reason {:?}", other),
    }
}
