use async_trait::async_trait;
use workcore::{
    FailureSignal, HandlerError, HandlerMetadata, HandlerOutcome, ParameterDefinition, Results,
    Value, WorkItem, WorkItemContext, WorkItemHandler,
};

/// Greets its `Input` parameter.
///
/// An input containing "error" is rejected with a `Rethrow` signal coded
/// `error_handling`, so processes can exercise their error boundaries.
pub struct CustomTaskHandler;

pub const ERROR_HANDLING_CODE: &str = "error_handling";

#[async_trait]
impl WorkItemHandler for CustomTaskHandler {
    fn work_item_type(&self) -> &str {
        "custom-task"
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        tracing::info!(work_item_id = %ctx.item.id, "Hello from the custom work item");
        for (name, value) in &ctx.item.parameters {
            tracing::debug!(work_item_id = %ctx.item.id, "{} = {:?}", name, value);
        }

        let input = ctx.require_str("Input")?;
        if input.contains("error") {
            return Ok(HandlerOutcome::failed(FailureSignal::rethrow(
                ERROR_HANDLING_CODE,
                "Input contains \"error\"",
            )));
        }

        let mut results = Results::new();
        results.insert("Result".to_string(), Value::from(format!("Hello {}", input)));
        Ok(HandlerOutcome::completed(results))
    }

    async fn abort(&self, item: &WorkItem) {
        tracing::error!(work_item_id = %item.id, "Error happened in the custom work item");
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Greets the input; fails on inputs containing \"error\"".to_string(),
            category: "demo".to_string(),
            parameters: vec![ParameterDefinition::required("Input", "Name to greet")],
        }
    }
}
