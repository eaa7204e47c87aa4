use async_trait::async_trait;
use workcore::{
    HandlerError, HandlerMetadata, HandlerOutcome, ParameterDefinition, Results, Value,
    WorkItemContext, WorkItemHandler,
};

/// Logs its parameters and echoes `message`
pub struct DebugHandler;

#[async_trait]
impl WorkItemHandler for DebugHandler {
    fn work_item_type(&self) -> &str {
        "debug.log"
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        let message = ctx
            .item
            .parameter("message")
            .and_then(Value::as_str)
            .unwrap_or("(no message)")
            .to_string();

        ctx.events.info(format!("DEBUG: {}", message));
        for (key, value) in &ctx.item.parameters {
            tracing::info!(work_item_id = %ctx.item.id, "  {}: {:?}", key, value);
        }

        let mut results = Results::new();
        results.insert("message".to_string(), Value::from(message));
        Ok(HandlerOutcome::completed(results))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Logs parameter values for debugging".to_string(),
            category: "debug".to_string(),
            parameters: vec![ParameterDefinition::optional("message", "Text to log")],
        }
    }
}
