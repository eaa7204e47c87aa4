use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use workcore::{
    HandlerError, HandlerMetadata, HandlerOutcome, ParameterDefinition, Value, WorkItemContext,
    WorkItemHandler,
};

/// Waits `delay_ms` (default 1000) then passes its parameters through.
///
/// Returns early with `HandlerError::Cancelled` when the item is aborted.
pub struct DelayHandler;

#[async_trait]
impl WorkItemHandler for DelayHandler {
    fn work_item_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        let delay_ms = ctx
            .parameter_or("delay_ms", Value::from(1000i64))
            .as_f64()
            .unwrap_or(1000.0)
            .max(0.0) as u64;

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => {}
            _ = ctx.cancellation.cancelled() => return Err(HandlerError::Cancelled),
        }

        let mut results = ctx.item.parameters.clone();
        results.remove("delay_ms");
        Ok(HandlerOutcome::completed(results))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            parameters: vec![ParameterDefinition::optional("delay_ms", "Milliseconds to wait")],
        }
    }
}
