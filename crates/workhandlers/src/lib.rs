//! Standard handler library
//!
//! Built-in work item handlers and the demo process definitions that use them

mod custom_task;
mod debug;
mod http;
pub mod processes;
mod time;
mod traffic;

pub use custom_task::{CustomTaskHandler, ERROR_HANDLING_CODE};
pub use debug::DebugHandler;
pub use http::{status_strategy, HttpRequestHandler};
pub use time::DelayHandler;
pub use traffic::{speeding_fine, LicenseValidationHandler, ViolationDecisionHandler};

use std::sync::Arc;
use workcore::RegistryError;
use workruntime::{HandlerRegistry, ProcessRuntime};

/// Register all standard handlers with a registry
pub fn register_all(registry: &HandlerRegistry) -> Result<(), RegistryError> {
    registry.register(Arc::new(CustomTaskHandler))?;
    registry.register(Arc::new(DebugHandler))?;
    registry.register(Arc::new(DelayHandler))?;
    registry.register(Arc::new(HttpRequestHandler::new()))?;
    registry.register(Arc::new(LicenseValidationHandler))?;
    registry.register(Arc::new(ViolationDecisionHandler))?;
    Ok(())
}

/// Register the built-in process definitions with a runtime
pub async fn register_processes(runtime: &ProcessRuntime) -> Result<(), workcore::ProcessError> {
    for definition in processes::builtin() {
        runtime.register_definition(definition).await?;
    }
    Ok(())
}
