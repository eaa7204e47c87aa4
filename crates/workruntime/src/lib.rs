//! Work item execution runtime
//!
//! This crate provides the execution engine that dispatches work items to
//! registered handlers, the strategy resolver that interprets handler
//! failures, and a minimal sequential process runtime that drives the
//! engine end to end.

mod config;
mod engine;
mod registry;
mod runtime;
mod strategy;

pub use config::RuntimeConfig;
pub use engine::{ExecutionEngine, ExecutionHandle};
pub use registry::HandlerRegistry;
pub use runtime::{ProcessHandle, ProcessOutcome, ProcessRuntime};
pub use strategy::{Action, RetryExhaustion, RetryPolicy, StrategyResolver};
