use workcore::{ErrorBoundary, ProcessDefinition, TaskSpec};

use crate::custom_task::ERROR_HANDLING_CODE;

/// `custom-task` greeting `name`; a failure ends the instance.
pub fn hello() -> ProcessDefinition {
    ProcessDefinition::new("hello", "Hello")
        .with_description("Greets the input through a custom work item")
        .with_task(
            TaskSpec::new("greet", "custom-task")
                .with_input("Input", "name")
                .with_output("Result", "greeting"),
        )
        .with_output("greeting")
}

/// Same as [`hello`] but with an `error_handling` boundary on the task.
pub fn hello_boundary() -> ProcessDefinition {
    ProcessDefinition::new("hello_boundary", "Hello with error boundary")
        .with_description("Greets the input; errors are caught into `error`")
        .with_task(
            TaskSpec::new("greet", "custom-task")
                .with_input("Input", "name")
                .with_output("Result", "greeting")
                .with_boundary(ErrorBoundary::catching(ERROR_HANDLING_CODE, "error")),
        )
        .with_task(
            TaskSpec::new("report", "debug.log")
                .with_input("message", "greeting")
                .with_output("message", "logged"),
        )
        .with_output("greeting")
        .with_output("error")
}

/// Licence validation followed by the violation decision.
pub fn traffic_wih() -> ProcessDefinition {
    ProcessDefinition::new("traffic_wih", "Traffic violation")
        .with_description("Validates the driver's licence and decides on the violation")
        .with_task(
            TaskSpec::new("license_validation", "traffic.license-validation")
                .with_input("driverId", "driverId")
                .with_output("driver", "driver"),
        )
        .with_task(
            TaskSpec::new("violation_decision", "traffic.violation-decision")
                .with_input("driver", "driver")
                .with_input("violation", "violation")
                .with_output("trafficViolationResponse", "trafficViolationResponse"),
        )
        .with_output("driver")
        .with_output("trafficViolationResponse")
}

/// Every built-in definition
pub fn builtin() -> Vec<ProcessDefinition> {
    vec![hello(), hello_boundary(), traffic_wih()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_definitions_are_valid() {
        for definition in builtin() {
            definition.validate().unwrap();
        }
    }
}
