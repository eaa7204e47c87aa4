use crate::{HandlerError, Parameters, Value, WorkItemError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type WorkItemId = Uuid;
pub type ProcessInstanceId = Uuid;

/// Lifecycle of a work item: `Created -> Active -> {Completed | Aborted}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemState {
    Created,
    Active,
    Completed,
    Aborted,
}

impl WorkItemState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkItemState::Completed | WorkItemState::Aborted)
    }

    fn can_transition_to(&self, to: WorkItemState) -> bool {
        use WorkItemState::*;
        matches!(
            (self, to),
            (Created, Active) | (Active, Active) | (Active, Completed) | (Active, Aborted)
        )
    }
}

/// One unit of work dispatched by a process instance to a handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub work_item_type: String,
    pub parameters: Parameters,
    process_instance_id: ProcessInstanceId,
    state: WorkItemState,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(work_item_type: impl Into<String>, process_instance_id: ProcessInstanceId) -> Self {
        Self {
            id: Uuid::new_v4(),
            work_item_type: work_item_type.into(),
            parameters: Parameters::new(),
            process_instance_id,
            state: WorkItemState::Created,
            created_at: Utc::now(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// The owning process instance. Fixed at construction.
    pub fn process_instance_id(&self) -> ProcessInstanceId {
        self.process_instance_id
    }

    pub fn state(&self) -> WorkItemState {
        self.state
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }

    /// Get a required parameter or fail with `MissingParameter`.
    pub fn require_parameter(&self, name: &str) -> Result<&Value, HandlerError> {
        self.parameters
            .get(name)
            .ok_or_else(|| HandlerError::MissingParameter(name.to_string()))
    }

    /// Get a required string parameter.
    pub fn require_str(&self, name: &str) -> Result<&str, HandlerError> {
        let value = self.require_parameter(name)?;
        value.as_str().ok_or_else(|| HandlerError::InvalidParameterType {
            field: name.to_string(),
            expected: "string".to_string(),
            actual: value.type_name().to_string(),
        })
    }

    /// Move the item to `to`, rejecting anything outside the lifecycle.
    ///
    /// Terminal states are sticky: every transition out of `Completed` or
    /// `Aborted` fails.
    pub fn transition_to(&mut self, to: WorkItemState) -> Result<(), WorkItemError> {
        if !self.state.can_transition_to(to) {
            return Err(WorkItemError::InvalidTransition {
                id: self.id,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> WorkItem {
        WorkItem::new("custom-task", Uuid::new_v4()).with_parameter("Input", "world")
    }

    #[test]
    fn follows_lifecycle_with_retry_self_loop() {
        let mut item = item();
        assert_eq!(item.state(), WorkItemState::Created);
        item.transition_to(WorkItemState::Active).unwrap();
        item.transition_to(WorkItemState::Active).unwrap();
        item.transition_to(WorkItemState::Completed).unwrap();
        assert!(item.state().is_terminal());
    }

    #[test]
    fn terminal_states_are_sticky() {
        let mut item = item();
        item.transition_to(WorkItemState::Active).unwrap();
        item.transition_to(WorkItemState::Aborted).unwrap();

        for to in [
            WorkItemState::Active,
            WorkItemState::Completed,
            WorkItemState::Aborted,
        ] {
            let err = item.transition_to(to).unwrap_err();
            assert_eq!(
                err,
                WorkItemError::InvalidTransition {
                    id: item.id,
                    from: WorkItemState::Aborted,
                    to,
                }
            );
        }
    }

    #[test]
    fn cannot_finish_before_activation() {
        let mut item = item();
        assert!(item.transition_to(WorkItemState::Completed).is_err());
        assert!(item.transition_to(WorkItemState::Aborted).is_err());
        assert_eq!(item.state(), WorkItemState::Created);
    }

    #[test]
    fn require_str_reports_type_mismatch() {
        let item = item().with_parameter("Count", 3i64);
        assert_eq!(item.require_str("Input").unwrap(), "world");
        assert_eq!(
            item.require_str("Count").unwrap_err(),
            HandlerError::InvalidParameterType {
                field: "Count".to_string(),
                expected: "string".to_string(),
                actual: "number".to_string(),
            }
        );
        assert_eq!(
            item.require_str("Missing").unwrap_err(),
            HandlerError::MissingParameter("Missing".to_string())
        );
    }
}
