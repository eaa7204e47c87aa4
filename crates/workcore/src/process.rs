use crate::{Parameters, ProcessError, ProcessFault, Value};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Sequential process: tasks run one after another, each as a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub tasks: Vec<TaskSpec>,
    /// Variables returned when the instance ends; empty returns all of them
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl ProcessDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            tasks: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_output(mut self, variable: impl Into<String>) -> Self {
        self.outputs.push(variable.into());
        self
    }

    pub fn validate(&self) -> Result<(), ProcessError> {
        if self.id.trim().is_empty() {
            return Err(ProcessError::Invalid("process id is empty".to_string()));
        }
        if self.tasks.is_empty() {
            return Err(ProcessError::Invalid(format!("process '{}' has no tasks", self.id)));
        }

        let mut names = HashSet::new();
        for task in &self.tasks {
            if task.work_item_type.trim().is_empty() {
                return Err(ProcessError::Invalid(format!(
                    "task '{}' has no work item type",
                    task.name
                )));
            }
            if !names.insert(task.name.as_str()) {
                return Err(ProcessError::Invalid(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
        }
        Ok(())
    }

    /// Select the returned variables from the final variable set.
    pub fn collect_outputs(&self, variables: &HashMap<String, Value>) -> HashMap<String, Value> {
        if self.outputs.is_empty() {
            return variables.clone();
        }
        self.outputs
            .iter()
            .map(|name| {
                let value = variables.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect()
    }
}

/// One task node: which work item to dispatch and how data flows in and out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub work_item_type: String,
    /// Parameter name <- process variable name
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    /// Fixed parameters
    #[serde(default)]
    pub parameters: Parameters,
    /// Result name -> process variable name; empty merges every result
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    #[serde(default)]
    pub boundary: Option<ErrorBoundary>,
    /// Move on to the next task when the item is aborted
    #[serde(default)]
    pub continue_on_abort: bool,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, work_item_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            work_item_type: work_item_type.into(),
            inputs: HashMap::new(),
            parameters: Parameters::new(),
            outputs: HashMap::new(),
            boundary: None,
            continue_on_abort: false,
        }
    }

    pub fn with_input(mut self, parameter: impl Into<String>, variable: impl Into<String>) -> Self {
        self.inputs.insert(parameter.into(), variable.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, result: impl Into<String>, variable: impl Into<String>) -> Self {
        self.outputs.insert(result.into(), variable.into());
        self
    }

    pub fn with_boundary(mut self, boundary: ErrorBoundary) -> Self {
        self.boundary = Some(boundary);
        self
    }

    pub fn continue_on_abort(mut self) -> Self {
        self.continue_on_abort = true;
        self
    }

    /// Parameters for a work item of this task, resolved against `variables`.
    ///
    /// Inputs whose variable is unset are left out so the handler can report
    /// the missing parameter itself.
    pub fn resolve_parameters(&self, variables: &HashMap<String, Value>) -> Parameters {
        let mut parameters = self.parameters.clone();
        for (parameter, variable) in &self.inputs {
            if let Some(value) = variables.get(variable) {
                parameters.insert(parameter.clone(), value.clone());
            }
        }
        parameters
    }
}

/// Catches process-level faults raised by a task and stores them in a
/// variable instead of failing the instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBoundary {
    /// Fault code to catch; `None` catches every code
    #[serde(default)]
    pub error_code: Option<String>,
    pub variable: String,
}

impl ErrorBoundary {
    pub fn catching(error_code: impl Into<String>, variable: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code.into()),
            variable: variable.into(),
        }
    }

    pub fn catch_all(variable: impl Into<String>) -> Self {
        Self {
            error_code: None,
            variable: variable.into(),
        }
    }

    pub fn catches(&self, fault: &ProcessFault) -> bool {
        match &self.error_code {
            Some(code) => code == fault.code(),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Active,
    Completed,
    Failed,
    Aborted,
}
