use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::task::TaskStage;

/// Metadata describing how executions of a job are run.
/// ---
/// `error_mapping` maps non-zero exit codes of the PRE, MAIN and POST stages
/// to error names. Names that are not in the error catalog are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobType {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub is_long_running: bool,
    pub docker_image: Option<String>,
    #[serde(default)]
    pub pre_arguments: Vec<String>,
    #[serde(default)]
    pub post_arguments: Vec<String>,
    #[serde(default)]
    pub error_mapping: HashMap<i32, String>,
    /// Overrides the error assigned when the MAIN stage times out
    pub timeout_error_name: Option<String>,
}

impl JobType {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn system(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            is_system: true,
            ..Self::new(name, version)
        }
    }

    /// Ordered stages an execution of this job type runs through.
    pub fn stages(&self) -> Vec<TaskStage> {
        if self.is_system {
            vec![TaskStage::Main]
        } else {
            vec![
                TaskStage::Pull,
                TaskStage::Pre,
                TaskStage::Main,
                TaskStage::Post,
            ]
        }
    }

    pub fn map_exit_code(&self, exit_code: i32) -> Option<&str> {
        self.error_mapping.get(&exit_code).map(String::as_str)
    }
}
