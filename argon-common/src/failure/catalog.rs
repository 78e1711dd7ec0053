use std::collections::HashMap;

use tracing::warn;

use super::{ErrorCategory, NamedError, names};

/// Lookup of named errors by taxonomy key.
/// ---
/// The catalog returned by [`ErrorCatalog::with_builtins`] holds every error
/// the orchestrator can assign on its own. Job types that map exit codes to
/// their own error names must have those errors registered here as well.
/// System job types have no exit-code mapping of their own, their exit
/// codes are looked up through [`ErrorCatalog::by_exit_code`].
#[derive(Debug, Clone, Default)]
pub struct ErrorCatalog {
    errors: HashMap<String, NamedError>,
    exit_codes: HashMap<i32, String>,
}

impl ErrorCatalog {
    pub fn new() -> Self {
        Self {
            errors: HashMap::new(),
            exit_codes: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();

        let builtins = [
            (
                names::DOCKER_TASK_LAUNCH,
                "Task Launch Error",
                ErrorCategory::System,
            ),
            (names::PULL, "Image Pull Error", ErrorCategory::System),
            (
                names::DOCKER_TERMINATED,
                "Container Terminated",
                ErrorCategory::System,
            ),
            (
                names::ALGORITHM_UNKNOWN,
                "Unknown Algorithm Error",
                ErrorCategory::Algorithm,
            ),
            (
                names::LAUNCH_TIMEOUT,
                "Task Launch Timeout",
                ErrorCategory::System,
            ),
            (names::PULL_TIMEOUT, "Image Pull Timeout", ErrorCategory::System),
            (
                names::PRE_TIMEOUT,
                "Pre-Task Timeout",
                ErrorCategory::System,
            ),
            (names::TIMEOUT, "Job Timeout", ErrorCategory::System),
            (
                names::SYSTEM_TIMEOUT,
                "System Job Timeout",
                ErrorCategory::System,
            ),
            (
                names::POST_TIMEOUT,
                "Post-Task Timeout",
                ErrorCategory::System,
            ),
            (names::NODE_LOST, "Node Lost", ErrorCategory::System),
            (names::KILLED, "Task Killed", ErrorCategory::System),
            (
                names::TASK_LOST,
                "Task Lost Too Many Times",
                ErrorCategory::System,
            ),
            (names::UNKNOWN, "Unknown Error", ErrorCategory::System),
        ];

        for (name, title, category) in builtins {
            catalog.register(NamedError::new(name, title, category));
        }

        catalog
    }

    /// Adds or replaces an error, keyed by its name.
    pub fn register(&mut self, error: NamedError) {
        self.errors.insert(error.name.clone(), error);
    }

    /// Binds a system job exit code to a registered error name.
    pub fn register_exit_code(&mut self, exit_code: i32, name: impl Into<String>) {
        self.exit_codes.insert(exit_code, name.into());
    }

    /// Error bound to `exit_code`, if its name is registered.
    pub fn by_exit_code(&self, exit_code: i32) -> Option<NamedError> {
        self.exit_codes
            .get(&exit_code)
            .and_then(|name| self.errors.get(name))
            .cloned()
    }

    pub fn get(&self, name: &str) -> Option<&NamedError> {
        self.errors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.errors.contains_key(name)
    }

    /// Returns the named error, or a SYSTEM error with the same name
    /// if the catalog was not seeded with it.
    pub fn resolve(&self, name: &str) -> NamedError {
        match self.errors.get(name) {
            Some(error) => error.clone(),
            None => {
                warn!(
                    "ErrorCatalog: No error registered under '{}', using an uncategorized system error.",
                    name
                );
                NamedError::system(name, name)
            }
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
