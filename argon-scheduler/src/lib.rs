pub mod config;
pub mod dispatcher;
pub mod execution;
pub mod node;
pub mod registry;
pub mod scheduling;
pub mod supervisor;
pub mod system_task;
pub mod transport;
pub mod updates;
