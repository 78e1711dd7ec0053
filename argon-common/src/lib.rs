pub mod cluster;
pub mod error;
pub mod failure;
pub mod job;
pub mod state;
pub mod task;
