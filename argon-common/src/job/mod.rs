mod execution;
mod job_type;

pub use execution::*;
pub use job_type::*;
