mod job_execution;

pub use job_execution::JobExecutionDbTrait;
