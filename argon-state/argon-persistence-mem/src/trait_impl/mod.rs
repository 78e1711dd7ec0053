mod job_execution;
