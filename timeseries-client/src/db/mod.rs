pub mod belief_queries;
pub mod registry_queries;
pub mod task_run_queries;
