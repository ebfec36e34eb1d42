pub mod circuit_breaker;
pub mod domain;
pub mod infrastructure;
pub mod orchestrator;
pub mod retry_policy;
