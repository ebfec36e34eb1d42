pub mod aggregate;
pub mod durable_sink;
pub mod job;
pub mod unit_runner;
