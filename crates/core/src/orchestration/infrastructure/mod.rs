pub mod json_file_sink;
pub mod worker_pool;
