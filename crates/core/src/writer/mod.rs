pub mod dcp_writer;
pub mod frame_queue;
pub mod job_reporter;
pub mod queue_item;
pub mod writer_error;
