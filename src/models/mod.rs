//! Data models
//!
//! Test status and run outcome types shared by the executor and outputs.

mod test_result;

pub use test_result::{RunSummary, TestStatus, WorkerReport};
