//! Test execution engine
//!
//! Discovery, per-worker execution, hooks, signal handling and the run
//! orchestration tying them together.

pub mod discovery;
pub mod hooks;
pub mod runner;
pub mod signals;
pub mod worker;

pub use runner::Runner;
