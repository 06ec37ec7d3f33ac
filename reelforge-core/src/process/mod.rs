//! Process Supervisor (C1): owns one encoder child process per session and
//! guarantees the whole process group dies on stop, crash, or parent exit.
//!
//! Follows the crate's conventions for long-lived supervised tasks
//! (`tokio::spawn` plus a `tracing`-instrumented monitor loop, `thiserror`
//! for the failure type).

mod supervisor;

pub use supervisor::{ProcessManager, ProcessStartError, Supervisor};
