//! Binds every `yarnnn-*` crate into one runnable orchestrator (§6): a
//! `YarnnnConfig` in, an [`App`] out, one `tick(now)` per cron invocation.

pub mod app;
pub mod connections;
pub mod credentials;
pub mod due_work;
pub mod error;
pub mod llm;
pub mod research;
pub mod signal_state;

pub use app::{App, TickSummary};
pub use error::{AppError, Result};
