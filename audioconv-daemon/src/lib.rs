//! Async runtimes around the sync pipeline: a Ctrl-C aware one-shot run and a
//! filesystem watcher that keeps the mirror up to date.

mod error;
mod runtime;

pub use error::DaemonError;
pub use runtime::{
    init_tracing, run_once, run_once_blocking, watch, watch_blocking, DEBOUNCE_WINDOW,
};
