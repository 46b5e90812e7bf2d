//! Structured error types for sidefx.
//!
//! `SideFxError` provides pattern-matchable errors for the failures the
//! engine itself produces. Errors raised by application effectors are never
//! wrapped: they travel unchanged as `anyhow::Error` to whoever awaits the
//! dispatch future.
//!
//! # Error Example
//!
//! ```ignore
//! use sidefx::SideFxError;
//!
//! match store.dispatch(action).await {
//!     Ok(()) => {}
//!     Err(e) => match e.downcast_ref::<SideFxError>() {
//!         Some(SideFxError::TaskPanicked { index, message }) => {
//!             eprintln!("task {index} panicked: {message}");
//!         }
//!         _ => eprintln!("effect cascade failed: {e:#}"),
//!     },
//! }
//! ```

use std::any::Any;

use thiserror::Error;

/// Errors produced by the effect engine.
#[derive(Debug, Error)]
pub enum SideFxError {
    /// A task panicked while being started or while running.
    ///
    /// Panics are treated exactly like errors: they abort the enclosing
    /// task list.
    #[error("task {index} panicked: {message}")]
    TaskPanicked { index: usize, message: String },

    /// A follow-up action was produced after every handle to the store was
    /// dropped.
    #[error("store was dropped before follow-up actions could be dispatched")]
    StoreDropped,

    /// A serialized effect did not match any known shape.
    #[error("invalid side effect: {0}")]
    InvalidWireFormat(String),
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
