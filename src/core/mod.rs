//! Core abstractions and interfaces
//!
//! This module provides the error types, the per-request execution
//! context and the collaborator traits the director is built on.

pub mod context;
pub mod error;
pub mod traits;

// Re-export commonly used types
pub use context::ExecutionContext;
pub use error::{DirectorError, DirectorResult, ErrorContext, Failure};
pub use traits::*;
