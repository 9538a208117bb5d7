//! Error types for command execution.

use std::sync::Arc;

use thiserror::Error;

/// Errors routed to a command's thrown-exceptions channel.
///
/// Cloneable so one failure can be multicast to every observer; arbitrary
/// user failures are carried as shared [`anyhow::Error`]s.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CommandError {
	/// The execution function failed, either synchronously or through an
	/// error item in its result stream.
	#[error("command execution failed: {0}")]
	Execution(Arc<anyhow::Error>),

	/// The eligibility source reported a failure for one tick.
	#[error("can-execute evaluation failed: {0}")]
	Eligibility(Arc<anyhow::Error>),

	/// The execution function panicked.
	#[error("command execution panicked: {0}")]
	Panicked(String),

	/// An awaited invocation completed without producing a value.
	#[error("command produced no result")]
	NoResult,
}

impl CommandError {
	/// Wraps an execution failure.
	pub fn execution(err: impl Into<anyhow::Error>) -> Self {
		Self::Execution(Arc::new(err.into()))
	}

	/// Wraps an eligibility failure.
	pub fn eligibility(err: impl Into<anyhow::Error>) -> Self {
		Self::Eligibility(Arc::new(err.into()))
	}

	/// Returns true for failures raised by the execution function itself.
	pub fn is_execution_fault(&self) -> bool {
		matches!(self, Self::Execution(_) | Self::Panicked(_))
	}
}

/// Result alias for command operations.
pub type Result<T, E = CommandError> = std::result::Result<T, E>;

/// An in-flight counter was asked to release more invocations than it holds.
///
/// This is an invariant violation, never a recoverable execution error, and
/// is not routed to the thrown-exceptions channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("in-flight counter underflow (counter `{counter}`)")]
pub struct InflightUnderflow {
	/// Name of the counter that underflowed.
	pub counter: &'static str,
}
