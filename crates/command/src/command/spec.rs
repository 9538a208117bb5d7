use std::fmt;
use std::sync::Arc;

use futures::stream::BoxStream;
use rxui_stream::{SchedulerHandle, StateSource};
use tokio_util::sync::CancellationToken;

use crate::CanExecuteSource;

/// Values produced by one invocation. An `Err` item ends the invocation and
/// is routed to the command's thrown exceptions.
pub type ResultStream<T> = BoxStream<'static, anyhow::Result<T>>;

pub(crate) type ExecuteFn<P, T> = dyn Fn(P, CancellationToken) -> anyhow::Result<ResultStream<T>> + Send + Sync;
pub(crate) type Predicate<P> = dyn Fn(&P) -> bool + Send + Sync;

/// Configuration for a [`ReactiveCommand`](crate::ReactiveCommand).
///
/// The execution function receives the parameter and a token that fires when
/// every subscriber of that invocation has detached. Returning `Err` (or
/// panicking) fails the invocation synchronously.
pub struct CommandSpec<P, T> {
	pub(crate) execute: Arc<ExecuteFn<P, T>>,
	pub(crate) can_execute: CanExecuteSource,
	pub(crate) scheduler: Option<SchedulerHandle>,
	pub(crate) predicate: Option<Arc<Predicate<P>>>,
	pub(crate) name: Option<String>,
	pub(crate) gate: Option<StateSource<bool>>,
}

impl<P, T> CommandSpec<P, T> {
	/// Creates a spec from a raw execution function.
	pub fn new(execute: impl Fn(P, CancellationToken) -> anyhow::Result<ResultStream<T>> + Send + Sync + 'static) -> Self {
		Self {
			execute: Arc::new(execute),
			can_execute: CanExecuteSource::always(),
			scheduler: None,
			predicate: None,
			name: None,
			gate: None,
		}
	}

	/// Sets the eligibility source. Defaults to always eligible.
	#[must_use]
	pub fn can_execute(mut self, source: CanExecuteSource) -> Self {
		self.can_execute = source;
		self
	}

	/// Sets where results and completions are delivered. Defaults to
	/// [`main_scheduler`](rxui_stream::main_scheduler).
	#[must_use]
	pub fn scheduler(mut self, scheduler: SchedulerHandle) -> Self {
		self.scheduler = Some(scheduler);
		self
	}

	/// Adds a synchronous per-parameter check to `can_execute`.
	#[must_use]
	pub fn predicate(mut self, predicate: impl Fn(&P) -> bool + Send + Sync + 'static) -> Self {
		self.predicate = Some(Arc::new(predicate));
		self
	}

	/// Names the command in traces.
	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}

	/// Replaces the executing input with an external capacity signal.
	#[must_use]
	pub(crate) fn gated_by(mut self, saturated: StateSource<bool>) -> Self {
		self.gate = Some(saturated);
		self
	}
}

impl<P, T> fmt::Debug for CommandSpec<P, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CommandSpec")
			.field("name", &self.name)
			.field("has_scheduler", &self.scheduler.is_some())
			.field("has_predicate", &self.predicate.is_some())
			.finish_non_exhaustive()
	}
}
