//! The command execution engine.
//!
//! A [`ReactiveCommand`] turns a parameter into an asynchronously produced
//! sequence of results. Each invocation is counted in flight from the moment
//! its [`Execution`] is first subscribed until its completion has been
//! delivered on the command's scheduler, exactly once whatever the outcome.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::{FutureExt, StreamExt};
use rxui_stream::{
	EventSource, Observable, SchedulerHandle, StateSource, Subject, Subscription, TaskClass, main_scheduler,
	panic_message, spawn,
};
use tokio_util::sync::CancellationToken;

use crate::can_execute::{CanExecuteCell, CellSources};
use crate::exceptions::ExceptionChannel;
use crate::execution::{Execution, ExecutionSink};
use crate::inflight::{InflightCounter, InflightGuard};
use crate::{CanExecuteObservable, CommandError, Result, ThrownExceptions};

mod composite;
mod factory;
mod spec;

pub use spec::{CommandSpec, ResultStream};
pub(crate) use spec::{ExecuteFn, Predicate};

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

/// Object-safe command surface shared by every command kind.
///
/// Composite commands and [`invoke_command`](crate::invoke_command) drive
/// their targets through this trait.
pub trait Command<P>: Send + Sync {
	/// Synchronous executability snapshot for `parameter`.
	fn can_execute(&self, parameter: &P) -> bool;

	/// Starts an invocation and forgets about it.
	fn execute(&self, parameter: P);

	/// Executability as a state stream.
	fn can_execute_observable(&self) -> CanExecuteObservable;
}

struct CommandInner<P, T> {
	id: u64,
	name: Option<String>,
	execute: Arc<ExecuteFn<P, T>>,
	predicate: Option<Arc<Predicate<P>>>,
	scheduler: SchedulerHandle,
	inflight: Arc<InflightCounter>,
	results: Subject<T>,
	exceptions: ExceptionChannel,
	can_execute: CanExecuteCell,
	disposed: AtomicBool,
}

/// Reactive command producing values of type `T` from parameters of type `P`.
///
/// Cloning yields another handle to the same command.
pub struct ReactiveCommand<P, T> {
	inner: Arc<CommandInner<P, T>>,
}

impl<P, T> Clone for ReactiveCommand<P, T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<P, T> ReactiveCommand<P, T>
where
	P: Send + 'static,
	T: Clone + Send + Sync + 'static,
{
	pub fn new(spec: CommandSpec<P, T>) -> Self {
		let id = NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed);
		let exceptions = ExceptionChannel::new(id);
		let inflight = InflightCounter::new("command", 0);
		let sources = match spec.gate {
			Some(saturated) => CellSources {
				eligibility: spec.can_execute,
				executing: None,
				veto: Some(saturated),
			},
			None => CellSources {
				eligibility: spec.can_execute,
				executing: Some(inflight.executing()),
				veto: None,
			},
		};
		let can_execute = CanExecuteCell::new(id, sources, exceptions.clone());
		let scheduler = spec.scheduler.unwrap_or_else(main_scheduler);
		tracing::debug!(command = id, name = spec.name.as_deref(), scheduler = scheduler.name(), "command.create");

		Self {
			inner: Arc::new(CommandInner {
				id,
				name: spec.name,
				execute: spec.execute,
				predicate: spec.predicate,
				scheduler,
				inflight,
				results: Subject::new(),
				exceptions,
				can_execute,
				disposed: AtomicBool::new(false),
			}),
		}
	}

	/// Starts an invocation and discards its handle. The invocation runs to
	/// completion.
	pub fn execute(&self, parameter: P) {
		self.execute_async(parameter).subscribe_with(|_| {}, || {}).detach();
	}

	/// Returns a lazy handle to an invocation. Nothing runs until it is
	/// subscribed.
	pub fn execute_async(&self, parameter: P) -> Execution<T> {
		self.inner.can_execute.attach();
		let inner = Arc::clone(&self.inner);
		Execution::new(
			self.inner.id,
			Box::new(move |sink, cancel| CommandInner::start(&inner, parameter, sink, cancel)),
		)
	}

	/// Runs an invocation and resolves to its last value.
	pub async fn execute_task(&self, parameter: P) -> Result<T> {
		self.execute_async(parameter).last().await
	}

	/// Executability for `parameter`: the derived state and the predicate.
	pub fn can_execute(&self, parameter: &P) -> bool {
		self.inner.can_execute.get() && self.inner.predicate.as_ref().is_none_or(|check| check(parameter))
	}

	pub fn can_execute_observable(&self) -> CanExecuteObservable {
		self.inner.can_execute.observable()
	}

	/// Calls `f` on every executability flip, without replaying the current
	/// value.
	pub fn can_execute_changed<F>(&self, f: F) -> Subscription
	where
		F: Fn(bool) + Send + Sync + 'static,
	{
		self.inner.can_execute.subscribe_changes(move |value| f(*value))
	}

	/// Whether any invocation is in flight, starting with the current value.
	pub fn is_executing(&self) -> StateSource<bool> {
		self.inner.inflight.executing()
	}

	pub fn thrown_exceptions(&self) -> ThrownExceptions {
		self.inner.exceptions.source()
	}

	/// Values of every invocation, as delivered on the scheduler.
	pub fn results(&self) -> EventSource<T> {
		self.inner.results.source()
	}

	pub fn subscribe<F>(&self, f: F) -> Subscription
	where
		F: Fn(&T) + Send + Sync + 'static,
	{
		self.inner.results.subscribe(f)
	}

	/// Number of invocations currently in flight.
	pub fn inflight(&self) -> usize {
		self.inner.inflight.count()
	}

	/// Disconnects the executability inputs. In-flight invocations keep
	/// running and still deliver.
	pub fn dispose(&self) {
		if self.inner.disposed.swap(true, Ordering::AcqRel) {
			return;
		}
		self.inner.can_execute.detach_all();
		tracing::debug!(command = self.inner.id, "command.dispose");
	}

	pub fn is_disposed(&self) -> bool {
		self.inner.disposed.load(Ordering::Acquire)
	}

	pub fn id(&self) -> u64 {
		self.inner.id
	}

	pub fn name(&self) -> Option<&str> {
		self.inner.name.as_deref()
	}

	pub(crate) fn report(&self, err: CommandError) {
		self.inner.exceptions.push(err);
	}

	pub(crate) fn scheduler(&self) -> &SchedulerHandle {
		&self.inner.scheduler
	}

	pub(crate) fn can_execute_snapshot(&self) -> bool {
		self.inner.can_execute.get()
	}
}

impl<P, T> CommandInner<P, T>
where
	P: Send + 'static,
	T: Clone + Send + Sync + 'static,
{
	fn start(self: &Arc<Self>, parameter: P, sink: ExecutionSink<T>, cancel: CancellationToken) {
		let guard = self.inflight.enter();
		tracing::debug!(command = self.id, inflight = self.inflight.count(), "command.execute");

		let produced = catch_unwind(AssertUnwindSafe(|| (self.execute)(parameter, cancel.clone())));
		let stream = match produced {
			Ok(Ok(stream)) => stream,
			Ok(Err(err)) => {
				self.exceptions.push(CommandError::execution(err));
				self.finish(sink, guard);
				return;
			}
			Err(payload) => {
				self.exceptions.push(CommandError::Panicked(panic_message(payload.as_ref())));
				self.finish(sink, guard);
				return;
			}
		};

		let inner = Arc::clone(self);
		spawn(TaskClass::Background, async move {
			let driven = AssertUnwindSafe(inner.drive(stream, &sink, &cancel)).catch_unwind().await;
			if let Err(payload) = driven {
				inner.exceptions.push(CommandError::Panicked(panic_message(payload.as_ref())));
			}
			inner.finish(sink, guard);
		});
	}

	async fn drive(&self, mut stream: ResultStream<T>, sink: &ExecutionSink<T>, cancel: &CancellationToken) {
		loop {
			let item = tokio::select! {
				biased;
				() = cancel.cancelled() => {
					tracing::trace!(command = self.id, "command.execute.cancelled");
					return;
				}
				item = stream.next() => item,
			};
			match item {
				Some(Ok(value)) => self.deliver(sink, value),
				Some(Err(err)) => {
					self.exceptions.push(CommandError::execution(err));
					return;
				}
				None => return,
			}
		}
	}

	fn deliver(&self, sink: &ExecutionSink<T>, value: T) {
		let sink = sink.clone();
		let results = self.results.clone();
		self.scheduler.schedule(Box::new(move || {
			sink.emit(&value);
			results.next(value);
		}));
	}

	/// Releases the in-flight slot and completes the invocation on the
	/// scheduler, after every value it produced.
	fn finish(&self, sink: ExecutionSink<T>, guard: InflightGuard) {
		let id = self.id;
		self.scheduler.schedule(Box::new(move || {
			guard.release();
			sink.complete();
			tracing::trace!(command = id, "command.execute.complete");
		}));
	}
}

impl<P, T> Command<P> for ReactiveCommand<P, T>
where
	P: Send + 'static,
	T: Clone + Send + Sync + 'static,
{
	fn can_execute(&self, parameter: &P) -> bool {
		ReactiveCommand::can_execute(self, parameter)
	}

	fn execute(&self, parameter: P) {
		ReactiveCommand::execute(self, parameter);
	}

	fn can_execute_observable(&self) -> CanExecuteObservable {
		ReactiveCommand::can_execute_observable(self)
	}
}

impl<P, T> fmt::Debug for ReactiveCommand<P, T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ReactiveCommand")
			.field("id", &self.inner.id)
			.field("name", &self.inner.name)
			.field("inflight", &self.inner.inflight.count())
			.finish()
	}
}
