//! Concurrency-gated command with registered work.
//!
//! An [`AsyncCommand`] reports itself executable while fewer than a
//! configured number of invocations are in flight. Each parameter is handed to every registration; the
//! invocation stays in flight until all of them have finished and their
//! results have been delivered, then pulses completion once.

use std::fmt;
use std::future::{Future, ready};
use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::{FutureExt, Stream, StreamExt, stream};
use parking_lot::Mutex;
use rxui_stream::{
	EventSource, Observable, SchedulerHandle, StateSource, Subject, Subscription, TaskClass, panic_message, spawn,
	spawn_blocking,
};

use crate::command::Predicate;
use crate::inflight::{InflightCounter, InflightGuard};
use crate::{CanExecuteObservable, CanExecuteSource, Command, CommandError, CommandSpec, MemoCache, ReactiveCommand, ThrownExceptions};

/// Default number of invocations an [`AsyncCommand`] runs at once.
pub const DEFAULT_MAX_CONCURRENT: usize = 1;

/// Configuration for an [`AsyncCommand`].
pub struct AsyncCommandSpec<P> {
	max_concurrent: usize,
	can_execute: CanExecuteSource,
	scheduler: Option<SchedulerHandle>,
	predicate: Option<Arc<Predicate<P>>>,
	name: Option<String>,
}

impl<P> Default for AsyncCommandSpec<P> {
	fn default() -> Self {
		Self {
			max_concurrent: DEFAULT_MAX_CONCURRENT,
			can_execute: CanExecuteSource::always(),
			scheduler: None,
			predicate: None,
			name: None,
		}
	}
}

impl<P> AsyncCommandSpec<P> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Caps concurrent invocations. `0` removes the cap.
	#[must_use]
	pub fn max_concurrent(mut self, max: usize) -> Self {
		self.max_concurrent = max;
		self
	}

	#[must_use]
	pub fn can_execute(mut self, source: CanExecuteSource) -> Self {
		self.can_execute = source;
		self
	}

	#[must_use]
	pub fn scheduler(mut self, scheduler: SchedulerHandle) -> Self {
		self.scheduler = Some(scheduler);
		self
	}

	/// Adds a synchronous per-parameter check. Being at capacity still wins.
	#[must_use]
	pub fn predicate(mut self, predicate: impl Fn(&P) -> bool + Send + Sync + 'static) -> Self {
		self.predicate = Some(Arc::new(predicate));
		self
	}

	#[must_use]
	pub fn name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());
		self
	}
}

impl<P> fmt::Debug for AsyncCommandSpec<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AsyncCommandSpec")
			.field("max_concurrent", &self.max_concurrent)
			.field("name", &self.name)
			.finish_non_exhaustive()
	}
}

/// Holds one gate slot for an accepted invocation. Dropping the last clone
/// frees the slot, then pulses completion.
struct Ticket {
	slot: Option<InflightGuard>,
	completed: Subject<()>,
}

impl Drop for Ticket {
	fn drop(&mut self) {
		if let Some(slot) = self.slot.take() {
			slot.release();
		}
		self.completed.next(());
	}
}

/// Accepted parameter travelling through the inner command.
#[derive(Clone)]
pub(crate) struct Invocation<P> {
	parameter: P,
	ticket: Arc<Ticket>,
}

type WorkStream<R> = BoxStream<'static, Result<R, CommandError>>;

struct AsyncInner<P> {
	engine: ReactiveCommand<Invocation<P>, Invocation<P>>,
	gate: Arc<InflightCounter>,
	completed: Subject<()>,
	predicate: Option<Arc<Predicate<P>>>,
	registrations: Mutex<Vec<Subscription>>,
}

/// Gated command that fans each accepted parameter out to registered work.
pub struct AsyncCommand<P> {
	inner: Arc<AsyncInner<P>>,
}

impl<P> Clone for AsyncCommand<P> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<P> AsyncCommand<P>
where
	P: Clone + Send + Sync + 'static,
{
	pub fn new(spec: AsyncCommandSpec<P>) -> Self {
		let gate = InflightCounter::new("async_command", spec.max_concurrent);
		let mut engine_spec = CommandSpec::echo()
			.can_execute(spec.can_execute)
			.gated_by(gate.saturated());
		if let Some(scheduler) = spec.scheduler {
			engine_spec = engine_spec.scheduler(scheduler);
		}
		if let Some(name) = spec.name {
			engine_spec = engine_spec.name(name);
		}

		Self {
			inner: Arc::new(AsyncInner {
				engine: ReactiveCommand::new(engine_spec),
				gate,
				completed: Subject::new(),
				predicate: spec.predicate,
				registrations: Mutex::new(Vec::new()),
			}),
		}
	}

	/// One-shot convenience: a default command running `calculation` for each
	/// parameter and handing every result to `on_result`.
	pub fn create<R, F, C>(calculation: F, on_result: C) -> Self
	where
		R: Clone + Send + Sync + 'static,
		F: Fn(P) -> anyhow::Result<R> + Send + Sync + 'static,
		C: Fn(&R) + Send + Sync + 'static,
	{
		let command = Self::new(AsyncCommandSpec::default());
		let results = command.register_async_function(calculation);
		let sub = results.subscribe(on_result);
		command.inner.registrations.lock().push(sub);
		command
	}

	/// Starts an invocation. At or over capacity the invocation still runs;
	/// the cap only holds [`Self::can_execute`] at `false` until the in-flight
	/// count drops below it.
	pub fn execute(&self, parameter: P) {
		let slot = self.inner.gate.enter();
		let inflight = self.inner.gate.count();
		let max = self.inner.gate.limit();
		if max > 0 && inflight > max {
			tracing::warn!(command = self.inner.engine.id(), inflight, max, "async_command.over_capacity");
		} else {
			tracing::debug!(command = self.inner.engine.id(), inflight, "async_command.accepted");
		}
		let ticket = Arc::new(Ticket {
			slot: Some(slot),
			completed: self.inner.completed.clone(),
		});
		self.inner.engine.execute(Invocation { parameter, ticket });
	}

	/// Executable: eligible, below capacity, and the predicate holds.
	pub fn can_execute(&self, parameter: &P) -> bool {
		self.inner.engine.can_execute_snapshot() && self.inner.predicate.as_ref().is_none_or(|check| check(parameter))
	}

	pub fn can_execute_observable(&self) -> CanExecuteObservable {
		self.inner.engine.can_execute_observable()
	}

	pub fn can_execute_changed<F>(&self, f: F) -> Subscription
	where
		F: Fn(bool) + Send + Sync + 'static,
	{
		self.inner.engine.can_execute_changed(f)
	}

	/// Whether any accepted invocation is still in flight.
	pub fn is_executing(&self) -> StateSource<bool> {
		self.inner.gate.executing()
	}

	/// Live in-flight count, starting with the current value.
	pub fn items_inflight(&self) -> StateSource<usize> {
		self.inner.gate.tally()
	}

	pub fn current_items_inflight(&self) -> usize {
		self.inner.gate.count()
	}

	/// Pulses once per finished invocation.
	pub fn completions(&self) -> EventSource<()> {
		self.inner.completed.source()
	}

	pub fn thrown_exceptions(&self) -> ThrownExceptions {
		self.inner.engine.thrown_exceptions()
	}

	/// Accepted parameters, as delivered on the scheduler.
	pub fn accepted(&self) -> impl Observable<P> + Clone + use<P> {
		AcceptedParameters {
			source: self.inner.engine.results(),
		}
	}

	/// Drops every registration and disconnects executability inputs.
	pub fn dispose(&self) {
		let registrations = std::mem::take(&mut *self.inner.registrations.lock());
		drop(registrations);
		self.inner.engine.dispose();
	}

	/// Runs a blocking function on the blocking pool for each parameter.
	pub fn register_async_function<R, F>(&self, f: F) -> EventSource<R>
	where
		R: Send + 'static,
		F: Fn(P) -> anyhow::Result<R> + Send + Sync + 'static,
	{
		let f = Arc::new(f);
		self.register_work(move |parameter| {
			let f = Arc::clone(&f);
			stream::once(run_blocking(move || f(parameter))).boxed()
		})
	}

	/// Runs a blocking side effect for each parameter. Emits `()` per success.
	pub fn register_async_action<F>(&self, f: F) -> EventSource<()>
	where
		F: Fn(P) -> anyhow::Result<()> + Send + Sync + 'static,
	{
		self.register_async_function(f)
	}

	/// Runs a future for each parameter.
	pub fn register_async_task<R, F, Fut>(&self, f: F) -> EventSource<R>
	where
		R: Send + 'static,
		F: Fn(P) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
	{
		self.register_work(move |parameter| stream::once(f(parameter).map(|r| r.map_err(CommandError::execution))).boxed())
	}

	/// Runs a stream for each parameter, forwarding every item.
	pub fn register_async_stream<R, F, S>(&self, f: F) -> EventSource<R>
	where
		R: Send + 'static,
		F: Fn(P) -> S + Send + Sync + 'static,
		S: Stream<Item = anyhow::Result<R>> + Send + 'static,
	{
		self.register_work(move |parameter| f(parameter).map(|item| item.map_err(CommandError::execution)).boxed())
	}

	/// Like [`Self::register_async_function`], answering repeated parameters
	/// from `cache` without calling `f`.
	///
	/// Concurrent invocations with the same uncached parameter each call `f`.
	pub fn register_memoized_function<R, F>(&self, f: F, cache: Arc<MemoCache<P, R>>) -> EventSource<R>
	where
		P: Hash + Eq,
		R: Clone + Send + 'static,
		F: Fn(P) -> anyhow::Result<R> + Send + Sync + 'static,
	{
		let f = Arc::new(f);
		self.register_work(move |parameter: P| {
			if let Some(hit) = cache.get(&parameter) {
				tracing::trace!("async_command.memo_hit");
				return stream::once(ready(Ok(hit))).boxed();
			}
			let (f, cache) = (Arc::clone(&f), Arc::clone(&cache));
			stream::once(run_blocking(move || {
				let value = f(parameter.clone())?;
				cache.insert(parameter, value.clone());
				Ok(value)
			}))
			.boxed()
		})
	}

	/// Like [`Self::register_async_task`], answering repeated parameters from
	/// `cache` without calling `f`.
	pub fn register_memoized_task<R, F, Fut>(&self, f: F, cache: Arc<MemoCache<P, R>>) -> EventSource<R>
	where
		P: Hash + Eq,
		R: Clone + Send + 'static,
		F: Fn(P) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
	{
		self.register_work(move |parameter: P| {
			if let Some(hit) = cache.get(&parameter) {
				tracing::trace!("async_command.memo_hit");
				return stream::once(ready(Ok(hit))).boxed();
			}
			let cache = Arc::clone(&cache);
			let work = f(parameter.clone());
			stream::once(async move {
				let value = work.await.map_err(CommandError::execution)?;
				cache.insert(parameter, value.clone());
				Ok::<R, CommandError>(value)
			})
			.boxed()
		})
	}

	fn register_work<R, W>(&self, work: W) -> EventSource<R>
	where
		R: Send + 'static,
		W: Fn(P) -> WorkStream<R> + Send + Sync + 'static,
	{
		let out: Subject<R> = Subject::new();
		let engine = self.inner.engine.clone();
		let downstream = out.clone();
		let id = engine.id();

		let sub = self.inner.engine.subscribe(move |invocation: &Invocation<P>| {
			let ticket = Arc::clone(&invocation.ticket);
			let (engine, out) = (engine.clone(), downstream.clone());
			let started = catch_unwind(AssertUnwindSafe(|| work(invocation.parameter.clone())));
			let mut items = match started {
				Ok(items) => items,
				Err(payload) => {
					engine.report(CommandError::Panicked(panic_message(payload.as_ref())));
					return;
				}
			};

			spawn(TaskClass::Background, async move {
				let drained = AssertUnwindSafe(async {
					while let Some(item) = items.next().await {
						match item {
							Ok(value) => {
								let out = out.clone();
								engine.scheduler().schedule(Box::new(move || out.next(value)));
							}
							Err(err) => {
								engine.report(err);
								break;
							}
						}
					}
				})
				.catch_unwind()
				.await;
				if let Err(payload) = drained {
					engine.report(CommandError::Panicked(panic_message(payload.as_ref())));
				}
				tracing::trace!(command = id, "async_command.work_done");
				engine.scheduler().schedule(Box::new(move || drop(ticket)));
			});
		});
		self.inner.registrations.lock().push(sub);
		out.source()
	}
}

/// Runs `f` on the blocking pool, mapping failures and panics.
async fn run_blocking<R, F>(f: F) -> Result<R, CommandError>
where
	R: Send + 'static,
	F: FnOnce() -> anyhow::Result<R> + Send + 'static,
{
	match spawn_blocking(TaskClass::Blocking, f).await {
		Ok(result) => result.map_err(CommandError::execution),
		Err(err) if err.is_panic() => Err(CommandError::Panicked(panic_message(err.into_panic().as_ref()))),
		Err(err) => Err(CommandError::execution(err)),
	}
}

#[derive(Clone)]
struct AcceptedParameters<P> {
	source: EventSource<Invocation<P>>,
}

impl<P> Observable<P> for AcceptedParameters<P>
where
	P: Clone + Send + Sync + 'static,
{
	fn observe(&self, callback: rxui_stream::Callback<P>) -> Subscription {
		self.source
			.observe(Arc::new(move |invocation: &Invocation<P>| callback(&invocation.parameter)))
	}
}

impl<P> Command<P> for AsyncCommand<P>
where
	P: Clone + Send + Sync + 'static,
{
	fn can_execute(&self, parameter: &P) -> bool {
		AsyncCommand::can_execute(self, parameter)
	}

	fn execute(&self, parameter: P) {
		AsyncCommand::execute(self, parameter);
	}

	fn can_execute_observable(&self) -> CanExecuteObservable {
		AsyncCommand::can_execute_observable(self)
	}
}

impl<P> fmt::Debug for AsyncCommand<P> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AsyncCommand")
			.field("inflight", &self.inner.gate.count())
			.field("max_concurrent", &self.inner.gate.limit())
			.finish_non_exhaustive()
	}
}
