//! Delivery contexts.
//!
//! A [`Scheduler`] runs jobs "later, somewhere designated". Commands use one
//! to marshal results and state transitions onto a caller-chosen context, the
//! same way a UI framework posts callbacks to its dispatcher thread.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::{TaskClass, panic_message, spawn, spawn_named_thread};

/// Unit of work posted to a scheduler.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Shared scheduler handle.
pub type SchedulerHandle = Arc<dyn Scheduler>;

/// Runs jobs on a designated execution context.
pub trait Scheduler: Send + Sync + 'static {
	/// Posts a job. Jobs posted from one thread run in posting order.
	fn schedule(&self, job: Job);

	/// Name used in traces.
	fn name(&self) -> &str {
		"scheduler"
	}
}

/// Runs each job inline on the posting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateScheduler;

impl ImmediateScheduler {
	pub fn handle() -> SchedulerHandle {
		Arc::new(Self)
	}
}

impl Scheduler for ImmediateScheduler {
	fn schedule(&self, job: Job) {
		job();
	}

	fn name(&self) -> &str {
		"immediate"
	}
}

/// Serial job queue standing in for a UI thread.
///
/// Jobs run one at a time, in posting order, on whatever drives the paired
/// [`DispatcherLoop`]. Jobs posted after the loop is gone are dropped.
#[derive(Clone)]
pub struct Dispatcher {
	name: Arc<str>,
	tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
	/// Creates a dispatcher whose loop the caller drives.
	pub fn manual(name: &str) -> (Self, DispatcherLoop) {
		let (tx, rx) = mpsc::unbounded_channel();
		let name: Arc<str> = Arc::from(name);
		(
			Self {
				name: Arc::clone(&name),
				tx,
			},
			DispatcherLoop { name, rx },
		)
	}

	/// Creates a dispatcher drained by a dedicated named thread.
	pub fn spawn_thread(name: &str) -> std::io::Result<Self> {
		let (dispatcher, event_loop) = Self::manual(name);
		spawn_named_thread(TaskClass::Interactive, name, move || event_loop.run_blocking())?;
		Ok(dispatcher)
	}

	/// Creates a dispatcher drained by a task on the current runtime.
	pub fn spawn(name: &str) -> Self {
		let (dispatcher, event_loop) = Self::manual(name);
		spawn(TaskClass::Interactive, event_loop.run());
		dispatcher
	}

	/// Returns true once the loop side has gone away.
	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}

	pub fn handle(&self) -> SchedulerHandle {
		Arc::new(self.clone())
	}
}

impl Scheduler for Dispatcher {
	fn schedule(&self, job: Job) {
		if self.tx.send(job).is_err() {
			tracing::warn!(dispatcher = %self.name, "dispatcher.closed");
		}
	}

	fn name(&self) -> &str {
		&self.name
	}
}

impl fmt::Debug for Dispatcher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher").field("name", &self.name).finish()
	}
}

/// Consumer side of a [`Dispatcher`].
pub struct DispatcherLoop {
	name: Arc<str>,
	rx: mpsc::UnboundedReceiver<Job>,
}

impl DispatcherLoop {
	/// Runs every queued job, including ones queued while running. Returns how
	/// many ran.
	pub fn run_pending(&mut self) -> usize {
		let mut ran = 0usize;
		while let Ok(job) = self.rx.try_recv() {
			self.run_job(job);
			ran = ran.wrapping_add(1);
		}
		ran
	}

	/// Runs jobs until every dispatcher handle is dropped.
	pub async fn run(mut self) {
		while let Some(job) = self.rx.recv().await {
			self.run_job(job);
		}
		tracing::debug!(dispatcher = %self.name, "dispatcher.stopped");
	}

	/// Blocking variant of [`Self::run`] for dedicated threads.
	pub fn run_blocking(mut self) {
		while let Some(job) = self.rx.blocking_recv() {
			self.run_job(job);
		}
		tracing::debug!(dispatcher = %self.name, "dispatcher.stopped");
	}

	fn run_job(&self, job: Job) {
		if let Err(payload) = catch_unwind(AssertUnwindSafe(job)) {
			tracing::error!(dispatcher = %self.name, panic = %panic_message(payload.as_ref()), "dispatcher.job_panicked");
		}
	}
}

static MAIN_SCHEDULER: LazyLock<RwLock<Option<SchedulerHandle>>> = LazyLock::new(|| RwLock::new(None));

/// Returns the process-wide main scheduler.
///
/// Unless replaced with [`set_main_scheduler`], this is a dispatcher drained by
/// a dedicated `rxui-main` thread, created on first use.
pub fn main_scheduler() -> SchedulerHandle {
	if let Some(current) = MAIN_SCHEDULER.read().as_ref() {
		return Arc::clone(current);
	}

	let mut slot = MAIN_SCHEDULER.write();
	if let Some(current) = slot.as_ref() {
		return Arc::clone(current);
	}
	let scheduler: SchedulerHandle = match Dispatcher::spawn_thread("rxui-main") {
		Ok(dispatcher) => Arc::new(dispatcher),
		Err(err) => {
			tracing::warn!(error = %err, "failed to spawn main dispatcher thread; delivering inline");
			Arc::new(ImmediateScheduler)
		}
	};
	*slot = Some(Arc::clone(&scheduler));
	scheduler
}

/// Replaces the process-wide main scheduler, returning the previous one.
pub fn set_main_scheduler(scheduler: SchedulerHandle) -> Option<SchedulerHandle> {
	MAIN_SCHEDULER.write().replace(scheduler)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};
	use std::time::Duration;

	use parking_lot::Mutex;

	use super::*;

	#[test]
	fn immediate_runs_inline() {
		let ran = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&ran);
		ImmediateScheduler.schedule(Box::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		}));
		assert_eq!(ran.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn manual_dispatcher_runs_in_posting_order() {
		let (dispatcher, mut event_loop) = Dispatcher::manual("test");
		let order = Arc::new(Mutex::new(Vec::new()));
		for i in 0..5 {
			let order = Arc::clone(&order);
			dispatcher.schedule(Box::new(move || order.lock().push(i)));
		}

		assert!(order.lock().is_empty(), "nothing runs before the loop is pumped");
		assert_eq!(event_loop.run_pending(), 5);
		assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
	}

	#[test]
	fn panicking_job_does_not_stop_the_loop() {
		let (dispatcher, mut event_loop) = Dispatcher::manual("test");
		let ran = Arc::new(AtomicUsize::new(0));
		dispatcher.schedule(Box::new(|| panic!("job exploded")));
		let counter = Arc::clone(&ran);
		dispatcher.schedule(Box::new(move || {
			counter.fetch_add(1, Ordering::SeqCst);
		}));

		assert_eq!(event_loop.run_pending(), 2);
		assert_eq!(ran.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn jobs_posted_after_loop_drop_are_dropped() {
		struct DropFlag(Arc<AtomicUsize>);
		impl Drop for DropFlag {
			fn drop(&mut self) {
				self.0.fetch_add(1, Ordering::SeqCst);
			}
		}

		let (dispatcher, event_loop) = Dispatcher::manual("test");
		drop(event_loop);
		assert!(dispatcher.is_closed());

		let dropped = Arc::new(AtomicUsize::new(0));
		let flag = DropFlag(Arc::clone(&dropped));
		dispatcher.schedule(Box::new(move || drop(flag)));
		assert_eq!(dropped.load(Ordering::SeqCst), 1, "captured state is released with the job");
	}

	#[test]
	fn thread_dispatcher_runs_jobs_off_the_caller_thread() {
		let dispatcher = Dispatcher::spawn_thread("rxui-test-dispatcher").expect("spawn dispatcher");
		let (tx, rx) = std::sync::mpsc::channel();
		dispatcher.schedule(Box::new(move || {
			let name = std::thread::current().name().map(str::to_owned);
			let _ = tx.send(name);
		}));
		let name = rx.recv_timeout(Duration::from_secs(2)).expect("job should run");
		assert_eq!(name.as_deref(), Some("rxui-test-dispatcher"));
	}

	#[tokio::test]
	async fn async_dispatcher_drains_on_runtime() {
		let dispatcher = Dispatcher::spawn("async-test");
		let (tx, rx) = tokio::sync::oneshot::channel();
		dispatcher.schedule(Box::new(move || {
			let _ = tx.send(42);
		}));
		let got = tokio::time::timeout(Duration::from_secs(1), rx).await.expect("job should run");
		assert_eq!(got.ok(), Some(42));
	}
}
