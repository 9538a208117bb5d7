//! Lazy, shared handle to one command invocation.
//!
//! Nothing runs until the first subscriber attaches. Later subscribers share
//! the same run. When the last subscriber detaches before the run finishes,
//! the run is cancelled and the handle is finished for good; anyone
//! subscribing afterwards gets an immediate empty completion.

use std::fmt;
use std::sync::Arc;

use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use rxui_stream::{Callback, Observable, ObservableStream, Subscription};
use slab::Slab;
use tokio_util::sync::CancellationToken;

use crate::{CommandError, Result};

pub(crate) type Starter<T> = Box<dyn FnOnce(ExecutionSink<T>, CancellationToken) + Send>;

type Completion = Box<dyn FnOnce() + Send>;

/// Values of one invocation as a `Stream`. Ends when the invocation does.
pub type ExecutionStream<T> = ObservableStream<T>;

enum Phase<T> {
	Pending(Starter<T>),
	Running(CancellationToken),
	Finished,
}

struct Watcher<T> {
	next: Callback<T>,
	complete: Completion,
}

struct ExecState<T> {
	phase: Phase<T>,
	watchers: Slab<Watcher<T>>,
}

struct Shared<T> {
	command: u64,
	state: Mutex<ExecState<T>>,
}

impl<T> Shared<T> {
	fn release(&self, key: usize) {
		let mut state = self.state.lock();
		if state.watchers.contains(key) {
			state.watchers.remove(key);
		}
		if !state.watchers.is_empty() {
			return;
		}
		if let Phase::Running(cancel) = &state.phase {
			cancel.cancel();
			state.phase = Phase::Finished;
			tracing::debug!(command = self.command, "command.execution.cancelled");
		}
	}
}

/// Handle returned by `execute_async`.
pub struct Execution<T> {
	shared: Arc<Shared<T>>,
}

impl<T> Clone for Execution<T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T> Execution<T>
where
	T: Clone + Send + 'static,
{
	pub(crate) fn new(command: u64, starter: Starter<T>) -> Self {
		Self {
			shared: Arc::new(Shared {
				command,
				state: Mutex::new(ExecState {
					phase: Phase::Pending(starter),
					watchers: Slab::new(),
				}),
			}),
		}
	}

	/// Attaches value and completion callbacks. The first attachment starts
	/// the invocation on the calling thread.
	pub fn subscribe_with<N, C>(&self, next: N, complete: C) -> Subscription
	where
		N: Fn(&T) + Send + Sync + 'static,
		C: FnOnce() + Send + 'static,
	{
		let (key, start) = {
			let mut state = self.shared.state.lock();
			let start = match std::mem::replace(&mut state.phase, Phase::Finished) {
				Phase::Finished => {
					drop(state);
					complete();
					return Subscription::empty();
				}
				Phase::Running(cancel) => {
					state.phase = Phase::Running(cancel);
					None
				}
				Phase::Pending(starter) => {
					let cancel = CancellationToken::new();
					state.phase = Phase::Running(cancel.clone());
					Some((starter, cancel))
				}
			};
			let key = state.watchers.insert(Watcher {
				next: Arc::new(next),
				complete: Box::new(complete),
			});
			(key, start)
		};

		if let Some((starter, cancel)) = start {
			starter(
				ExecutionSink {
					shared: Arc::clone(&self.shared),
				},
				cancel,
			);
		}

		let shared = Arc::clone(&self.shared);
		Subscription::new(move || shared.release(key))
	}

	/// Returns true once the invocation has completed or been cancelled.
	pub fn is_finished(&self) -> bool {
		matches!(self.shared.state.lock().phase, Phase::Finished)
	}

	/// Subscribes and yields the invocation's values as a stream.
	pub fn into_stream(self) -> ExecutionStream<T> {
		let (tx, rx) = mpsc::unbounded();
		let done = tx.clone();
		let subscription = self.subscribe_with(
			move |value: &T| {
				let _ = tx.unbounded_send(value.clone());
			},
			move || done.close_channel(),
		);
		ObservableStream::from_parts(rx, subscription)
	}

	/// Subscribes and resolves to the last value produced.
	///
	/// Resolves to [`CommandError::NoResult`] when the invocation ends without
	/// producing anything, including when it failed (the failure itself goes
	/// to the command's thrown exceptions).
	pub async fn last(self) -> Result<T> {
		self.into_stream()
			.fold(None, |_, value| async move { Some(value) })
			.await
			.ok_or(CommandError::NoResult)
	}
}

impl<T> Observable<T> for Execution<T>
where
	T: Clone + Send + 'static,
{
	fn observe(&self, callback: Callback<T>) -> Subscription {
		self.subscribe_with(move |value: &T| callback(value), || {})
	}
}

impl<T> fmt::Debug for Execution<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let state = self.shared.state.lock();
		let phase = match state.phase {
			Phase::Pending(_) => "pending",
			Phase::Running(_) => "running",
			Phase::Finished => "finished",
		};
		f.debug_struct("Execution")
			.field("command", &self.shared.command)
			.field("phase", &phase)
			.field("subscribers", &state.watchers.len())
			.finish()
	}
}

/// Producer side handed to the starter.
pub(crate) struct ExecutionSink<T> {
	shared: Arc<Shared<T>>,
}

impl<T> Clone for ExecutionSink<T> {
	fn clone(&self) -> Self {
		Self {
			shared: Arc::clone(&self.shared),
		}
	}
}

impl<T> ExecutionSink<T> {
	pub(crate) fn emit(&self, value: &T) {
		let targets: Vec<Callback<T>> = {
			let state = self.shared.state.lock();
			if !matches!(state.phase, Phase::Running(_)) {
				return;
			}
			state.watchers.iter().map(|(_, w)| Arc::clone(&w.next)).collect()
		};
		for next in targets {
			next(value);
		}
	}

	pub(crate) fn complete(&self) {
		let watchers = {
			let mut state = self.shared.state.lock();
			if !matches!(state.phase, Phase::Running(_)) {
				return;
			}
			state.phase = Phase::Finished;
			std::mem::take(&mut state.watchers)
		};
		for (_, watcher) in watchers {
			(watcher.complete)();
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use super::*;

	type Captured = Arc<Mutex<Option<(ExecutionSink<u32>, CancellationToken)>>>;

	fn captured_execution() -> (Execution<u32>, Captured, Arc<AtomicUsize>) {
		let slot: Captured = Arc::new(Mutex::new(None));
		let starts = Arc::new(AtomicUsize::new(0));
		let (slot_in, starts_in) = (Arc::clone(&slot), Arc::clone(&starts));
		let execution = Execution::new(
			0,
			Box::new(move |sink, cancel| {
				starts_in.fetch_add(1, Ordering::SeqCst);
				*slot_in.lock() = Some((sink, cancel));
			}),
		);
		(execution, slot, starts)
	}

	#[test]
	fn nothing_starts_without_a_subscriber() {
		let (execution, _slot, starts) = captured_execution();
		let _clone = execution.clone();
		assert_eq!(starts.load(Ordering::SeqCst), 0);
		assert!(!execution.is_finished());
	}

	#[test]
	fn subscribers_share_one_run() {
		let (execution, slot, starts) = captured_execution();
		let seen = Arc::new(Mutex::new(Vec::new()));
		let (a, b) = (Arc::clone(&seen), Arc::clone(&seen));
		let _first = execution.subscribe(move |v| a.lock().push(("first", *v)));
		let _second = execution.subscribe(move |v| b.lock().push(("second", *v)));
		assert_eq!(starts.load(Ordering::SeqCst), 1);

		let (sink, _) = slot.lock().clone().expect("started");
		sink.emit(&5);
		sink.complete();

		assert_eq!(*seen.lock(), vec![("first", 5), ("second", 5)]);
		assert!(execution.is_finished());
	}

	#[test]
	fn last_unsubscribe_cancels_the_run() {
		let (execution, slot, _) = captured_execution();
		let first = execution.subscribe(|_| {});
		let second = execution.subscribe(|_| {});
		let (_, cancel) = slot.lock().clone().expect("started");

		drop(first);
		assert!(!cancel.is_cancelled());
		drop(second);
		assert!(cancel.is_cancelled());
		assert!(execution.is_finished());
	}

	#[test]
	fn late_subscribers_complete_immediately() {
		let (execution, slot, starts) = captured_execution();
		let _sub = execution.subscribe(|_| {});
		let (sink, _) = slot.lock().clone().expect("started");
		sink.complete();

		let completed = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&completed);
		let late = execution.subscribe_with(
			|_| panic!("late subscriber must not see values"),
			move || {
				counter.fetch_add(1, Ordering::SeqCst);
			},
		);
		assert!(!late.is_active());
		assert_eq!(completed.load(Ordering::SeqCst), 1);
		assert_eq!(starts.load(Ordering::SeqCst), 1, "finished runs never restart");
	}

	#[tokio::test]
	async fn last_resolves_to_final_value_or_no_result() {
		let (execution, slot, _) = captured_execution();
		let pending = tokio::spawn(execution.last());
		tokio::task::yield_now().await;
		let (sink, _) = loop {
			if let Some(started) = slot.lock().clone() {
				break started;
			}
			tokio::task::yield_now().await;
		};
		sink.emit(&1);
		sink.emit(&2);
		sink.complete();
		assert_eq!(pending.await.expect("join").ok(), Some(2));

		let (empty, slot, _) = captured_execution();
		let pending = tokio::spawn(empty.last());
		let (sink, _) = loop {
			if let Some(started) = slot.lock().clone() {
				break started;
			}
			tokio::task::yield_now().await;
		};
		sink.complete();
		assert!(matches!(pending.await.expect("join"), Err(CommandError::NoResult)));
	}
}
