//! Serialized multicast core shared by [`Subject`](crate::Subject) and
//! [`StateSubject`](crate::StateSubject).
//!
//! Values are queued under the channel lock and delivered outside of it by
//! whichever caller currently owns the drain. A push from inside an observer,
//! or from another thread while a drain is running, is queued and delivered by
//! the running drain, so every observer sees values in push order.
//!
//! Each queued value carries a sequence number. Observers remember the
//! sequence at which they attached and never see values queued before that,
//! which keeps replayed state ahead of anything pushed after attachment.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use slab::Slab;

use crate::{Callback, Subscription};

struct Registered<T> {
	callback: Callback<T>,
	from: u64,
}

struct Queued<T> {
	seq: u64,
	target: Option<usize>,
	value: T,
}

pub(crate) struct ChannelState<T> {
	observers: Slab<Registered<T>>,
	queue: VecDeque<Queued<T>>,
	next_seq: u64,
	draining: bool,
	pub(crate) current: Option<T>,
}

impl<T> ChannelState<T> {
	/// Queues a value for every observer, or only for `target`.
	pub(crate) fn enqueue(&mut self, target: Option<usize>, value: T) {
		let seq = self.next_seq;
		self.next_seq = self.next_seq.wrapping_add(1);
		self.queue.push_back(Queued { seq, target, value });
	}

	pub(crate) fn has_observers(&self) -> bool {
		!self.observers.is_empty()
	}
}

pub(crate) struct Channel<T> {
	state: Mutex<ChannelState<T>>,
}

impl<T> Channel<T>
where
	T: Send + 'static,
{
	pub(crate) fn new(current: Option<T>) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(ChannelState {
				observers: Slab::new(),
				queue: VecDeque::new(),
				next_seq: 0,
				draining: false,
				current,
			}),
		})
	}

	/// Runs `f` under the channel lock, then delivers whatever it queued.
	pub(crate) fn transact<R>(&self, f: impl FnOnce(&mut ChannelState<T>) -> R) -> R {
		let out = f(&mut self.state.lock());
		self.drain();
		out
	}

	/// Reads state under the channel lock without delivering.
	pub(crate) fn inspect<R>(&self, f: impl FnOnce(&ChannelState<T>) -> R) -> R {
		f(&self.state.lock())
	}

	pub(crate) fn observer_count(&self) -> usize {
		self.state.lock().observers.len()
	}

	/// Registers an observer. `replay` decides whether the current value, if
	/// any, is queued for it ahead of later pushes.
	pub(crate) fn attach(self: &Arc<Self>, callback: Callback<T>, replay: impl FnOnce(&ChannelState<T>) -> Option<T>) -> Subscription {
		let key = self.transact(|state| {
			let from = state.next_seq;
			let key = state.observers.insert(Registered { callback, from });
			if let Some(value) = replay(state) {
				state.enqueue(Some(key), value);
			}
			key
		});

		let weak = Arc::downgrade(self);
		Subscription::new(move || {
			if let Some(channel) = weak.upgrade() {
				let mut state = channel.state.lock();
				if state.observers.contains(key) {
					state.observers.remove(key);
				}
			}
		})
	}

	fn drain(&self) {
		{
			let mut state = self.state.lock();
			if state.draining {
				return;
			}
			state.draining = true;
		}
		let _reset = DrainReset(self);

		loop {
			let (queued, targets) = {
				let mut state = self.state.lock();
				let Some(queued) = state.queue.pop_front() else {
					state.draining = false;
					return;
				};
				let targets: Vec<Callback<T>> = state
					.observers
					.iter()
					.filter(|(key, obs)| obs.from <= queued.seq && queued.target.is_none_or(|target| target == *key))
					.map(|(_, obs)| Arc::clone(&obs.callback))
					.collect();
				(queued, targets)
			};

			for callback in targets {
				callback(&queued.value);
			}
		}
	}
}

/// Releases drain ownership if an observer panics mid-delivery.
struct DrainReset<'a, T>(&'a Channel<T>);

impl<T> Drop for DrainReset<'_, T> {
	fn drop(&mut self) {
		if std::thread::panicking() {
			self.0.state.lock().draining = false;
		}
	}
}
