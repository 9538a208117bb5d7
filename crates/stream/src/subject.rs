use std::fmt;
use std::sync::Arc;

use crate::channel::Channel;
use crate::{Callback, Observable, Subscription};

/// Multicast event stream without replay.
///
/// Observers receive every value pushed after they attach. Cloning a subject
/// yields another handle to the same stream.
pub struct Subject<T> {
	channel: Arc<Channel<T>>,
}

impl<T> Clone for Subject<T> {
	fn clone(&self) -> Self {
		Self {
			channel: Arc::clone(&self.channel),
		}
	}
}

impl<T: Send + 'static> Default for Subject<T> {
	fn default() -> Self {
		Self::new()
	}
}

impl<T: Send + 'static> Subject<T> {
	pub fn new() -> Self {
		Self { channel: Channel::new(None) }
	}

	/// Pushes a value to all current observers.
	pub fn next(&self, value: T) {
		self.channel.transact(|state| state.enqueue(None, value));
	}

	/// Pushes whatever `f` produces, computed under the subject lock.
	///
	/// Concurrent callers that derive the value from shared state inside `f`
	/// deliver in the same order they observed that state.
	pub fn next_with(&self, f: impl FnOnce() -> Option<T>) {
		self.channel.transact(|state| {
			if let Some(value) = f() {
				state.enqueue(None, value);
			}
		});
	}

	/// Pushes `value` if anyone is attached, otherwise hands it back.
	///
	/// The check and the push happen under the same lock, so a value is never
	/// lost to an observer detaching in between.
	pub fn try_next(&self, value: T) -> Result<(), T> {
		self.channel.transact(|state| {
			if state.has_observers() {
				state.enqueue(None, value);
				Ok(())
			} else {
				Err(value)
			}
		})
	}

	pub fn observer_count(&self) -> usize {
		self.channel.observer_count()
	}

	pub fn has_observers(&self) -> bool {
		self.observer_count() > 0
	}

	/// Returns a read-only view of this subject.
	pub fn source(&self) -> EventSource<T> {
		EventSource { subject: self.clone() }
	}
}

impl<T: Send + 'static> Observable<T> for Subject<T> {
	fn observe(&self, callback: Callback<T>) -> Subscription {
		self.channel.attach(callback, |_| None)
	}
}

impl<T> fmt::Debug for Subject<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subject").finish_non_exhaustive()
	}
}

/// Subscribe-only view of a [`Subject`].
pub struct EventSource<T> {
	subject: Subject<T>,
}

impl<T> Clone for EventSource<T> {
	fn clone(&self) -> Self {
		Self {
			subject: self.subject.clone(),
		}
	}
}

impl<T: Send + 'static> Observable<T> for EventSource<T> {
	fn observe(&self, callback: Callback<T>) -> Subscription {
		self.subject.observe(callback)
	}
}

impl<T> fmt::Debug for EventSource<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventSource").finish_non_exhaustive()
	}
}
