use std::fmt;
use std::sync::Arc;

use crate::channel::Channel;
use crate::{Callback, Observable, Subscription};

/// Last-value-remembered state cell.
///
/// New observers receive the current value immediately, then every change.
/// Writing a value equal to the current one is a no-op, so observers only
/// hear about actual transitions.
pub struct StateSubject<T> {
	channel: Arc<Channel<T>>,
}

impl<T> Clone for StateSubject<T> {
	fn clone(&self) -> Self {
		Self {
			channel: Arc::clone(&self.channel),
		}
	}
}

impl<T> StateSubject<T>
where
	T: Clone + PartialEq + Send + Sync + 'static,
{
	pub fn new(initial: T) -> Self {
		Self {
			channel: Channel::new(Some(initial)),
		}
	}

	/// Returns the current value.
	pub fn get(&self) -> T {
		self.channel
			.inspect(|state| state.current.clone())
			.expect("state subject always holds a value")
	}

	/// Stores `value`. Returns true if it differed from the current value.
	pub fn set(&self, value: T) -> bool {
		self.update(|_| value)
	}

	/// Computes the next value from the current one under the cell lock.
	///
	/// Writers that derive the value from shared state inside `f` observe
	/// that state in the same order their updates are delivered.
	pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
		self.channel.transact(|state| {
			let Some(current) = state.current.as_ref() else {
				return false;
			};
			let next = f(current);
			if *current == next {
				return false;
			}
			state.current = Some(next.clone());
			state.enqueue(None, next);
			true
		})
	}

	/// Attaches a callback that only fires on transitions, without replay.
	pub fn subscribe_changes<F>(&self, f: F) -> Subscription
	where
		F: Fn(&T) + Send + Sync + 'static,
	{
		self.channel.attach(Arc::new(f), |_| None)
	}

	pub fn observer_count(&self) -> usize {
		self.channel.observer_count()
	}

	/// Returns a read-only view of this cell.
	pub fn source(&self) -> StateSource<T> {
		StateSource { state: self.clone() }
	}
}

impl<T> Observable<T> for StateSubject<T>
where
	T: Clone + PartialEq + Send + Sync + 'static,
{
	fn observe(&self, callback: Callback<T>) -> Subscription {
		self.channel.attach(callback, |state| state.current.clone())
	}
}

impl<T> fmt::Debug for StateSubject<T>
where
	T: Clone + PartialEq + Send + Sync + fmt::Debug + 'static,
{
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StateSubject").field("current", &self.get()).finish()
	}
}

/// Read-only view of a [`StateSubject`].
pub struct StateSource<T> {
	state: StateSubject<T>,
}

impl<T> Clone for StateSource<T> {
	fn clone(&self) -> Self {
		Self { state: self.state.clone() }
	}
}

impl<T> StateSource<T>
where
	T: Clone + PartialEq + Send + Sync + 'static,
{
	pub fn get(&self) -> T {
		self.state.get()
	}

	pub fn subscribe_changes<F>(&self, f: F) -> Subscription
	where
		F: Fn(&T) + Send + Sync + 'static,
	{
		self.state.subscribe_changes(f)
	}
}

impl<T> Observable<T> for StateSource<T>
where
	T: Clone + PartialEq + Send + Sync + 'static,
{
	fn observe(&self, callback: Callback<T>) -> Subscription {
		self.state.observe(callback)
	}
}
