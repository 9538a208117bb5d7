use std::sync::Arc;

use crate::Subscription;

/// Shared observer callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A push-based source of values.
pub trait Observable<T>: Send + Sync {
	/// Attaches a callback and returns the handle that detaches it.
	fn observe(&self, callback: Callback<T>) -> Subscription;

	/// Attaches a closure.
	fn subscribe<F>(&self, f: F) -> Subscription
	where
		F: Fn(&T) + Send + Sync + 'static,
		Self: Sized,
	{
		self.observe(Arc::new(f))
	}
}

impl<T, O> Observable<T> for Arc<O>
where
	O: Observable<T> + ?Sized,
{
	fn observe(&self, callback: Callback<T>) -> Subscription {
		(**self).observe(callback)
	}
}

/// Emits one value to every subscriber at subscription time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Just<T>(T);

impl<T> Just<T> {
	pub fn new(value: T) -> Self {
		Self(value)
	}
}

impl<T: Send + Sync> Observable<T> for Just<T> {
	fn observe(&self, callback: Callback<T>) -> Subscription {
		callback(&self.0);
		Subscription::empty()
	}
}
