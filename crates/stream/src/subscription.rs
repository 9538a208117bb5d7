use std::fmt;

/// Handle to an attached observer.
///
/// Dropping the handle detaches the observer. Use [`Subscription::detach`] to
/// keep the observer attached for the lifetime of its source instead.
#[must_use = "dropping a subscription detaches the observer"]
pub struct Subscription {
	teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
	/// Creates a subscription that runs `teardown` once when unsubscribed.
	pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
		Self {
			teardown: Some(Box::new(teardown)),
		}
	}

	/// Creates a subscription with nothing to tear down.
	pub fn empty() -> Self {
		Self { teardown: None }
	}

	/// Detaches the observer now.
	pub fn unsubscribe(mut self) {
		if let Some(teardown) = self.teardown.take() {
			teardown();
		}
	}

	/// Leaves the observer attached and forgets the handle.
	pub fn detach(mut self) {
		self.teardown = None;
	}

	/// Returns true while the handle still owns a teardown.
	pub fn is_active(&self) -> bool {
		self.teardown.is_some()
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(teardown) = self.teardown.take() {
			teardown();
		}
	}
}

impl fmt::Debug for Subscription {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription").field("active", &self.is_active()).finish()
	}
}
