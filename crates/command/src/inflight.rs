//! In-flight invocation counting.
//!
//! The count lives in an atomic updated by compare-and-swap. Derived state
//! (`tally`, `executing`, `saturated`) is recomputed from the atomic inside
//! each state cell's lock, so observers see transitions in the order the
//! counter actually moved.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rxui_stream::{StateSource, StateSubject};

use crate::InflightUnderflow;

pub(crate) struct InflightCounter {
	name: &'static str,
	count: AtomicUsize,
	limit: usize,
	tally: StateSubject<usize>,
	executing: StateSubject<bool>,
	saturated: StateSubject<bool>,
}

impl InflightCounter {
	/// Creates a counter. `limit == 0` means unbounded.
	pub(crate) fn new(name: &'static str, limit: usize) -> Arc<Self> {
		Arc::new(Self {
			name,
			count: AtomicUsize::new(0),
			limit,
			tally: StateSubject::new(0),
			executing: StateSubject::new(false),
			saturated: StateSubject::new(false),
		})
	}

	pub(crate) fn count(&self) -> usize {
		self.count.load(Ordering::Acquire)
	}

	pub(crate) fn limit(&self) -> usize {
		self.limit
	}

	fn at_capacity(&self, count: usize) -> bool {
		self.limit > 0 && count >= self.limit
	}

	/// Registers an invocation. Going past the limit only raises `saturated`.
	pub(crate) fn enter(self: &Arc<Self>) -> InflightGuard {
		self.count.fetch_add(1, Ordering::AcqRel);
		self.publish();
		InflightGuard {
			counter: Some(Arc::clone(self)),
		}
	}

	/// Releases one invocation. Refuses to go below zero.
	pub(crate) fn exit(&self) -> Result<(), InflightUnderflow> {
		let mut current = self.count.load(Ordering::Acquire);
		loop {
			if current == 0 {
				let err = InflightUnderflow { counter: self.name };
				tracing::error!(counter = self.name, error = %err, "command.inflight_underflow");
				return Err(err);
			}
			match self
				.count
				.compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
			{
				Ok(_) => break,
				Err(actual) => current = actual,
			}
		}
		self.publish();
		Ok(())
	}

	fn publish(&self) {
		self.tally.update(|_| self.count());
		self.executing.update(|_| self.count() > 0);
		self.saturated.update(|_| self.at_capacity(self.count()));
		tracing::trace!(counter = self.name, inflight = self.count(), "command.inflight");
	}

	pub(crate) fn tally(&self) -> StateSource<usize> {
		self.tally.source()
	}

	pub(crate) fn executing(&self) -> StateSource<bool> {
		self.executing.source()
	}

	pub(crate) fn saturated(&self) -> StateSource<bool> {
		self.saturated.source()
	}
}

impl fmt::Debug for InflightCounter {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InflightCounter")
			.field("name", &self.name)
			.field("count", &self.count())
			.field("limit", &self.limit)
			.finish()
	}
}

/// One registered invocation. Releases its slot exactly once, on drop.
pub(crate) struct InflightGuard {
	counter: Option<Arc<InflightCounter>>,
}

impl InflightGuard {
	/// Releases the slot now.
	pub(crate) fn release(mut self) {
		self.release_slot();
	}

	fn release_slot(&mut self) {
		if let Some(counter) = self.counter.take() {
			let _ = counter.exit();
		}
	}
}

impl Drop for InflightGuard {
	fn drop(&mut self) {
		self.release_slot();
	}
}

impl fmt::Debug for InflightGuard {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("InflightGuard")
			.field("active", &self.counter.is_some())
			.finish()
	}
}
