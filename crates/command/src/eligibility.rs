//! Eligibility sources feeding a command's executability.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rxui_stream::{Callback, Just, Observable, Subject, Subscription};

use crate::{CanExecuteObservable, CommandError};

/// One tick of an eligibility source. `Err` is routed to the command's
/// thrown exceptions and counts as `false` for that tick.
pub type Eligibility = Result<bool, CommandError>;

type SubscribeFn = dyn Fn(Callback<Eligibility>) -> Subscription + Send + Sync;

/// Caller-supplied "may this command run" signal.
#[derive(Clone)]
pub struct CanExecuteSource {
	subscribe: Arc<SubscribeFn>,
}

impl CanExecuteSource {
	/// Eligible forever.
	pub fn always() -> Self {
		Self::from_fallible(Just::new(Ok(true)))
	}

	/// Wraps an infallible boolean stream.
	pub fn from_observable<O>(source: O) -> Self
	where
		O: Observable<bool> + 'static,
	{
		Self {
			subscribe: Arc::new(move |callback: Callback<Eligibility>| {
				source.observe(Arc::new(move |value: &bool| callback(&Ok(*value))))
			}),
		}
	}

	/// Wraps a stream whose ticks may fail.
	pub fn from_fallible<O>(source: O) -> Self
	where
		O: Observable<Eligibility> + 'static,
	{
		Self {
			subscribe: Arc::new(move |callback: Callback<Eligibility>| source.observe(callback)),
		}
	}

	/// `parent ∧ every child`, recombined whenever any input changes.
	///
	/// The parent counts as `true` until it says otherwise. Nothing is
	/// emitted until every child has reported. Parent failures pass through.
	pub(crate) fn all(parent: CanExecuteSource, children: Vec<CanExecuteObservable>) -> Self {
		Self {
			subscribe: Arc::new(move |callback: Callback<Eligibility>| {
				let out: Subject<Eligibility> = Subject::new();
				let combine = Arc::new(Mutex::new(Combine {
					parent: true,
					children: vec![None; children.len()],
				}));
				let mut subs = vec![out.observe(callback)];

				for (idx, child) in children.iter().enumerate() {
					let (out, combine) = (out.clone(), Arc::clone(&combine));
					subs.push(child.subscribe(move |value: &bool| {
						out.next_with(|| {
							let mut combine = combine.lock();
							combine.children[idx] = Some(*value);
							combine.value().map(Ok)
						});
					}));
				}

				let (tx, state) = (out.clone(), Arc::clone(&combine));
				subs.push(parent.observe(Arc::new(move |tick: &Eligibility| match tick {
					Ok(value) => tx.next_with(|| {
						let mut combine = state.lock();
						combine.parent = *value;
						combine.value().map(Ok)
					}),
					Err(err) => tx.next(Err(err.clone())),
				})));

				// Parent starts out eligible: emit once the children have all reported.
				out.next_with(|| combine.lock().value().map(Ok));

				Subscription::new(move || drop(subs))
			}),
		}
	}
}

struct Combine {
	parent: bool,
	children: Vec<Option<bool>>,
}

impl Combine {
	fn value(&self) -> Option<bool> {
		let mut all = self.parent;
		for child in &self.children {
			all &= (*child)?;
		}
		Some(all)
	}
}

impl Default for CanExecuteSource {
	fn default() -> Self {
		Self::always()
	}
}

impl Observable<Eligibility> for CanExecuteSource {
	fn observe(&self, callback: Callback<Eligibility>) -> Subscription {
		(self.subscribe)(callback)
	}
}

impl fmt::Debug for CanExecuteSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CanExecuteSource").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use rxui_stream::StateSubject;

	use super::*;

	fn record(source: &CanExecuteSource) -> (Arc<Mutex<Vec<Option<bool>>>>, Subscription) {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let sub = source.subscribe(move |tick: &Eligibility| sink.lock().push(tick.as_ref().ok().copied()));
		(seen, sub)
	}

	#[test]
	fn always_emits_true_once() {
		let (seen, _sub) = record(&CanExecuteSource::always());
		assert_eq!(*seen.lock(), vec![Some(true)]);
	}

	#[test]
	fn observable_ticks_are_wrapped_in_ok() {
		let state = StateSubject::new(false);
		let (seen, _sub) = record(&CanExecuteSource::from_observable(state.clone()));
		state.set(true);
		assert_eq!(*seen.lock(), vec![Some(false), Some(true)]);
	}

	#[test]
	fn fallible_ticks_pass_through() {
		let subject: Subject<Eligibility> = Subject::new();
		let (seen, _sub) = record(&CanExecuteSource::from_fallible(subject.clone()));
		subject.next(Ok(true));
		subject.next(Err(CommandError::eligibility(anyhow::anyhow!("flaky"))));
		assert_eq!(*seen.lock(), vec![Some(true), None]);
	}

	#[test]
	fn combine_waits_for_every_child() {
		let combine = Combine {
			parent: true,
			children: vec![Some(true), None],
		};
		assert_eq!(combine.value(), None);

		let combine = Combine {
			parent: true,
			children: vec![Some(true), Some(false)],
		};
		assert_eq!(combine.value(), Some(false));

		let combine = Combine {
			parent: false,
			children: vec![Some(true)],
		};
		assert_eq!(combine.value(), Some(false));
	}
}
