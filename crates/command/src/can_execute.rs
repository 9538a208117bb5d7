//! Derived executability: `eligible ∧ ¬executing ∧ ¬vetoed`.
//!
//! The cell connects to its inputs lazily, the first time anything reads or
//! observes it, and stays connected until [`CanExecuteCell::detach_all`].
//! Input callbacks hold the cell weakly, so a connected cell does not keep
//! its command alive.

use std::fmt;
use std::mem;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rxui_stream::{Callback, Observable, StateSource, StateSubject, Subscription};

use crate::exceptions::ExceptionChannel;
use crate::{CanExecuteSource, Eligibility};

/// Inputs the cell derives its value from.
pub(crate) struct CellSources {
	pub(crate) eligibility: CanExecuteSource,
	pub(crate) executing: Option<StateSource<bool>>,
	pub(crate) veto: Option<StateSource<bool>>,
}

enum Link {
	Idle(CellSources),
	Attaching,
	Attached(#[allow(dead_code, reason = "held for their drop")] Vec<Subscription>),
	Detached,
}

#[derive(Debug, Default)]
struct Inputs {
	eligible: Option<bool>,
	executing: bool,
	vetoed: bool,
}

impl Inputs {
	fn value(&self) -> bool {
		self.eligible.unwrap_or(false) && !self.executing && !self.vetoed
	}
}

struct CellInner {
	command: u64,
	output: StateSubject<bool>,
	inputs: Mutex<Inputs>,
	link: Mutex<Link>,
	exceptions: ExceptionChannel,
}

impl CellInner {
	fn apply(&self, f: impl FnOnce(&mut Inputs)) {
		self.output.update(|_| {
			let mut inputs = self.inputs.lock();
			f(&mut inputs);
			inputs.value()
		});
	}
}

#[derive(Clone)]
pub(crate) struct CanExecuteCell {
	inner: Arc<CellInner>,
}

impl CanExecuteCell {
	pub(crate) fn new(command: u64, sources: CellSources, exceptions: ExceptionChannel) -> Self {
		Self {
			inner: Arc::new(CellInner {
				command,
				output: StateSubject::new(false),
				inputs: Mutex::new(Inputs::default()),
				link: Mutex::new(Link::Idle(sources)),
				exceptions,
			}),
		}
	}

	/// Connects to the inputs if nothing has yet. Idempotent and safe to call
	/// from inside an input callback.
	pub(crate) fn attach(&self) {
		let sources = {
			let mut link = self.inner.link.lock();
			match mem::replace(&mut *link, Link::Attaching) {
				Link::Idle(sources) => sources,
				other => {
					*link = other;
					return;
				}
			}
		};
		tracing::debug!(command = self.inner.command, "command.can_execute.attach");

		let mut subs = Vec::with_capacity(3);
		let weak = Arc::downgrade(&self.inner);

		if let Some(executing) = sources.executing {
			let weak = Weak::clone(&weak);
			subs.push(executing.subscribe(move |value: &bool| {
				if let Some(inner) = weak.upgrade() {
					inner.apply(|inputs| inputs.executing = *value);
				}
			}));
		}
		if let Some(veto) = sources.veto {
			let weak = Weak::clone(&weak);
			subs.push(veto.subscribe(move |value: &bool| {
				if let Some(inner) = weak.upgrade() {
					inner.apply(|inputs| inputs.vetoed = *value);
				}
			}));
		}
		subs.push(sources.eligibility.subscribe(move |tick: &Eligibility| {
			let Some(inner) = weak.upgrade() else { return };
			let eligible = match tick {
				Ok(value) => *value,
				Err(err) => {
					inner.exceptions.push(err.clone());
					false
				}
			};
			inner.apply(|inputs| inputs.eligible = Some(eligible));
		}));

		let mut link = self.inner.link.lock();
		if matches!(*link, Link::Attaching) {
			*link = Link::Attached(subs);
		} else {
			drop(link);
			drop(subs);
		}
	}

	/// Disconnects from the inputs for good.
	pub(crate) fn detach_all(&self) {
		let previous = mem::replace(&mut *self.inner.link.lock(), Link::Detached);
		drop(previous);
		tracing::debug!(command = self.inner.command, "command.can_execute.detach");
	}

	/// Current value, connecting first.
	pub(crate) fn get(&self) -> bool {
		self.attach();
		self.inner.output.get()
	}

	/// Fires only on transitions, connecting first.
	pub(crate) fn subscribe_changes<F>(&self, f: F) -> Subscription
	where
		F: Fn(&bool) + Send + Sync + 'static,
	{
		let sub = self.inner.output.subscribe_changes(f);
		self.attach();
		sub
	}

	pub(crate) fn observable(&self) -> CanExecuteObservable {
		CanExecuteObservable { cell: self.clone() }
	}
}

/// Executability of a command as a state stream.
///
/// Subscribers get the current value immediately, then every flip.
/// Subscribing connects the command's inputs if nothing has yet.
#[derive(Clone)]
pub struct CanExecuteObservable {
	cell: CanExecuteCell,
}

impl CanExecuteObservable {
	/// Current executability.
	pub fn get(&self) -> bool {
		self.cell.get()
	}
}

impl Observable<bool> for CanExecuteObservable {
	fn observe(&self, callback: Callback<bool>) -> Subscription {
		let sub = self.cell.inner.output.observe(callback);
		self.cell.attach();
		sub
	}
}

impl fmt::Debug for CanExecuteObservable {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CanExecuteObservable")
			.field("command", &self.cell.inner.command)
			.finish_non_exhaustive()
	}
}
