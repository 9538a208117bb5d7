//! Thrown-exceptions channel and the process-wide fallback handler.

use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use rxui_stream::{Callback, EventSource, Observable, Subject, Subscription};

use crate::CommandError;

type ExceptionHandler = dyn Fn(&CommandError) + Send + Sync;

static DEFAULT_HANDLER: LazyLock<RwLock<Option<Arc<ExceptionHandler>>>> = LazyLock::new(|| RwLock::new(None));

/// Replaces the handler that receives errors nobody is observing.
///
/// The built-in handler logs at `error` level. Handlers must not panic.
pub fn set_default_exception_handler(handler: impl Fn(&CommandError) + Send + Sync + 'static) {
	*DEFAULT_HANDLER.write() = Some(Arc::new(handler));
}

/// Restores the built-in logging handler.
pub fn reset_default_exception_handler() {
	*DEFAULT_HANDLER.write() = None;
}

/// Serializes tests that replace the process-wide handler.
#[cfg(test)]
pub(crate) static HANDLER_TEST_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

fn unobserved(command: u64, err: &CommandError) {
	let handler = DEFAULT_HANDLER.read().clone();
	match handler {
		Some(handler) => handler(err),
		None => tracing::error!(command, error = %err, "command.unobserved_exception"),
	}
}

/// Producer side owned by a command.
#[derive(Clone)]
pub(crate) struct ExceptionChannel {
	command: u64,
	subject: Subject<CommandError>,
}

impl ExceptionChannel {
	pub(crate) fn new(command: u64) -> Self {
		Self {
			command,
			subject: Subject::new(),
		}
	}

	/// Delivers to observers, or to the default handler when there are none.
	pub(crate) fn push(&self, err: CommandError) {
		tracing::debug!(command = self.command, error = %err, "command.exception");
		if let Err(err) = self.subject.try_next(err) {
			unobserved(self.command, &err);
		}
	}

	pub(crate) fn source(&self) -> ThrownExceptions {
		ThrownExceptions {
			source: self.subject.source(),
		}
	}
}

/// Stream of errors raised by a command's execution function or its
/// eligibility source.
#[derive(Clone)]
pub struct ThrownExceptions {
	source: EventSource<CommandError>,
}

impl Observable<CommandError> for ThrownExceptions {
	fn observe(&self, callback: Callback<CommandError>) -> Subscription {
		self.source.observe(callback)
	}
}

impl fmt::Debug for ThrownExceptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ThrownExceptions").finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	use parking_lot::Mutex;

	use super::*;

	#[test]
	fn observed_errors_bypass_the_default_handler() {
		let channel = ExceptionChannel::new(7);
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let _sub = channel.source().subscribe(move |err: &CommandError| sink.lock().push(err.to_string()));

		channel.push(CommandError::Panicked("kaboom".into()));
		assert_eq!(*seen.lock(), vec!["command execution panicked: kaboom".to_string()]);
	}

	#[test]
	fn error_raised_while_last_observer_detaches_is_not_lost() {
		let channel = ExceptionChannel::new(8);
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = Arc::clone(&seen);
		let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
		let own = Arc::clone(&slot);
		let sub = channel.source().subscribe(move |err: &CommandError| {
			sink.lock().push(err.to_string());
			drop(own.lock().take());
		});
		*slot.lock() = Some(sub);

		let _handler = HANDLER_TEST_LOCK.lock();
		let handled = Arc::new(Mutex::new(Vec::new()));
		let fallback = Arc::clone(&handled);
		crate::set_default_exception_handler(move |err| {
			if matches!(err, CommandError::Panicked(msg) if msg.starts_with("detach-")) {
				fallback.lock().push(err.to_string());
			}
		});
		channel.push(CommandError::Panicked("detach-first".into()));
		channel.push(CommandError::Panicked("detach-second".into()));
		crate::reset_default_exception_handler();

		assert_eq!(*seen.lock(), vec!["command execution panicked: detach-first".to_string()]);
		assert_eq!(*handled.lock(), vec!["command execution panicked: detach-second".to_string()]);
	}
}
