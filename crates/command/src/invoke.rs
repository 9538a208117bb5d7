use std::sync::Arc;

use parking_lot::Mutex;
use rxui_stream::{Observable, Subscription};

use crate::Command;

/// Executes `command` with every value of `source`.
///
/// Values that arrive while the command cannot execute are held back; only
/// the latest one is kept, and it runs as soon as the command becomes
/// executable again. A value that runs straight away discards any held-back
/// one. Dropping the returned subscription stops both sides.
pub fn invoke_command<P, O>(source: &O, command: Arc<dyn Command<P>>) -> Subscription
where
	P: Clone + Send + Sync + 'static,
	O: Observable<P> + ?Sized,
{
	let pending: Arc<Mutex<Option<P>>> = Arc::new(Mutex::new(None));

	let (waiting, target) = (Arc::clone(&pending), Arc::clone(&command));
	let ready = command.can_execute_observable().subscribe(move |executable: &bool| {
		if *executable {
			run_pending(&waiting, target.as_ref());
		}
	});

	let values = source.observe(Arc::new(move |parameter: &P| {
		let run_now = {
			let mut slot = pending.lock();
			if command.can_execute(parameter) {
				*slot = None;
				true
			} else {
				*slot = Some(parameter.clone());
				false
			}
		};
		if run_now {
			command.execute(parameter.clone());
		} else {
			tracing::trace!("command.invoke.deferred");
			// Executability may have flipped back before the value was stored.
			run_pending(&pending, command.as_ref());
		}
	}));

	Subscription::new(move || {
		drop(values);
		drop(ready);
	})
}

/// Runs the held-back value if the command accepts it now.
fn run_pending<P>(pending: &Mutex<Option<P>>, command: &dyn Command<P>) {
	let parameter = {
		let mut slot = pending.lock();
		let runnable = slot.as_ref().is_some_and(|parameter| command.can_execute(parameter));
		if runnable { slot.take() } else { None }
	};
	if let Some(parameter) = parameter {
		command.execute(parameter);
	}
}
