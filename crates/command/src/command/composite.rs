use std::future::ready;
use std::sync::Arc;

use futures::{StreamExt, stream};
use rxui_stream::{SchedulerHandle, main_scheduler};

use super::{Command, CommandSpec, ReactiveCommand};
use crate::CanExecuteSource;

impl<P> ReactiveCommand<P, P>
where
	P: Clone + Send + Sync + 'static,
{
	/// Command that executes every child with its parameter, in order.
	///
	/// Executable while `can_execute` holds and every child can execute. The
	/// composite does not wait for its children or collect their results.
	pub fn create_combined(can_execute: CanExecuteSource, children: Vec<Arc<dyn Command<P>>>) -> Self {
		Self::create_combined_on(can_execute, children, main_scheduler())
	}

	pub fn create_combined_on(
		can_execute: CanExecuteSource,
		children: Vec<Arc<dyn Command<P>>>,
		scheduler: SchedulerHandle,
	) -> Self {
		let states = children.iter().map(|child| child.can_execute_observable()).collect();
		let eligibility = CanExecuteSource::all(can_execute, states);
		let spec = CommandSpec::new(move |parameter: P, _| {
			for child in &children {
				child.execute(parameter.clone());
			}
			Ok(stream::once(ready(Ok(parameter))).boxed())
		});
		Self::new(spec.can_execute(eligibility).scheduler(scheduler).name("combined"))
	}
}
