//! Convenience constructors for common execution shapes.

use std::future::{Future, ready};

use futures::{Stream, StreamExt, stream};
use tokio_util::sync::CancellationToken;

use super::{CommandSpec, ReactiveCommand};
use crate::CanExecuteSource;

impl<P> CommandSpec<P, P>
where
	P: Send + 'static,
{
	/// Execution that produces its parameter once.
	pub fn echo() -> Self {
		Self::new(|parameter, _| Ok(stream::once(ready(Ok(parameter))).boxed()))
	}
}

impl<P, T> CommandSpec<P, T>
where
	P: Send + 'static,
	T: Send + 'static,
{
	/// Execution backed by a stream of fallible values.
	pub fn from_stream<F, S>(f: F) -> Self
	where
		F: Fn(P) -> S + Send + Sync + 'static,
		S: Stream<Item = anyhow::Result<T>> + Send + 'static,
	{
		Self::new(move |parameter, _| Ok(f(parameter).boxed()))
	}

	/// Execution backed by a future producing one value.
	pub fn from_task<F, Fut>(f: F) -> Self
	where
		F: Fn(P) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		Self::new(move |parameter, _| Ok(stream::once(f(parameter)).boxed()))
	}

	/// Like [`Self::from_task`], with a token that fires once every subscriber
	/// of the invocation has detached.
	pub fn from_cancellable_task<F, Fut>(f: F) -> Self
	where
		F: Fn(P, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		Self::new(move |parameter, cancel| Ok(stream::once(f(parameter, cancel)).boxed()))
	}
}

impl<P> ReactiveCommand<P, P>
where
	P: Clone + Send + Sync + 'static,
{
	/// Command whose result is its parameter.
	pub fn create(can_execute: CanExecuteSource) -> Self {
		Self::new(CommandSpec::echo().can_execute(can_execute))
	}
}

impl<P, T> ReactiveCommand<P, T>
where
	P: Send + 'static,
	T: Clone + Send + Sync + 'static,
{
	pub fn create_async_stream<F, S>(can_execute: CanExecuteSource, f: F) -> Self
	where
		F: Fn(P) -> S + Send + Sync + 'static,
		S: Stream<Item = anyhow::Result<T>> + Send + 'static,
	{
		Self::new(CommandSpec::from_stream(f).can_execute(can_execute))
	}

	pub fn create_async_task<F, Fut>(can_execute: CanExecuteSource, f: F) -> Self
	where
		F: Fn(P) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		Self::new(CommandSpec::from_task(f).can_execute(can_execute))
	}

	pub fn create_async_task_cancellable<F, Fut>(can_execute: CanExecuteSource, f: F) -> Self
	where
		F: Fn(P, CancellationToken) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
	{
		Self::new(CommandSpec::from_cancellable_task(f).can_execute(can_execute))
	}
}
