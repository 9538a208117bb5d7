//! Where background work runs.
//!
//! Callers inside a tokio runtime spawn onto it. Callers outside one, such as
//! a dispatcher thread delivering results, land on a small shared runtime
//! built on first use.

use std::future::Future;
use std::sync::LazyLock;

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;

const FALLBACK_WORKERS: usize = 2;

/// Labels spawned work in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Delivery onto a designated context, such as a UI dispatcher.
	Interactive,
	/// Async work that drives one command invocation.
	Background,
	/// Blocking calculations executed on the blocking pool.
	Blocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::Blocking => "blocking",
		}
	}
}

static FALLBACK: LazyLock<Runtime> = LazyLock::new(|| {
	tracing::debug!(workers = FALLBACK_WORKERS, "rx.fallback_runtime");
	Builder::new_multi_thread()
		.enable_all()
		.worker_threads(FALLBACK_WORKERS)
		.thread_name("rxui-global")
		.build()
		.expect("failed to build rxui fallback runtime")
});

/// Returns the caller's runtime, or the shared fallback outside of one.
pub fn runtime_handle() -> Handle {
	Handle::try_current().unwrap_or_else(|_| FALLBACK.handle().clone())
}

pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "rx.spawn");
	runtime_handle().spawn(fut)
}

pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(task_class = class.as_str(), "rx.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}

/// Starts a dedicated named OS thread.
pub fn spawn_named_thread<F, R>(class: TaskClass, name: impl Into<String>, f: F) -> std::io::Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	let name = name.into();
	tracing::trace!(task_class = class.as_str(), thread = %name, "rx.spawn_thread");
	std::thread::Builder::new().name(name).spawn(f)
}
