#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Event-stream primitives for reactive commands.
//!
//! This crate provides the small push-based toolkit the command engine is
//! built on:
//!
//! - [`Subject`] - multicast stream without replay
//! - [`StateSubject`] - last-value cell that replays its current value and
//!   only notifies on change
//! - [`Subscription`] - detach handle, released on drop
//! - [`Scheduler`] - delivery context ([`ImmediateScheduler`], [`Dispatcher`])
//! - [`to_stream`] - adapter into a `futures::Stream`
//!
//! Delivery is serialized per subject: values pushed from inside an observer
//! or from concurrent threads are queued and delivered in push order, and no
//! lock is held while observers run.

mod adapter;
mod channel;
mod observable;
mod panic;
mod runtime;
mod scheduler;
mod state;
mod subject;
mod subscription;

pub use adapter::{ObservableStream, to_stream};
pub use observable::{Callback, Just, Observable};
pub use panic::panic_message;
pub use runtime::{TaskClass, runtime_handle, spawn, spawn_blocking, spawn_named_thread};
pub use scheduler::{
	Dispatcher, DispatcherLoop, ImmediateScheduler, Job, Scheduler, SchedulerHandle, main_scheduler, set_main_scheduler,
};
pub use state::{StateSource, StateSubject};
pub use subject::{EventSource, Subject};
pub use subscription::Subscription;
