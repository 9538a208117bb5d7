#![cfg_attr(test, allow(unused_crate_dependencies))]
//! Reactive command execution core.
//!
//! A command turns a parameter into asynchronously produced results while
//! tracking how many invocations are in flight and whether it may run.
//!
//! # Main Types
//!
//! - [`ReactiveCommand`] - lazy, shared invocations with derived executability
//! - [`AsyncCommand`] - concurrency-gated command with registered work
//! - [`MemoCache`] - LRU result cache behind memoized registrations
//! - [`CanExecuteSource`] - caller-supplied eligibility signal
//!
//! Executability is `eligible ∧ ¬executing` for plain commands and
//! `eligible ∧ in-flight < cap` for gated ones. It is connected lazily, the
//! first time anything reads it, and re-emitted only on change.
//!
//! Failures never terminate a command's streams. They are routed to
//! [`ReactiveCommand::thrown_exceptions`], or to the process-wide handler set
//! with [`set_default_exception_handler`] when nobody is listening.

mod async_command;
mod can_execute;
mod command;
mod eligibility;
mod error;
mod exceptions;
mod execution;
mod inflight;
mod invoke;
mod memo;

pub use async_command::{AsyncCommand, AsyncCommandSpec, DEFAULT_MAX_CONCURRENT};
pub use can_execute::CanExecuteObservable;
pub use command::{Command, CommandSpec, ReactiveCommand, ResultStream};
pub use eligibility::{CanExecuteSource, Eligibility};
pub use error::{CommandError, InflightUnderflow, Result};
pub use exceptions::{ThrownExceptions, reset_default_exception_handler, set_default_exception_handler};
pub use execution::{Execution, ExecutionStream};
pub use invoke::invoke_command;
pub use memo::{DEFAULT_MEMO_CAPACITY, MemoCache};
