#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rxui_stream::{ImmediateScheduler, SchedulerHandle};

pub fn immediate() -> SchedulerHandle {
	ImmediateScheduler::handle()
}

pub fn recorder<T: Clone + Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(&T) + Send + Sync + 'static) {
	let seen = Arc::new(Mutex::new(Vec::new()));
	let sink = Arc::clone(&seen);
	(seen, move |v: &T| sink.lock().push(v.clone()))
}

/// Polls `cond` until it holds, panicking after a couple of seconds.
pub async fn settle(what: &str, cond: impl Fn() -> bool) {
	for _ in 0..400 {
		if cond() {
			return;
		}
		tokio::time::sleep(Duration::from_millis(5)).await;
	}
	panic!("timed out waiting for {what}");
}
