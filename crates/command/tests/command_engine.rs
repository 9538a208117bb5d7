mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, stream};
use proptest::prelude::*;
use rxui_command::{CanExecuteSource, Command, CommandError, CommandSpec, ReactiveCommand, invoke_command};
use rxui_stream::{Dispatcher, Observable, StateSubject, Subject, Subscription};

use common::{immediate, recorder, settle};

#[tokio::test]
async fn results_are_marshalled_onto_the_dispatcher() {
	let _ = tracing_subscriber::fmt::try_init();
	let (dispatcher, mut event_loop) = Dispatcher::manual("ui");
	let command = ReactiveCommand::new(
		CommandSpec::from_stream(|n: u8| stream::iter((1..=n).map(Ok))).scheduler(dispatcher.handle()),
	);
	let (results, record) = recorder::<u8>();
	let _sub = command.subscribe(record);

	command.execute(3);
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert!(results.lock().is_empty(), "nothing is delivered until the dispatcher runs");
	assert!(command.is_executing().get(), "still in flight until completion is delivered");

	event_loop.run_pending();
	assert_eq!(*results.lock(), vec![1, 2, 3]);
	assert!(!command.is_executing().get());
}

#[tokio::test]
async fn shared_execution_runs_once_for_many_subscribers() {
	let runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
	let counter = Arc::clone(&runs);
	let command = ReactiveCommand::new(
		CommandSpec::from_task(move |x: u8| {
			counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
			async move { Ok(x) }
		})
		.scheduler(immediate()),
	);

	let execution = command.execute_async(5);
	let (a, record_a) = recorder::<u8>();
	let (b, record_b) = recorder::<u8>();
	let _first = execution.subscribe(record_a);
	let _second = execution.subscribe(record_b);

	settle("execution to finish", || execution.is_finished()).await;
	assert_eq!(runs.load(std::sync::atomic::Ordering::SeqCst), 1);
	assert_eq!(*a.lock(), vec![5]);
	assert_eq!(*b.lock(), vec![5]);
}

#[tokio::test]
async fn eligibility_faults_are_reported_and_read_as_false() {
	let ticks: Subject<Result<bool, CommandError>> = Subject::new();
	let command = ReactiveCommand::new(
		CommandSpec::from_task(|x: u8| async move { Ok(x) })
			.can_execute(CanExecuteSource::from_fallible(ticks.clone()))
			.scheduler(immediate()),
	);
	let (errors, record) = recorder::<String>();
	let _errs = command.thrown_exceptions().subscribe(move |e: &CommandError| record(&e.to_string()));

	assert!(!command.can_execute(&0));
	ticks.next(Ok(true));
	assert!(command.can_execute(&0));
	ticks.next(Err(CommandError::eligibility(anyhow::anyhow!("sensor offline"))));
	assert!(!command.can_execute(&0));
	ticks.next(Ok(true));
	assert!(command.can_execute(&0));

	assert_eq!(*errors.lock(), vec!["can-execute evaluation failed: sensor offline".to_string()]);
}

#[tokio::test]
async fn invoke_command_forwards_values_while_executable() {
	let command = ReactiveCommand::create_async_task(CanExecuteSource::always(), |x: u8| async move { Ok(x) });
	let source: Subject<u8> = Subject::new();
	let (seen, record) = recorder::<u8>();
	let _results = command.subscribe(record);
	let target: Arc<dyn Command<u8>> = Arc::new(command.clone());
	let _link = invoke_command(&source, target);

	source.next(4);
	settle("forwarded value", || !seen.lock().is_empty()).await;
	assert_eq!(*seen.lock(), vec![4]);
}

#[derive(Debug, Clone)]
enum Step {
	Eligible(bool),
	Start,
	Finish,
}

fn step() -> impl Strategy<Value = Step> {
	prop_oneof![any::<bool>().prop_map(Step::Eligible), Just(Step::Start), Just(Step::Finish)]
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(24))]

	#[test]
	fn can_execute_is_eligible_and_idle(steps in proptest::collection::vec(step(), 1..24)) {
		let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().expect("runtime");
		rt.block_on(async move {
			let eligible = StateSubject::new(true);
			let command = ReactiveCommand::new(
				CommandSpec::<(), ()>::new(|(), _| Ok(stream::pending().boxed()))
					.can_execute(CanExecuteSource::from_observable(eligible.clone()))
					.scheduler(immediate()),
			);
			let (flips, record) = recorder::<bool>();
			let _changes = command.can_execute_changed(move |v| record(&v));

			let mut live: Vec<Subscription> = Vec::new();
			// Attaching flips the initial `false` to `true`.
			let mut expected = vec![true];
			for step in steps {
				match step {
					Step::Eligible(value) => {
						eligible.set(value);
					}
					Step::Start => live.push(command.execute_async(()).subscribe(|_| {})),
					Step::Finish => {
						live.pop();
					}
				}
				let target = live.len();
				settle("in-flight count", || command.inflight() == target).await;

				let want = eligible.get() && live.is_empty();
				assert_eq!(command.can_execute(&()), want);
				if expected.last() != Some(&want) {
					expected.push(want);
				}
			}
			assert_eq!(*flips.lock(), expected, "changed fires exactly on flips");
		});
	}
}
