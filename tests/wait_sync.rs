//! Integration tests for AWAIT-SYNC / AWAIT-ANY rendezvous

use choreo::capability::{Capabilities, CapabilityCall, RecordingCapabilities, Rgb};
use choreo::interpreter::ScriptRunner;
use choreo::runtime::{AnimationContext, EngineConfig, InteractionContext, Performer};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn runner() -> (Arc<RecordingCapabilities>, Arc<ScriptRunner>) {
    let recorder = Arc::new(RecordingCapabilities::new());
    let performer = Performer::new(
        EngineConfig::default(),
        Capabilities::recording(recorder.clone()),
    );
    (recorder, Arc::new(ScriptRunner::new(Arc::new(performer))))
}

fn spawn_run(runner: &Arc<ScriptRunner>, script: &'static str) -> tokio::task::JoinHandle<bool> {
    let runner = runner.clone();
    tokio::spawn(async move {
        let mut animation = AnimationContext::default();
        let mut interaction = InteractionContext::default();
        runner
            .run_animation_script(script, false, &mut animation, &mut interaction)
            .await
    })
}

async fn wait_until_armed(runner: &ScriptRunner) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !runner.performer().wait_slot().is_armed() {
        assert!(Instant::now() < deadline, "wait never armed");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

const LED: CapabilityCall = CapabilityCall::Led(Rgb {
    red: 1,
    green: 2,
    blue: 3,
});

#[tokio::test]
async fn test_named_signal_releases_only_its_own_wait() {
    let (recorder, runner) = runner();
    let started = Instant::now();
    let run = spawn_run(&runner, "AWAIT-SYNC:\"foo\",1000;LED:1,2,3");

    wait_until_armed(&runner).await;
    assert!(!runner.signal("bar"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(recorder.calls().is_empty());

    assert!(runner.signal("foo"));
    assert!(run.await.unwrap());
    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_eq!(recorder.calls(), vec![LED]);
}

#[tokio::test]
async fn test_wait_times_out_and_the_script_continues() {
    let (recorder, runner) = runner();
    let started = Instant::now();

    assert!(spawn_run(&runner, "AWAIT-SYNC:foo,100;LED:1,2,3").await.unwrap());
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(recorder.calls(), vec![LED]);
    assert!(!runner.performer().wait_slot().is_armed());
}

#[tokio::test]
async fn test_await_any_accepts_any_signal() {
    let (recorder, runner) = runner();
    let run = spawn_run(&runner, "AWAIT-ANY:2000;LED:1,2,3");

    wait_until_armed(&runner).await;
    assert!(runner.signal("whatever"));
    assert!(run.await.unwrap());
    assert_eq!(recorder.calls(), vec![LED]);
}

#[tokio::test]
async fn test_stop_releases_a_suspended_wait() {
    let (recorder, runner) = runner();
    let started = Instant::now();
    let run = spawn_run(&runner, "AWAIT-SYNC:foo,5000;LED:1,2,3");

    wait_until_armed(&runner).await;
    assert!(runner.stop_running_animation_scripts().await);
    assert!(!run.await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(recorder.calls().is_empty());
}
