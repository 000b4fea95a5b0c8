//! Integration tests for multi-robot fan-out
//!
//! Sigil decoding end to end through the runner, plus the HTTP transport
//! against a mock peer.

use choreo::capability::{
    Capabilities, CapabilityCall, HttpPeerTransport, RecordingCapabilities,
};
use choreo::interpreter::ScriptRunner;
use choreo::runtime::{AnimationContext, EngineConfig, InteractionContext, Peer, Performer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn troupe_config() -> EngineConfig {
    EngineConfig {
        robot_name: "misty-1".into(),
        self_ip: Some("10.0.0.1".into()),
        peers: vec![
            Peer::new("misty-1", "10.0.0.1"),
            Peer::new("misty-2", "10.0.0.2"),
            Peer::new("misty-3", "10.0.0.3"),
        ],
        ..EngineConfig::default()
    }
}

async fn run(runner: &ScriptRunner, script: &str, repeat: bool) -> bool {
    let mut animation = AnimationContext::default();
    let mut interaction = InteractionContext::default();
    runner
        .run_animation_script(script, repeat, &mut animation, &mut interaction)
        .await
}

fn posts(calls: &[CapabilityCall]) -> Vec<(String, serde_json::Value)> {
    calls
        .iter()
        .filter_map(|call| match call {
            CapabilityCall::PostJson { url, payload } => Some((url.clone(), payload.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_include_self_and_await_ack_runs_locally_and_relays() {
    let recorder = Arc::new(RecordingCapabilities::new());
    let performer = Performer::new(troupe_config(), Capabilities::recording(recorder.clone()));
    let runner = ScriptRunner::new(Arc::new(performer));

    assert!(run(&runner, "LIGHT$$%:true", false).await);

    let calls = recorder.calls();
    assert_eq!(calls[0], CapabilityCall::Flashlight { on: true });
    let command = json!({"command": "LIGHT:true", "origin": "misty-1"});
    assert_eq!(
        posts(&calls),
        vec![
            ("http://10.0.0.2:80/api/choreo/command".to_string(), command.clone()),
            ("http://10.0.0.3:80/api/choreo/command".to_string(), command),
        ]
    );
}

#[tokio::test]
async fn test_others_only_skips_the_local_call() {
    let recorder = Arc::new(RecordingCapabilities::new());
    let performer = Performer::new(troupe_config(), Capabilities::recording(recorder.clone()));
    let runner = ScriptRunner::new(Arc::new(performer));

    assert!(run(&runner, "LIGHT$:true", false).await);
    // `$` posts are detached.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let calls = recorder.calls();
    assert!(
        !calls
            .iter()
            .any(|call| matches!(call, CapabilityCall::Flashlight { .. }))
    );
    let mut urls: Vec<String> = posts(&calls).into_iter().map(|(url, _)| url).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "http://10.0.0.2:80/api/choreo/command".to_string(),
            "http://10.0.0.3:80/api/choreo/command".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_sync_and_event_are_relayed_never_run_locally() {
    let recorder = Arc::new(RecordingCapabilities::new());
    let performer = Performer::new(troupe_config(), Capabilities::recording(recorder.clone()));
    let runner = ScriptRunner::new(Arc::new(performer));

    assert!(
        run(
            &runner,
            "SYNC$$:wave;EVENT$$%:greet,hello,hello there",
            false
        )
        .await
    );

    let sent = posts(&recorder.calls());
    assert_eq!(sent.len(), 5);
    assert_eq!(
        sent[0],
        (
            "http://10.0.0.2:80/api/choreo/sync".to_string(),
            json!({"sync": "wave", "origin": "misty-1"})
        )
    );
    // `$$%` loops the event back to this robot as well.
    let event_urls: Vec<&str> = sent[2..].iter().map(|(url, _)| url.as_str()).collect();
    assert_eq!(
        event_urls,
        vec![
            "http://10.0.0.1:80/api/choreo/event",
            "http://10.0.0.2:80/api/choreo/event",
            "http://10.0.0.3:80/api/choreo/event",
        ]
    );
    assert_eq!(
        sent[2].1,
        json!({"trigger": "greet", "filter": "hello", "text": "hello there", "origin": "misty-1"})
    );
}

#[tokio::test]
async fn test_peer_override_applies_from_second_pass() {
    let recorder = Arc::new(RecordingCapabilities::new());
    let performer = Performer::new(troupe_config(), Capabilities::recording(recorder.clone()));
    let runner = Arc::new(ScriptRunner::new(Arc::new(performer)));

    let stopper = {
        let runner = runner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            runner.stop_running_animation_scripts().await
        })
    };
    assert!(run(&runner, "{2}[misty-3,misty-9]LIGHT$$:true;PAUSE:30", true).await);
    assert!(stopper.await.unwrap());

    let urls: Vec<String> = posts(&recorder.calls()).into_iter().map(|(url, _)| url).collect();
    assert_eq!(
        urls,
        vec![
            // Pass 1 ignores the override.
            "http://10.0.0.2:80/api/choreo/command".to_string(),
            "http://10.0.0.3:80/api/choreo/command".to_string(),
            // Pass 2 targets misty-3 only; misty-9 is unknown and skipped.
            // Later passes are past the `{2}` limit.
            "http://10.0.0.3:80/api/choreo/command".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_unreachable_peer_does_not_abort_the_run() {
    let recorder = Arc::new(RecordingCapabilities::new());
    recorder.unreachable("http://10.0.0.2:80/api/choreo/command");
    let config = EngineConfig {
        stop_on_failed_command: true,
        ..troupe_config()
    };
    let performer = Performer::new(config, Capabilities::recording(recorder.clone()));
    let runner = ScriptRunner::new(Arc::new(performer));

    assert!(run(&runner, "LIGHT$$%:true;LED:4,5,6", false).await);
    assert!(
        recorder
            .calls()
            .iter()
            .any(|call| matches!(call, CapabilityCall::Led(_)))
    );
}

#[tokio::test]
async fn test_http_transport_posts_commands_to_peers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/choreo/command"))
        .and(body_json(json!({"command": "LED:10,20,30", "origin": "misty-1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let recorder = Arc::new(RecordingCapabilities::new());
    let mut capabilities = Capabilities::recording(recorder.clone());
    capabilities.transport = Arc::new(HttpPeerTransport::new(Duration::from_secs(2)));
    let config = EngineConfig {
        peers: vec![
            Peer::new("misty-1", "10.0.0.1"),
            Peer::new("misty-2", server.uri()),
        ],
        ..troupe_config()
    };
    let runner = ScriptRunner::new(Arc::new(Performer::new(config, capabilities)));

    assert!(run(&runner, "LED$$:10,20,30", false).await);
    assert!(recorder.calls().is_empty());
    server.verify().await;
}
