// ABOUTME: Tests for recording and replaying transport traffic.
// ABOUTME: Verifies both directions are captured and transcripts survive a file round trip.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tdlink_transport::backends::mock::MockTransport;
use tdlink_transport::testing::{Direction, RecordingTransport, ReplayTransport};
use tdlink_transport::Transport;

#[tokio::test]
async fn test_recording_captures_both_directions() {
    let mock = MockTransport::new()
        .on_send("getMe")
        .respond_with(vec![json!({"@type": "user", "id": 7})]);
    let recorder = RecordingTransport::wrap(Arc::new(mock));

    recorder.send(json!({"@type": "getMe"})).await.unwrap();
    let got = recorder.receive(Duration::from_millis(10)).await.unwrap();
    assert_eq!(got.unwrap()["id"], 7);

    let transcript = recorder.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].direction, Direction::Outbound);
    assert_eq!(transcript[1].direction, Direction::Inbound);
}

#[tokio::test]
async fn test_empty_receive_is_not_recorded() {
    let recorder = RecordingTransport::wrap(Arc::new(MockTransport::new()));
    let got = recorder.receive(Duration::from_millis(5)).await.unwrap();
    assert!(got.is_none());
    assert!(recorder.transcript().is_empty());
}

#[tokio::test]
async fn test_replay_from_saved_transcript() {
    let mock = MockTransport::new()
        .with_inbound(json!({"@type": "updateOption", "name": "version"}))
        .with_inbound(json!({"@type": "updateConnectionState"}));
    let recorder = RecordingTransport::wrap(Arc::new(mock));
    recorder.send(json!({"@type": "getOption"})).await.unwrap();
    recorder.receive(Duration::from_millis(10)).await.unwrap();
    recorder.receive(Duration::from_millis(10)).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("transcript.json");
    recorder.save_transcript(&path).await.unwrap();

    let replay = ReplayTransport::load(&path).await.unwrap();
    assert_eq!(replay.remaining(), 2);

    let first = replay.receive(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(first["@type"], "updateOption");
    let second = replay.receive(Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(second["@type"], "updateConnectionState");
    assert!(replay.receive(Duration::ZERO).await.is_err());

    replay.send(json!({"@type": "close"})).await.unwrap();
    assert_eq!(replay.sent().len(), 1);
}
