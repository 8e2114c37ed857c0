// ABOUTME: Tests for the client loop running against the mock transport.
// ABOUTME: Covers the full login handshake, queued commands, recovery paths, and loop exit conditions.

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tdlink_core::report::CollectingReporter;
use tdlink_core::transport::backends::mock::MockTransport;
use tdlink_core::transport::testing::{Direction, RecordingTransport};
use tdlink_core::transport::Transport;
use tdlink_core::{AuthorizationState, Client, Command, Event, EventKind, TdlibParameters};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

fn state(name: &str) -> Value {
    json!({
        "@type": "updateAuthorizationState",
        "authorization_state": {"@type": name}
    })
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

fn spawn_loop(
    client: &Arc<Client>,
    token: &CancellationToken,
) -> tokio::task::JoinHandle<anyhow::Result<()>> {
    let client = Arc::clone(client);
    let token = token.clone();
    tokio::spawn(async move { client.run(token).await })
}

#[tokio::test]
async fn test_full_login_handshake() {
    let mock = MockTransport::new()
        // The backend answers getAuthorizationState with a bare state object
        .on_send("getAuthorizationState")
        .respond_with(vec![json!({"@type": "authorizationStateWaitTdlibParameters"})])
        .on_send("setTdlibParameters")
        .respond_with(vec![state("authorizationStateWaitPhoneNumber")])
        .on_send("setAuthenticationPhoneNumber")
        .respond_with(vec![state("authorizationStateWaitCode")])
        .on_send("checkAuthenticationCode")
        .respond_with(vec![state("authorizationStateReady")])
        .on_send("loadChats")
        .respond_with(vec![
            json!({"@type": "updateNewChat", "chat": {"id": 42, "title": "General"}}),
            json!({"@type": "ok"}),
        ]);
    let control = mock.control();

    let (prompt_tx, mut prompt_rx) = mpsc::unbounded_channel();
    let client = Arc::new(
        Client::builder(Arc::new(mock))
            .parameters(TdlibParameters {
                api_id: 1,
                api_hash: "hash".to_string(),
                ..Default::default()
            })
            .prompt_handler(Arc::new(move |state: AuthorizationState| {
                let _ = prompt_tx.send(state);
            }))
            .poll_timeout(Duration::from_millis(20))
            .verbosity(2)
            .build(),
    );

    let chats = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&chats);
    client.subscribe_all(EventKind::UpdateNewChat, move |_: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let token = CancellationToken::new();
    let runner = spawn_loop(&client, &token);

    let asked = timeout(Duration::from_secs(2), prompt_rx.recv()).await.unwrap();
    assert_eq!(asked, Some(AuthorizationState::WaitPhoneNumber));
    assert!(client.submit_credentials("+15550100", "").await.unwrap());

    let asked = timeout(Duration::from_secs(2), prompt_rx.recv()).await.unwrap();
    assert_eq!(asked, Some(AuthorizationState::WaitCode));
    assert!(client.submit_credentials("12345", "").await.unwrap());

    wait_for(|| chats.load(Ordering::SeqCst) == 1).await;
    assert!(client.is_authorized());
    assert_eq!(client.authorization_state(), AuthorizationState::Ready);

    token.cancel();
    runner.await.unwrap().unwrap();

    assert_eq!(
        control.sent_types(),
        vec![
            "setLogVerbosityLevel",
            "getAuthorizationState",
            "setTdlibParameters",
            "setAuthenticationPhoneNumber",
            "checkAuthenticationCode",
            "loadChats",
        ]
    );
    let sent = control.sent();
    assert_eq!(sent[0]["new_verbosity_level"], 2);
    assert_eq!(sent[2]["api_id"], 1);
    assert_eq!(sent[3]["phone_number"], "+15550100");
    assert_eq!(sent[5]["chat_list"]["@type"], "chatListMain");
    assert!(control.is_closed());
}

#[tokio::test]
async fn test_authorization_events_also_reach_subscribers() {
    let client = Client::builder(Arc::new(MockTransport::new())).build();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    client.subscribe_all(EventKind::UpdateAuthorizationState, move |_: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    client
        .handle_payload(state("authorizationStateWaitCode"))
        .await
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    assert_eq!(client.authorization_state(), AuthorizationState::WaitCode);
}

#[tokio::test]
async fn test_undecodable_payloads_are_dropped() {
    let client = Client::builder(Arc::new(MockTransport::new())).build();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    client.subscribe_global(move |_: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert!(client.handle_payload(json!([1, 2, 3])).await.unwrap().is_none());
    assert!(client.handle_payload(json!({"no_type": true})).await.unwrap().is_none());
    assert!(client
        .handle_payload(json!({"@type": "updateFromTheFuture"}))
        .await
        .unwrap()
        .is_none());
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(client.authorization_state(), AuthorizationState::Uninitialized);

    let outcome = client
        .handle_payload(json!({"@type": "message", "chat_id": 1}))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.delivered, 1);
}

#[tokio::test]
async fn test_unknown_state_is_reported_and_loop_survives() {
    let mock = MockTransport::new()
        .with_inbound(state("authorizationStateFromTheFuture"))
        .with_inbound(json!({"@type": "message", "chat_id": 3}));
    let reporter = Arc::new(CollectingReporter::new());
    let client = Arc::new(
        Client::builder(Arc::new(mock))
            .reporter(reporter.clone())
            .poll_timeout(Duration::from_millis(20))
            .build(),
    );
    let messages = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&messages);
    client
        .subscribe_keyed(
            EventKind::Message,
            move |_: &Event| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            [("chat_id", 3)],
        )
        .unwrap();

    let token = CancellationToken::new();
    let runner = spawn_loop(&client, &token);
    wait_for(|| messages.load(Ordering::SeqCst) == 1).await;
    token.cancel();
    runner.await.unwrap().unwrap();

    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].context, "authorization");
    assert!(reports[0].message.contains("authorizationStateFromTheFuture"));
}

#[tokio::test]
async fn test_failed_handshake_keeps_last_state_and_records_failure() {
    let client = Client::builder(Arc::new(MockTransport::new())).build();
    client
        .handle_payload(state("authorizationStateWaitCode"))
        .await
        .unwrap();
    assert!(client.authorization_failure().is_none());

    client
        .handle_payload(state("authorizationStateFromTheFuture"))
        .await
        .unwrap();
    assert_eq!(client.authorization_state(), AuthorizationState::WaitCode);
    let failure = client.authorization_failure().expect("failure should be recorded");
    assert!(failure.to_string().contains("authorizationStateFromTheFuture"));

    // Later updates are ignored once the handshake has failed
    client
        .handle_payload(state("authorizationStateReady"))
        .await
        .unwrap();
    assert_eq!(client.authorization_state(), AuthorizationState::WaitCode);
    assert!(!client.is_authorized());
}

#[tokio::test]
async fn test_event_is_dispatched_when_follow_up_send_fails() {
    let mock = Arc::new(MockTransport::new());
    let client = Client::builder(mock.clone()).build();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    client.subscribe_all(EventKind::UpdateAuthorizationState, move |_: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    mock.shutdown().await.unwrap();
    let err = client
        .handle_payload(state("authorizationStateWaitTdlibParameters"))
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("setTdlibParameters"));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_loop_stops_when_closed() {
    let mock = MockTransport::new()
        .on_send("getAuthorizationState")
        .respond_with(vec![
            state("authorizationStateClosing"),
            state("authorizationStateClosed"),
        ]);
    let client = Client::builder(Arc::new(mock))
        .poll_timeout(Duration::from_millis(20))
        .build();

    timeout(Duration::from_secs(2), client.run(CancellationToken::new()))
        .await
        .expect("loop should stop on Closed")
        .unwrap();
    assert_eq!(client.authorization_state(), AuthorizationState::Closed);
}

#[tokio::test]
async fn test_transport_failure_ends_loop_with_error() {
    let mock = Arc::new(MockTransport::new());
    let client = Arc::new(
        Client::builder(mock.clone())
            .poll_timeout(Duration::from_millis(20))
            .build(),
    );
    let token = CancellationToken::new();
    let runner = spawn_loop(&client, &token);

    tokio::time::sleep(Duration::from_millis(30)).await;
    mock.shutdown().await.unwrap();

    let result = timeout(Duration::from_secs(2), runner).await.unwrap().unwrap();
    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("Mock transport closed"));
}

#[tokio::test]
async fn test_commands_queued_from_callbacks_are_sent() {
    let mock = MockTransport::new().with_inbound(json!({
        "@type": "updateNewMessage",
        "message": {"id": 77, "chat_id": 9}
    }));
    let control = mock.control();
    let client = Arc::new(
        Client::builder(Arc::new(mock))
            .poll_timeout(Duration::from_millis(20))
            .build(),
    );

    let sender = client.command_sender();
    client
        .subscribe_keyed(
            EventKind::UpdateNewMessage,
            move |event: &Event| {
                let message_id = event
                    .field("message.id")
                    .and_then(|v| v.as_i64())
                    .unwrap_or_default();
                sender.send(Command::ViewMessages {
                    chat_id: 9,
                    message_ids: vec![message_id],
                    force_read: true,
                })?;
                sender.send_raw(json!({"@type": "getChat", "chat_id": 9}))
            },
            [("message.chat_id", 9)],
        )
        .unwrap();

    let token = CancellationToken::new();
    let runner = spawn_loop(&client, &token);
    wait_for(|| control.sent_types().len() == 3).await;
    token.cancel();
    runner.await.unwrap().unwrap();

    assert_eq!(
        control.sent_types(),
        vec!["getAuthorizationState", "viewMessages", "getChat"]
    );
    assert_eq!(control.sent()[1]["message_ids"], json!([77]));
}

#[tokio::test]
async fn test_send_raw_requires_type() {
    let client = Client::builder(Arc::new(MockTransport::new())).build();
    assert!(client.send_raw(json!({"chat_id": 1})).await.is_err());
    assert!(client.command_sender().send_raw(json!("getMe")).is_err());
    client.send_raw(json!({"@type": "getMe"})).await.unwrap();
}

#[tokio::test]
async fn test_second_loop_is_rejected() {
    let client = Arc::new(
        Client::builder(Arc::new(MockTransport::new()))
            .poll_timeout(Duration::from_millis(20))
            .build(),
    );
    let token = CancellationToken::new();
    let runner = spawn_loop(&client, &token);
    tokio::time::sleep(Duration::from_millis(30)).await;

    let err = client.run(token.clone()).await.unwrap_err();
    assert!(err.to_string().contains("already running"));

    token.cancel();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_submit_credentials_without_prompt_state() {
    let mock = MockTransport::new();
    let control = mock.control();
    let client = Client::builder(Arc::new(mock)).build();

    assert!(!client.submit_credentials("+15550100", "").await.unwrap());
    assert!(control.sent().is_empty());

    client
        .handle_payload(state("authorizationStateWaitPassword"))
        .await
        .unwrap();
    assert!(client.submit_credentials("", "").await.is_err());
    assert!(client.submit_credentials("secret", "").await.unwrap());
    assert_eq!(control.sent_types(), vec!["checkAuthenticationPassword"]);
}

#[tokio::test]
async fn test_recording_transport_captures_handshake() {
    let mock = MockTransport::new()
        .on_send("getAuthorizationState")
        .respond_with(vec![state("authorizationStateClosed")]);
    let recording = Arc::new(RecordingTransport::wrap(Arc::new(mock)));
    let client = Client::builder(recording.clone())
        .poll_timeout(Duration::from_millis(20))
        .build();

    timeout(Duration::from_secs(2), client.run(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();

    let transcript = recording.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].direction, Direction::Outbound);
    assert_eq!(transcript[0].payload["@type"], "getAuthorizationState");
    assert_eq!(transcript[1].direction, Direction::Inbound);
}
