// ABOUTME: Tests for the console client wiring and terminal login flow.
// ABOUTME: Drives the authenticator with scripted input against a mock-backed client.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tdlink::app;
use tdlink::prompt::{ConsoleAuthenticator, ConsolePrompt};
use tdlink_core::transport::backends::mock::MockTransport;
use tdlink_core::{AuthorizationState, Client, Config};
use tokio_util::sync::CancellationToken;

fn state(name: &str) -> serde_json::Value {
    json!({
        "@type": "updateAuthorizationState",
        "authorization_state": {"@type": name}
    })
}

fn config() -> Config {
    Config::parse(
        r#"
[telegram]
api_id = 12345
api_hash = "0123456789abcdef"
phone = "+15550100"
database_encryption_key = "hunter2"

[transport]
type = "mock"
"#,
    )
    .unwrap()
}

#[test]
fn test_redacted_config_hides_secrets() {
    let rendered = app::redacted_config(&config()).unwrap();
    assert!(rendered.contains("api_id = 12345"));
    assert!(!rendered.contains("0123456789abcdef"));
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("+15550100"));
    assert!(rendered.contains("[REDACTED]"));
}

#[test]
fn test_describe_paths_uses_configured_dirs() {
    let mut config = config();
    config.telegram.database_dir = Some("/srv/tdlink/db".to_string());
    config.logging.log_dir = Some("/srv/tdlink/logs".to_string());
    let text = app::describe_paths(Some(&config));
    assert!(text.contains("/srv/tdlink/db"));
    assert!(text.contains("/srv/tdlink/logs"));
    assert!(text.contains("config.toml"));
}

#[tokio::test]
async fn test_build_client_from_mock_config() {
    let client = app::build_client(&config()).unwrap();
    app::attach_event_log(&client);
    assert_eq!(client.registry().subscriber_count(), 4);
    assert_eq!(client.authorization_state(), AuthorizationState::Uninitialized);
}

#[tokio::test]
async fn test_unknown_transport_lists_available() {
    let mut config = config();
    config.transport.transport_type = "carrier-pigeon".to_string();
    let err = app::build_client(&config).err().unwrap();
    let text = format!("{:#}", err);
    assert!(text.contains("carrier-pigeon"));
    assert!(text.contains("mock"));
}

#[tokio::test]
async fn test_console_login_with_registration() {
    let mock = MockTransport::new()
        .on_send("setAuthenticationPhoneNumber")
        .respond_with(vec![state("authorizationStateWaitCode")])
        .on_send("checkAuthenticationCode")
        .respond_with(vec![state("authorizationStateWaitRegistration")])
        .on_send("registerUser")
        .respond_with(vec![state("authorizationStateReady")]);
    let control = mock.control();
    let client = Arc::new(
        Client::builder(Arc::new(mock))
            .poll_timeout(Duration::from_millis(20))
            .build(),
    );

    let (prompt, requests) = ConsolePrompt::channel();
    client.set_prompt_handler(Arc::new(prompt));

    let input: &[u8] = b"24680\n  Ann \nLee\n";
    let mut output = Vec::new();
    let token = CancellationToken::new();

    let runner = {
        let client = Arc::clone(&client);
        let token = token.clone();
        tokio::spawn(async move { client.run(token).await })
    };
    control.push(state("authorizationStateWaitPhoneNumber"));

    let authenticator = ConsoleAuthenticator::new(Arc::clone(&client), requests, input, &mut output)
        .with_phone(Some("+15550100".to_string()));
    let login = authenticator.run(token.clone());
    let wait_ready = async {
        while !client.is_authorized() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();
    };
    let (login_result, _) = tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(login, wait_ready)
    })
    .await
    .expect("login did not finish");
    login_result.unwrap();
    runner.await.unwrap().unwrap();

    let sent = control.sent();
    let types: Vec<&str> = sent
        .iter()
        .map(|p| p["@type"].as_str().unwrap_or_default())
        .collect();
    assert_eq!(
        types,
        vec![
            "getAuthorizationState",
            "setAuthenticationPhoneNumber",
            "checkAuthenticationCode",
            "registerUser",
            "loadChats",
        ]
    );
    assert_eq!(sent[1]["phone_number"], "+15550100");
    assert_eq!(sent[2]["code"], "24680");
    assert_eq!(sent[3]["first_name"], "Ann");
    assert_eq!(sent[3]["last_name"], "Lee");

    let shown = String::from_utf8(output).unwrap();
    assert!(shown.contains("Login code: "));
    assert!(shown.contains("First name: "));
    assert!(shown.contains("Last name: "));
    assert!(!shown.contains("Phone number"));
}

/// Run a console login against `mock` with `input` until the client is authorized.
/// Returns the sent payloads and everything written to the console.
async fn login_with(mock: MockTransport, first_state: &str, input: &'static [u8]) -> (Vec<serde_json::Value>, String) {
    let control = mock.control();
    let client = Arc::new(
        Client::builder(Arc::new(mock))
            .poll_timeout(Duration::from_millis(20))
            .build(),
    );
    let (prompt, requests) = ConsolePrompt::channel();
    prompt.watch_rejections(&client);
    client.set_prompt_handler(Arc::new(prompt));

    let token = CancellationToken::new();
    let runner = {
        let client = Arc::clone(&client);
        let token = token.clone();
        tokio::spawn(async move { client.run(token).await })
    };
    control.push(state(first_state));

    let mut output = Vec::new();
    let authenticator = ConsoleAuthenticator::new(Arc::clone(&client), requests, input, &mut output);
    let login = authenticator.run(token.clone());
    let wait_ready = async {
        while !client.is_authorized() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        token.cancel();
    };
    let (login_result, _) = tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(login, wait_ready)
    })
    .await
    .expect("login did not finish");
    login_result.unwrap();
    runner.await.unwrap().unwrap();

    (control.sent(), String::from_utf8(output).unwrap())
}

#[tokio::test]
async fn test_empty_answer_is_asked_again() {
    let mock = MockTransport::new()
        .on_send("checkAuthenticationCode")
        .respond_with(vec![state("authorizationStateReady")]);

    let (sent, shown) = login_with(mock, "authorizationStateWaitCode", b"\n24680\n").await;

    let codes: Vec<&serde_json::Value> = sent
        .iter()
        .filter(|p| p["@type"] == "checkAuthenticationCode")
        .collect();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0]["code"], "24680");
    assert_eq!(shown.matches("Login code: ").count(), 2);
}

#[tokio::test]
async fn test_refused_code_is_asked_again() {
    let mock = MockTransport::new()
        .on_send("checkAuthenticationCode")
        .respond_with(vec![json!({
            "@type": "error",
            "code": 400,
            "message": "PHONE_CODE_INVALID"
        })])
        .on_send("checkAuthenticationCode")
        .respond_with(vec![state("authorizationStateReady")]);

    let (sent, shown) = login_with(mock, "authorizationStateWaitCode", b"11111\n24680\n").await;

    let codes: Vec<&str> = sent
        .iter()
        .filter(|p| p["@type"] == "checkAuthenticationCode")
        .filter_map(|p| p["code"].as_str())
        .collect();
    assert_eq!(codes, vec!["11111", "24680"]);
    assert!(shown.contains("PHONE_CODE_INVALID"));
    assert_eq!(shown.matches("Login code: ").count(), 2);
}

#[tokio::test]
async fn test_console_stops_when_input_closes() {
    let client = Arc::new(Client::builder(Arc::new(MockTransport::new())).build());
    let (prompt, requests) = ConsolePrompt::channel();
    client.set_prompt_handler(Arc::new(prompt));

    client
        .handle_payload(state("authorizationStateWaitPassword"))
        .await
        .unwrap();

    let input: &[u8] = b"";
    let authenticator = ConsoleAuthenticator::new(Arc::clone(&client), requests, input, tokio::io::sink());
    tokio::time::timeout(Duration::from_secs(1), authenticator.run(CancellationToken::new()))
        .await
        .expect("authenticator should stop on closed input")
        .unwrap();
}
