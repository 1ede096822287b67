//! Response dispatch integration tests
//!
//! The fast path talks to a local mock server; the agent is a shell script

use std::io::Write;
use std::time::Duration;

use mockito::Matcher;
use secrecy::SecretString;
use serde_json::json;
use voicewake::config::{AgentConfig, FastConfig};
use voicewake::dispatch::{AgentBackend, GeminiBackend};
use voicewake::memory::{MemoryStore, UserProfile};
use voicewake::{ReplySource, ResponseBackend, ResponseDispatcher};

const GENERATE_PATH: &str = "/models/gemini-2.0-flash:generateContent";

fn fast_config(endpoint: &str) -> FastConfig {
    FastConfig {
        enabled: true,
        endpoint: endpoint.to_string(),
        model: "gemini-2.0-flash".to_string(),
        timeout: Duration::from_secs(5),
        max_output_tokens: 150,
        temperature: 0.7,
        top_p: 0.9,
    }
}

/// Agent that runs `sh -c script`; the message lands in `$1`
fn shell_agent(script: &str, timeout: Duration) -> AgentBackend {
    AgentBackend::new(&AgentConfig {
        program: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        dir: None,
        to: None,
        timeout,
    })
}

fn gemini(server: &mockito::ServerGuard) -> GeminiBackend {
    tokio_test::assert_ok!(GeminiBackend::new(
        SecretString::from("test-key".to_string()),
        &fast_config(&server.url()),
        "Friday",
    ))
}

fn gemini_reply(text: &str) -> String {
    json!({
        "candidates": [{ "content": { "parts": [{ "text": text }], "role": "model" } }]
    })
    .to_string()
}

#[tokio::test]
async fn test_fast_path_answers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATE_PATH)
        .match_header("x-goog-api-key", "test-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(gemini_reply("It's 3:15 PM. [[reply_to_current]]"))
        .create_async()
        .await;

    let backends: Vec<Box<dyn ResponseBackend>> = vec![
        Box::new(gemini(&server)),
        Box::new(shell_agent("echo agent", Duration::from_secs(5))),
    ];
    let mut dispatcher = ResponseDispatcher::new(backends);

    let result = dispatcher.dispatch("what time is it").await;

    mock.assert_async().await;
    assert!(result.ok);
    assert_eq!(result.source, Some(ReplySource::Fast));
    assert_eq!(result.text, "It's 3:15 PM.");

    let turn = &dispatcher.history()[0];
    assert_eq!(turn.command, "what time is it");
    assert_eq!(turn.response.as_deref(), Some("It's 3:15 PM."));
    assert!(!turn.action_taken);
}

#[cfg(unix)]
#[tokio::test]
async fn test_fast_path_error_falls_back_to_agent() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATE_PATH)
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let backends: Vec<Box<dyn ResponseBackend>> = vec![
        Box::new(gemini(&server)),
        Box::new(shell_agent(
            r#"printf '> node agent.js\n\n◇  Agent ──╮\nTurning on: %s\n└  done\n' "$1""#,
            Duration::from_secs(5),
        )),
    ];
    let mut dispatcher = ResponseDispatcher::new(backends);

    let result = dispatcher.dispatch("the lights").await;

    mock.assert_async().await;
    assert!(result.ok);
    assert_eq!(result.source, Some(ReplySource::Fallback));
    assert_eq!(result.text, "Turning on: the lights");
    assert!(dispatcher.history()[0].action_taken);
}

#[cfg(unix)]
#[tokio::test]
async fn test_fast_path_timeout_falls_back_to_agent() {
    let mut server = mockito::Server::new_async().await;
    let _slow = server
        .mock("POST", GENERATE_PATH)
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(Duration::from_secs(2));
            w.write_all(gemini_reply("Too late.").as_bytes())
        })
        .create_async()
        .await;

    let fast = FastConfig {
        timeout: Duration::from_millis(200),
        ..fast_config(&server.url())
    };
    let backends: Vec<Box<dyn ResponseBackend>> = vec![
        Box::new(tokio_test::assert_ok!(GeminiBackend::new(
            SecretString::from("test-key".to_string()),
            &fast,
            "Friday",
        ))),
        Box::new(shell_agent(r#"echo "Agent: $1""#, Duration::from_secs(5))),
    ];
    let mut dispatcher = ResponseDispatcher::new(backends);

    let result = dispatcher.dispatch("are you there").await;

    assert!(result.ok);
    assert_eq!(result.source, Some(ReplySource::Fallback));
    assert_eq!(result.text, "Agent: are you there");
}

#[tokio::test]
async fn test_previous_turn_is_sent_as_context() {
    let mut server = mockito::Server::new_async().await;
    let mut dispatcher = ResponseDispatcher::new(vec![Box::new(gemini(&server))]);

    let first = server
        .mock("POST", GENERATE_PATH)
        .with_status(200)
        .with_body(gemini_reply("Frank Herbert."))
        .create_async()
        .await;
    assert_eq!(dispatcher.dispatch("who wrote dune").await.text, "Frank Herbert.");
    first.assert_async().await;
    first.remove_async().await;

    let second = server
        .mock("POST", GENERATE_PATH)
        .match_body(Matcher::PartialJson(json!({
            "contents": [
                { "role": "user", "parts": [{ "text": "who wrote dune" }] },
                { "role": "model", "parts": [{ "text": "Frank Herbert." }] },
                { "role": "user", "parts": [{ "text": "when was he born" }] }
            ]
        })))
        .with_status(200)
        .with_body(gemini_reply("In 1920."))
        .create_async()
        .await;
    assert_eq!(dispatcher.dispatch("when was he born").await.text, "In 1920.");
    second.assert_async().await;
}

#[tokio::test]
async fn test_memory_reaches_system_instruction() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = MemoryStore::load(dir.path().join("memory.json"));
    store.set_profile(UserProfile::new(Some("Ada".to_string()), None));
    store.remember("likes jazz");
    let memory = store.shared();

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", GENERATE_PATH)
        .match_body(Matcher::Regex("User's name: Ada.*likes jazz".to_string()))
        .with_status(200)
        .with_body(gemini_reply("Playing some jazz."))
        .create_async()
        .await;

    let mut dispatcher =
        ResponseDispatcher::new(vec![Box::new(gemini(&server))]).with_memory(memory.clone());
    let result = dispatcher.dispatch("play something").await;

    mock.assert_async().await;
    assert!(result.ok);
    assert!(memory.read().unwrap().last_interaction().is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn test_agent_timeout_fails_dispatch() {
    let mut dispatcher = ResponseDispatcher::new(vec![Box::new(shell_agent(
        "sleep 5",
        Duration::from_millis(200),
    ))]);

    let result = dispatcher.dispatch("take your time").await;

    assert!(!result.ok);
    assert_eq!(result.source, None);
    assert!(dispatcher.history()[0].response.is_none());
}

#[cfg(unix)]
#[tokio::test]
async fn test_agent_nonzero_exit_fails_dispatch() {
    let mut dispatcher = ResponseDispatcher::new(vec![Box::new(shell_agent(
        "echo 'partial answer'; exit 3",
        Duration::from_secs(5),
    ))]);

    let result = dispatcher.dispatch("break").await;

    assert!(!result.ok);
}

#[cfg(unix)]
#[tokio::test]
async fn test_agent_only_when_no_fast_path() {
    let agent = shell_agent(r#"echo "You said $1""#, Duration::from_secs(5));
    assert_eq!(
        agent.command_args("hi"),
        vec!["-c", r#"echo "You said $1""#, "--message", "hi"]
    );

    let mut dispatcher = ResponseDispatcher::new(vec![Box::new(agent)]);
    let result = dispatcher.dispatch("hello there").await;

    assert!(result.ok);
    assert_eq!(result.source, Some(ReplySource::Fallback));
    assert_eq!(result.text, "You said hello there");
}
