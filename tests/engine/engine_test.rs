//! Tests driving `ChatEngine` with recorded transport streams.

use claude_chat::cli::{StreamEvent, TransportEvent};
use claude_chat::config::EngineConfig;
use claude_chat::engine::{ChatEngine, EngineNotification};
use claude_chat::store::{JsonFileStore, NullStore, SessionStore};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn fast_config() -> EngineConfig {
    EngineConfig {
        reveal_chunk: 1000,
        reveal_interval_ms: 1,
        ..EngineConfig::default()
    }
}

fn delta(message_id: &str, text: &str) -> TransportEvent {
    TransportEvent::Event(StreamEvent::AssistantDelta {
        message_id: message_id.to_string(),
        text: text.to_string(),
    })
}

async fn collect_until_complete(
    notifications: &mut (impl futures_core::Stream<Item = EngineNotification> + Unpin),
) -> Vec<EngineNotification> {
    let mut seen = Vec::new();
    let deadline = std::time::Duration::from_secs(5);
    tokio::time::timeout(deadline, async {
        while let Some(note) = notifications.next().await {
            let done = matches!(note, EngineNotification::TurnComplete { .. });
            seen.push(note);
            if done {
                break;
            }
        }
    })
    .await
    .expect("turn did not complete in time");
    seen
}

#[tokio::test]
async fn full_turn_emits_session_id_snapshots_and_completion() {
    let (mut engine, mut notifications) = ChatEngine::new(fast_config(), NullStore);
    let (tx, rx) = mpsc::channel(32);
    engine.start_turn(rx, CancellationToken::new());

    tx.send(TransportEvent::Event(StreamEvent::SessionStarted {
        session_id: "sess-9".to_string(),
    }))
    .await
    .unwrap();
    tx.send(delta("msg-1", "First thoughts.")).await.unwrap();
    tx.send(delta("msg-2", "More after a tool call."))
        .await
        .unwrap();
    tx.send(TransportEvent::Event(StreamEvent::FinalResult {
        text: None,
        is_error: false,
    }))
    .await
    .unwrap();
    tx.send(TransportEvent::Closed).await.unwrap();

    let seen = collect_until_complete(&mut notifications).await;

    assert!(seen
        .iter()
        .any(|n| *n == EngineNotification::SessionId("sess-9".to_string())));
    assert_eq!(engine.session_id(), "sess-9");

    let expected = "First thoughts.\n\nMore after a tool call.";
    match seen.last() {
        Some(EngineNotification::TurnComplete { text, is_error }) => {
            assert_eq!(text.as_str(), expected);
            assert!(!*is_error);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    // Every snapshot is a prefix of the final text.
    for note in &seen {
        if let EngineNotification::Snapshot(snapshot) = note {
            assert!(expected.starts_with(snapshot.as_str()));
        }
    }
}

#[tokio::test]
async fn result_text_supersedes_streamed_deltas() {
    let (mut engine, mut notifications) = ChatEngine::new(fast_config(), NullStore);
    let (tx, rx) = mpsc::channel(32);
    engine.start_turn(rx, CancellationToken::new());

    tx.send(delta("msg-1", "draft")).await.unwrap();
    tx.send(TransportEvent::Event(StreamEvent::FinalResult {
        text: Some("authoritative".to_string()),
        is_error: false,
    }))
    .await
    .unwrap();
    tx.send(TransportEvent::Closed).await.unwrap();

    let seen = collect_until_complete(&mut notifications).await;
    assert!(matches!(
        seen.last(),
        Some(EngineNotification::TurnComplete { text, .. }) if text.as_str() == "authoritative"
    ));
}

#[tokio::test]
async fn screen_matches_final_text_when_result_replaces_mid_reveal() {
    use claude_chat::display::{SnapshotPrinter, SnapshotUpdate};

    // Slow reveal so the result lands while the draft is partially shown.
    let config = EngineConfig {
        reveal_chunk: 2,
        reveal_interval_ms: 1,
        ..EngineConfig::default()
    };
    let (mut engine, mut notifications) = ChatEngine::new(config, NullStore);
    let (tx, rx) = mpsc::channel(32);
    engine.start_turn(rx, CancellationToken::new());

    tx.send(delta("msg-1", "streamed draft that will be replaced"))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(15)).await;
    tx.send(TransportEvent::Event(StreamEvent::FinalResult {
        text: Some("authoritative final answer".to_string()),
        is_error: false,
    }))
    .await
    .unwrap();
    tx.send(TransportEvent::Closed).await.unwrap();

    let seen = collect_until_complete(&mut notifications).await;

    // Replay the snapshots the way the binary renders them and check
    // the resulting screen content.
    let mut printer = SnapshotPrinter::new();
    let mut screen = String::new();
    for note in &seen {
        if let EngineNotification::Snapshot(snapshot) = note {
            match printer.advance(snapshot) {
                SnapshotUpdate::Unchanged => {}
                SnapshotUpdate::Extend(suffix) => screen.push_str(&suffix),
                SnapshotUpdate::Restart(text) => screen = text,
            }
        }
    }
    assert_eq!(screen, "authoritative final answer");
}

#[tokio::test]
async fn superseded_turn_emits_no_completion() {
    let (mut engine, mut notifications) = ChatEngine::new(fast_config(), NullStore);

    let (tx1, rx1) = mpsc::channel(32);
    let cancel1 = CancellationToken::new();
    engine.start_turn(rx1, cancel1.clone());
    tx1.send(delta("msg-1", "first answer")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // A newer send supersedes the first turn.
    let (tx2, rx2) = mpsc::channel(32);
    engine.start_turn(rx2, CancellationToken::new());
    assert!(cancel1.is_cancelled(), "superseded process must be killed");

    tx2.send(TransportEvent::Event(StreamEvent::FinalResult {
        text: Some("second answer".to_string()),
        is_error: false,
    }))
    .await
    .unwrap();
    tx2.send(TransportEvent::Closed).await.unwrap();
    // The first turn's stream ending must not produce a completion.
    // Its receiver may already be gone, which is fine.
    let _ = tx1.send(TransportEvent::Closed).await;

    let seen = collect_until_complete(&mut notifications).await;
    let completions: Vec<_> = seen
        .iter()
        .filter_map(|n| match n {
            EngineNotification::TurnComplete { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(completions, vec!["second answer".to_string()]);
}

#[tokio::test]
async fn diagnostic_ends_stream_and_salvages_text() {
    let (mut engine, mut notifications) = ChatEngine::new(fast_config(), NullStore);
    let (tx, rx) = mpsc::channel(32);
    engine.start_turn(rx, CancellationToken::new());

    tx.send(delta("msg-1", "partial answer")).await.unwrap();
    tx.send(TransportEvent::Diagnostic("spawn blew up".to_string()))
        .await
        .unwrap();

    let seen = collect_until_complete(&mut notifications).await;
    assert!(seen
        .iter()
        .any(|n| *n == EngineNotification::Diagnostic("spawn blew up".to_string())));
    assert!(matches!(
        seen.last(),
        Some(EngineNotification::TurnComplete { text, .. }) if text.as_str() == "partial answer"
    ));
}

#[tokio::test]
async fn error_result_flag_propagates() {
    let (mut engine, mut notifications) = ChatEngine::new(fast_config(), NullStore);
    let (tx, rx) = mpsc::channel(32);
    engine.start_turn(rx, CancellationToken::new());

    tx.send(TransportEvent::Event(StreamEvent::FinalResult {
        text: Some("Credit balance too low".to_string()),
        is_error: true,
    }))
    .await
    .unwrap();
    tx.send(TransportEvent::Closed).await.unwrap();

    let seen = collect_until_complete(&mut notifications).await;
    assert!(matches!(
        seen.last(),
        Some(EngineNotification::TurnComplete { is_error: true, .. })
    ));
}

#[tokio::test]
async fn session_id_rewrite_reaches_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sessions.json");

    let store = JsonFileStore::new(&path);
    let (mut engine, mut notifications) = ChatEngine::new(fast_config(), store);

    // The user message lands under the provisional id first.
    let provisional = engine.session_id();
    JsonFileStore::new(&path)
        .persist_user_message(&provisional, "hello", None)
        .await
        .unwrap();

    let (tx, rx) = mpsc::channel(32);
    engine.start_turn(rx, CancellationToken::new());
    tx.send(TransportEvent::Event(StreamEvent::SessionStarted {
        session_id: "sess-real".to_string(),
    }))
    .await
    .unwrap();
    tx.send(TransportEvent::Event(StreamEvent::FinalResult {
        text: Some("hi".to_string()),
        is_error: false,
    }))
    .await
    .unwrap();
    tx.send(TransportEvent::Closed).await.unwrap();
    collect_until_complete(&mut notifications).await;

    // Persistence is fire-and-forget; poll briefly for the rewrite.
    let reader = JsonFileStore::new(&path);
    let mut renamed = None;
    for _ in 0..50 {
        if let Some(session) = reader.get("sess-real").await.unwrap() {
            renamed = Some(session);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    let session = renamed.expect("session id was not rewritten");
    assert_eq!(session.messages[0].content, "hello");
}

#[tokio::test]
async fn resumed_engine_reports_real_session_id() {
    let (engine, _notifications) = ChatEngine::new(fast_config(), NullStore);
    let engine = engine.with_session("sess-old");
    assert_eq!(engine.session_id(), "sess-old");
}
