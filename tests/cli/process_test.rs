//! Tests for Claude process spawning and turn transport.

use claude_chat::cli::{spawn_turn, ClaudeCommandBuilder, SpawnError, TransportEvent};
use tokio_test::assert_ok;
use tokio_util::sync::CancellationToken;

#[test]
fn builder_default_args() {
    let builder = ClaudeCommandBuilder::new("claude");
    let args = builder.build_args();

    assert!(args.contains(&"-p".to_string()));
    assert!(args.contains(&"--output-format".to_string()));
    assert!(args.contains(&"stream-json".to_string()));
    assert!(args.contains(&"--verbose".to_string()));
}

#[test]
fn builder_prompt_not_in_args() {
    // The prompt travels over stdin, never the command line.
    let args = ClaudeCommandBuilder::new("claude").build_args();
    assert!(!args.iter().any(|a| a.contains("hello")));
}

#[test]
fn builder_resume_session() {
    let builder = ClaudeCommandBuilder::new("claude").resume("session_abc123");
    let args = builder.build_args();

    assert!(args.contains(&"--resume".to_string()));
    assert!(args.contains(&"session_abc123".to_string()));
}

#[test]
fn builder_is_clone() {
    let builder = ClaudeCommandBuilder::new("claude").resume("s-1");
    let cloned = builder.clone();

    assert_eq!(builder.build_args(), cloned.build_args());
}

#[tokio::test]
async fn spawn_nonexistent_binary_is_not_found() {
    let builder = ClaudeCommandBuilder::new("/nonexistent/claude-binary");
    let result = spawn_turn(
        &builder,
        "hello".to_string(),
        CancellationToken::new(),
        16,
    );
    assert!(matches!(result, Err(SpawnError::NotFound)));
}

#[tokio::test]
async fn clean_exit_delivers_closed_exactly_once() {
    // `true` ignores its args and stdin and exits 0 immediately.
    let builder = ClaudeCommandBuilder::new("true");
    let mut rx = assert_ok!(spawn_turn(
        &builder,
        "ignored".to_string(),
        CancellationToken::new(),
        16,
    ));

    let mut closed = 0;
    while let Some(event) = rx.recv().await {
        if event == TransportEvent::Closed {
            closed += 1;
        }
    }
    assert_eq!(closed, 1);
}

#[tokio::test]
async fn failing_exit_reports_diagnostic_before_closed() {
    let builder = ClaudeCommandBuilder::new("false");
    let mut rx = spawn_turn(
        &builder,
        "ignored".to_string(),
        CancellationToken::new(),
        16,
    )
    .unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert_eq!(events.last(), Some(&TransportEvent::Closed));
    assert!(events
        .iter()
        .any(|e| matches!(e, TransportEvent::Diagnostic(text) if text.contains("exited"))));
}

#[cfg(unix)]
#[tokio::test]
async fn cancellation_terminates_long_running_process() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("slow.sh");
    std::fs::write(&script, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let cancel = CancellationToken::new();
    let builder = ClaudeCommandBuilder::new(&script);
    let mut rx = spawn_turn(&builder, "ignored".to_string(), cancel.clone(), 16).unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    cancel.cancel();

    let deadline = std::time::Duration::from_secs(5);
    let got_closed = tokio::time::timeout(deadline, async {
        while let Some(event) = rx.recv().await {
            if event == TransportEvent::Closed {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();

    assert!(got_closed, "cancelled process must still deliver Closed");
}

#[cfg(unix)]
#[tokio::test]
async fn payload_echoed_through_transport() {
    use std::os::unix::fs::PermissionsExt;

    // A stub that ignores the claude args and copies stdin to stdout,
    // so a stream-json payload comes back through the framer and
    // classifier intact.
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("echo.sh");
    std::fs::write(&script, "#!/bin/sh\nexec cat\n").unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let builder = ClaudeCommandBuilder::new(&script);
    let payload = r#"{"type":"result","result":"round trip","is_error":false}"#.to_string();
    let mut rx = spawn_turn(&builder, payload, CancellationToken::new(), 16).unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    use claude_chat::cli::StreamEvent;
    assert!(events.contains(&TransportEvent::Event(StreamEvent::FinalResult {
        text: Some("round trip".to_string()),
        is_error: false,
    })));
    assert_eq!(events.last(), Some(&TransportEvent::Closed));
}
