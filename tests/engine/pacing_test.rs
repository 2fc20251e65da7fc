//! Scenario tests driving the reconciler and pacer together, the way
//! the engine loop does, without timers.

use claude_chat::engine::{Pacer, TickOutcome, Turn};

/// Drive ticks until completion, returning every published prefix and
/// the completed text.
fn drain(turn: &Turn, pacer: &mut Pacer) -> (Vec<String>, String) {
    let mut prefixes = Vec::new();
    loop {
        match pacer.tick(&turn.best_text(), turn.stream_ended()) {
            TickOutcome::Reveal(prefix) => prefixes.push(prefix),
            TickOutcome::Complete(text) => return (prefixes, text),
            TickOutcome::Idle => panic!("stalled before completion"),
        }
    }
}

#[test]
fn two_fragment_turn_reveals_joined_text() {
    let mut turn = Turn::new("\n\n");
    turn.start();
    turn.apply_delta("msg-1", "First thoughts.");
    turn.apply_delta("msg-2", "Then, after a tool call, more.");
    turn.apply_final(None, false);

    let mut pacer = Pacer::new(4);
    let (prefixes, text) = drain(&turn, &mut pacer);

    assert_eq!(text, "First thoughts.\n\nThen, after a tool call, more.");
    // Every published prefix is a prefix of the final text.
    for prefix in &prefixes {
        assert!(text.starts_with(prefix.as_str()));
    }
    // Cadence: one chunk of 4 chars per tick.
    let expected_ticks = text.chars().count().div_ceil(4);
    assert_eq!(prefixes.len(), expected_ticks);
}

#[test]
fn result_text_supersedes_while_reveal_in_flight() {
    let mut turn = Turn::new("\n\n");
    turn.start();
    turn.apply_delta("msg-1", "streamed draft that will be replaced");

    let mut pacer = Pacer::new(4);
    // Partially reveal the streamed draft.
    for _ in 0..3 {
        assert!(matches!(
            pacer.tick(&turn.best_text(), turn.stream_ended()),
            TickOutcome::Reveal(_)
        ));
    }

    turn.apply_final(Some("authoritative".to_string()), false);
    let (_, text) = drain(&turn, &mut pacer);
    assert_eq!(text, "authoritative");
}

#[test]
fn reveal_outlives_stream_end() {
    // The process exits the moment the result arrives; the pacer keeps
    // its cadence instead of dumping the remainder.
    let mut turn = Turn::new("\n\n");
    turn.start();
    turn.apply_final(Some("0123456789".to_string()), false);
    assert!(turn.stream_ended());

    let mut pacer = Pacer::new(4);
    let (prefixes, text) = drain(&turn, &mut pacer);
    assert_eq!(prefixes, vec!["0123", "01234567", "0123456789"]);
    assert_eq!(text, "0123456789");
}

#[test]
fn abort_path_force_reveals_salvaged_text() {
    let mut turn = Turn::new("\n\n");
    turn.start();
    turn.apply_delta("msg-1", "partial answer");

    let mut pacer = Pacer::new(4);
    assert!(matches!(
        pacer.tick(&turn.best_text(), false),
        TickOutcome::Reveal(_)
    ));

    turn.end_stream();
    assert_eq!(
        pacer.finish_now(&turn.best_text()),
        Some("partial answer".to_string())
    );
    // The latch holds against the racing timer tick.
    assert_eq!(pacer.tick(&turn.best_text(), true), TickOutcome::Idle);
}

#[test]
fn empty_turn_still_completes() {
    let mut turn = Turn::new("\n\n");
    turn.start();
    turn.end_stream();

    let mut pacer = Pacer::new(4);
    assert_eq!(
        pacer.tick(&turn.best_text(), turn.stream_ended()),
        TickOutcome::Complete(String::new())
    );
}
