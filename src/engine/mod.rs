//! Chat engine orchestration.
//!
//! Connects the process transport, turn reconciler, and presentation
//! pacer for one conversation endpoint. Each `send` owns at most one
//! live Claude process; a newer send silently discards the turn in
//! flight, while an explicit abort salvages the partial text. The turn
//! finishes when two independent signals join: all text revealed, and
//! the stream ended.

mod reveal;
mod turn;

pub use reveal::{Pacer, TickOutcome};
pub use turn::{Turn, TurnPhase};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::cli::{spawn_turn, ClaudeCommandBuilder, SpawnError, StreamEvent, TransportEvent};
use crate::config::EngineConfig;
use crate::session::SessionHandle;
use crate::store::SessionStore;

/// Notification delivered upward to the UI/persistence collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineNotification {
    /// Reconciled-text snapshot, one per reveal tick.
    Snapshot(String),
    /// The server-issued session id replaced the previous effective id.
    SessionId(String),
    /// Raw diagnostic text from stderr or the transport.
    Diagnostic(String),
    /// The turn finished. Exactly one per turn.
    TurnComplete {
        /// Final committed text, partial text included on abort.
        text: String,
        /// Whether the CLI flagged the result as an error.
        is_error: bool,
    },
}

/// Cancellation pair for one in-flight turn.
///
/// `abort` salvages: the turn force-reveals and fires its completion.
/// `discard` silences: the turn dies without further notifications,
/// used when a newer send supersedes it.
struct TurnHandle {
    abort: CancellationToken,
    discard: CancellationToken,
    // Cancelled by the turn task itself when it exits, however it exits.
    finished: CancellationToken,
}

/// Streaming chat engine for one conversation endpoint.
pub struct ChatEngine<S: SessionStore> {
    config: EngineConfig,
    store: Arc<S>,
    notify: Sender<EngineNotification>,
    session: Arc<Mutex<SessionHandle>>,
    current: Option<TurnHandle>,
}

impl<S: SessionStore> ChatEngine<S> {
    /// Create an engine and the stream of notifications it will emit.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: S,
    ) -> (
        Self,
        impl futures_core::Stream<Item = EngineNotification> + Send + Unpin,
    ) {
        let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
        let engine = Self {
            config,
            store: Arc::new(store),
            notify: tx,
            session: Arc::new(Mutex::new(SessionHandle::new())),
            current: None,
        };
        (engine, ReceiverStream::new(rx))
    }

    /// Resume an existing server-issued session instead of starting fresh.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session = Arc::new(Mutex::new(SessionHandle::resuming(session_id)));
        self
    }

    /// The currently effective conversation id.
    #[must_use]
    pub fn session_id(&self) -> String {
        lock(&self.session).effective().to_string()
    }

    /// Whether a turn is currently in flight.
    ///
    /// Turns false on their own once the turn task exits, whether by
    /// completion, abort, or supersession.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|handle| !handle.finished.is_cancelled())
    }

    /// Send a message, starting a new turn.
    ///
    /// Any turn still in flight is discarded first: its process is
    /// killed and it emits nothing further. The user message is
    /// persisted fire-and-forget. Does not block on the response.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the Claude process fails to spawn.
    pub fn send(&mut self, message: &str) -> Result<(), SpawnError> {
        let (session_id, resume_id) = {
            let session = lock(&self.session);
            (
                session.effective().to_string(),
                session.resume_id().map(str::to_string),
            )
        };

        {
            let store = Arc::clone(&self.store);
            let content = message.to_string();
            let working_dir = self.config.working_dir.clone();
            tokio::spawn(async move {
                if let Err(err) = store
                    .persist_user_message(&session_id, &content, working_dir.as_deref())
                    .await
                {
                    tracing::warn!(error = %err, "Failed to persist user message");
                }
            });
        }

        let mut builder = ClaudeCommandBuilder::new(&self.config.binary);
        if let Some(id) = resume_id {
            builder = builder.resume(id);
        }
        if let Some(ref dir) = self.config.working_dir {
            builder = builder.working_dir(dir);
        }

        let process_cancel = CancellationToken::new();
        let events = spawn_turn(
            &builder,
            message.to_string(),
            process_cancel.clone(),
            self.config.channel_buffer,
        )?;

        self.start_turn(events, process_cancel);
        Ok(())
    }

    /// Drive a turn from an already-open transport channel.
    ///
    /// `send` calls this after spawning; it is public so harnesses can
    /// feed recorded event streams through the full reconcile/reveal
    /// path without a real process.
    pub fn start_turn(
        &mut self,
        events: Receiver<TransportEvent>,
        process_cancel: CancellationToken,
    ) {
        if let Some(previous) = self.current.take() {
            tracing::debug!("Discarding in-flight turn for a newer send");
            previous.discard.cancel();
        }

        let handle = TurnHandle {
            abort: CancellationToken::new(),
            discard: CancellationToken::new(),
            finished: CancellationToken::new(),
        };

        let ctx = TurnContext {
            notify: self.notify.clone(),
            store: Arc::clone(&self.store),
            session: Arc::clone(&self.session),
            process_cancel,
            abort: handle.abort.clone(),
            discard: handle.discard.clone(),
            finished: handle.finished.clone(),
        };

        let turn = Turn::new(self.config.fragment_separator.clone());
        let pacer = Pacer::new(self.config.reveal_chunk);
        let interval = self.config.reveal_interval();

        tokio::spawn(run_turn(ctx, events, turn, pacer, interval));
        self.current = Some(handle);
    }

    /// Abort the turn in flight, preserving already-revealed text.
    ///
    /// Safe to call in any state; a no-op when nothing is running.
    pub fn abort(&mut self) {
        if let Some(handle) = self.current.take() {
            tracing::debug!("Aborting in-flight turn");
            handle.abort.cancel();
        }
    }
}

impl<S: SessionStore> Drop for ChatEngine<S> {
    fn drop(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.discard.cancel();
        }
    }
}

/// Everything a turn task needs, cloned out of the engine.
struct TurnContext<S> {
    notify: Sender<EngineNotification>,
    store: Arc<S>,
    session: Arc<Mutex<SessionHandle>>,
    process_cancel: CancellationToken,
    abort: CancellationToken,
    discard: CancellationToken,
    finished: CancellationToken,
}

/// Per-turn event loop: joins transport events and reveal ticks.
async fn run_turn<S: SessionStore>(
    ctx: TurnContext<S>,
    mut events: Receiver<TransportEvent>,
    mut turn: Turn,
    mut pacer: Pacer,
    interval: std::time::Duration,
) {
    // Marks the turn finished on every exit path from this task.
    let _finished = ctx.finished.clone().drop_guard();

    turn.start();

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut stream_open = true;

    loop {
        tokio::select! {
            biased;

            () = ctx.discard.cancelled() => {
                ctx.process_cancel.cancel();
                tracing::debug!("Turn superseded, discarding silently");
                return;
            }

            () = ctx.abort.cancelled() => {
                ctx.process_cancel.cancel();
                turn.end_stream();
                if let Some(text) = pacer.finish_now(&turn.best_text()) {
                    finish(&ctx, &mut turn, text).await;
                }
                return;
            }

            event = events.recv(), if stream_open => {
                match event {
                    Some(TransportEvent::Event(event)) => {
                        handle_stream_event(&ctx, &mut turn, event).await;
                    }
                    Some(TransportEvent::Diagnostic(text)) => {
                        let _ = ctx.notify.send(EngineNotification::Diagnostic(text)).await;
                        turn.end_stream();
                    }
                    Some(TransportEvent::Closed) | None => {
                        turn.end_stream();
                        stream_open = false;
                    }
                }

                // Stream-end trigger site of the completion latch: do not
                // wait out a tick interval when the reveal already caught up.
                if turn.stream_ended() {
                    if let Some(text) = pacer.complete_if_caught_up(&turn.best_text(), true) {
                        finish(&ctx, &mut turn, text).await;
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                match pacer.tick(&turn.best_text(), turn.stream_ended()) {
                    TickOutcome::Reveal(prefix) => {
                        let _ = ctx.notify.send(EngineNotification::Snapshot(prefix)).await;
                    }
                    TickOutcome::Complete(text) => {
                        finish(&ctx, &mut turn, text).await;
                        return;
                    }
                    TickOutcome::Idle => {}
                }
            }
        }
    }
}

async fn handle_stream_event<S: SessionStore>(
    ctx: &TurnContext<S>,
    turn: &mut Turn,
    event: StreamEvent,
) {
    match event {
        StreamEvent::SessionStarted { session_id } => {
            let superseded = lock(&ctx.session).observe_real(&session_id);
            if let Some(old_id) = superseded {
                tracing::info!(session_id = %session_id, "Session id observed");
                let _ = ctx
                    .notify
                    .send(EngineNotification::SessionId(session_id.clone()))
                    .await;

                let store = Arc::clone(&ctx.store);
                tokio::spawn(async move {
                    if let Err(err) = store.replace_provisional_id(&old_id, &session_id).await {
                        tracing::warn!(error = %err, "Failed to rewrite session id");
                    }
                });
            }
        }
        StreamEvent::AssistantDelta { message_id, text } => {
            turn.apply_delta(&message_id, &text);
        }
        StreamEvent::FinalResult { text, is_error } => {
            turn.apply_final(text, is_error);
        }
        StreamEvent::Unrecognized => {}
    }
}

/// Fire the single turn completion: final snapshot, persistence,
/// terminal notification. The pacer latch is already set when this runs.
async fn finish<S: SessionStore>(ctx: &TurnContext<S>, turn: &mut Turn, text: String) {
    turn.mark_done();
    // The result event can precede process exit; make sure nothing
    // lingers once the turn is over.
    ctx.process_cancel.cancel();
    let is_error = turn.is_error();

    let _ = ctx
        .notify
        .send(EngineNotification::Snapshot(text.clone()))
        .await;

    if !text.is_empty() {
        let store = Arc::clone(&ctx.store);
        let session_id = lock(&ctx.session).effective().to_string();
        let content = text.clone();
        tokio::spawn(async move {
            if let Err(err) = store.persist_assistant_text(&session_id, &content).await {
                tracing::warn!(error = %err, "Failed to persist assistant text");
            }
        });
    }

    let _ = ctx
        .notify
        .send(EngineNotification::TurnComplete { text, is_error })
        .await;
}

fn lock(session: &Mutex<SessionHandle>) -> MutexGuard<'_, SessionHandle> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
