//! Session room
//!
//! The client-side coordinator for one participant in one activity. A
//! `SessionRoom` owns the topic subscription, the progression machine, the
//! answer buffer, and the leaderboard, and surfaces everything the UI needs
//! as a stream of [`RoomEvent`]s. It is constructed for exactly one
//! activity; `connect` and `disconnect` are idempotent, so UI layers that
//! mount twice cannot end up with duplicate subscriptions.

mod answers;
mod leaderboard;
mod progress;

pub use answers::AnswerBuffer;
pub use leaderboard::{LeaderboardReconciler, ReconcilerMode};
pub use progress::{IgnoreReason, Plan, ProgressionMachine, RoomPhase};

use crate::api::{ApiError, SessionBackend};
use crate::config::RoomConfig;
use crate::protocol::SessionEvent;
use crate::transport::{TopicSubscription, TopicTransport, TransportError};
use crate::types::{
    ActivityId, AnswerSelection, ChoiceId, LeaderboardEntry, Participant, PendingAnswer, Question,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Everything a client needs to enter a session.
#[derive(Debug, Clone)]
pub struct JoinParams {
    pub activity_id: ActivityId,
    pub me: Participant,
    /// Membership known at join time; seeds the leaderboard.
    pub roster: Vec<Participant>,
    /// The quiz content, in question order.
    pub questions: Vec<Question>,
    /// Current question when joining mid-quiz, `None` before the session
    /// has started.
    pub start_index: Option<usize>,
}

/// What the room reports to the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// Subscription is up. Also emitted after an automatic resubscribe.
    Connected,
    QuestionChanged { question_index: usize },
    QuizFinished,
    LeaderboardUpdated { standings: Vec<LeaderboardEntry> },
    /// The retry budget is exhausted and the loop has stopped.
    ConnectionLost { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("backend: {0}")]
    Backend(#[from] ApiError),
    #[error("no question is live right now")]
    NoActiveQuestion,
}

struct RoomShared {
    activity_id: ActivityId,
    me: Participant,
    questions: Vec<Question>,
    machine: Mutex<ProgressionMachine>,
    buffer: AnswerBuffer,
    board: Mutex<LeaderboardReconciler>,
    events: mpsc::Sender<RoomEvent>,
    backend: Arc<dyn SessionBackend>,
    transport: Arc<dyn TopicTransport>,
    config: RoomConfig,
}

impl RoomShared {
    /// Phase events must reach the UI, so they wait for channel space.
    /// Leaderboard updates are refreshable and get dropped with a warning
    /// when the consumer lags.
    async fn emit(&self, event: RoomEvent) {
        match event {
            RoomEvent::LeaderboardUpdated { .. } => match self.events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    tracing::warn!(
                        activity_id = self.activity_id,
                        ?event,
                        "room event channel full, dropping leaderboard update"
                    );
                }
                Err(TrySendError::Closed(_)) => {}
            },
            event => {
                if self.events.send(event).await.is_err() {
                    tracing::debug!(activity_id = self.activity_id, "room event receiver gone");
                }
            }
        }
    }
}

struct RoomLink {
    task: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

pub struct SessionRoom {
    shared: Arc<RoomShared>,
    start_index: Option<usize>,
    link: Mutex<Option<RoomLink>>,
}

impl SessionRoom {
    /// Build a room and the event stream its UI will consume. Nothing
    /// happens on the network until [`SessionRoom::connect`].
    pub fn new(
        params: JoinParams,
        backend: Arc<dyn SessionBackend>,
        transport: Arc<dyn TopicTransport>,
        config: RoomConfig,
    ) -> (Self, mpsc::Receiver<RoomEvent>) {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);
        let shared = Arc::new(RoomShared {
            activity_id: params.activity_id,
            me: params.me,
            questions: params.questions,
            machine: Mutex::new(ProgressionMachine::new()),
            buffer: AnswerBuffer::new(),
            board: Mutex::new(LeaderboardReconciler::new(params.roster)),
            events: events_tx,
            backend,
            transport,
            config,
        });
        (
            Self {
                shared,
                start_index: params.start_index,
                link: Mutex::new(None),
            },
            events_rx,
        )
    }

    pub fn activity_id(&self) -> ActivityId {
        self.shared.activity_id
    }

    pub fn participant(&self) -> &Participant {
        &self.shared.me
    }

    /// Subscribe to the activity topic and start the event loop.
    ///
    /// Idempotent: calling it again while the loop is healthy changes
    /// nothing. After a terminal connection loss it starts over.
    pub async fn connect(&self) -> Result<(), RoomError> {
        let mut link = self.link.lock().await;
        if let Some(existing) = link.as_ref() {
            if !existing.task.is_finished() {
                tracing::debug!(
                    activity_id = self.shared.activity_id,
                    "connect ignored, already connected"
                );
                return Ok(());
            }
            link.take();
        }

        let subscription = subscribe_with_backoff(&self.shared).await?;
        self.shared
            .machine
            .lock()
            .await
            .mark_connected(self.start_index);
        tracing::info!(
            activity_id = self.shared.activity_id,
            user = %self.shared.me.user_id,
            "connected to session"
        );
        self.shared.emit(RoomEvent::Connected).await;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(room_loop(self.shared.clone(), subscription, shutdown_rx));
        *link = Some(RoomLink {
            task,
            shutdown: shutdown_tx,
        });
        Ok(())
    }

    /// Stop the loop, drop the subscription, and send the explicit leave
    /// notification. Safe to call when already disconnected. In-flight
    /// answer submissions are not cancelled.
    pub async fn disconnect(&self) {
        let Some(mut link) = self.link.lock().await.take() else {
            return;
        };

        let _ = link.shutdown.send(());
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut link.task)
            .await
            .is_err()
        {
            link.task.abort();
        }

        let shared = self.shared.clone();
        tokio::spawn(async move {
            if let Err(e) = shared.backend.leave(shared.activity_id, &shared.me.user_id).await {
                tracing::warn!(
                    activity_id = shared.activity_id,
                    user = %shared.me.user_id,
                    error = %e,
                    "leave notification failed"
                );
            }
        });
        tracing::info!(
            activity_id = self.shared.activity_id,
            user = %self.shared.me.user_id,
            "disconnected from session"
        );
    }

    pub async fn is_connected(&self) -> bool {
        self.link
            .lock()
            .await
            .as_ref()
            .is_some_and(|link| !link.task.is_finished())
    }

    pub async fn phase(&self) -> RoomPhase {
        self.shared.machine.lock().await.phase()
    }

    /// The question currently live, if any.
    pub async fn current_question(&self) -> Option<Question> {
        let index = self.shared.machine.lock().await.question_index()?;
        self.shared.questions.get(index).cloned()
    }

    pub async fn pending_answer(&self) -> Option<PendingAnswer> {
        self.shared.buffer.pending().await
    }

    pub async fn standings(&self) -> Vec<LeaderboardEntry> {
        self.shared.board.lock().await.standings()
    }

    /// Record a tap on a choice for the live question. Single-choice game
    /// types replace the previous pick, ordered-phrase appends.
    pub async fn select_choice(&self, choice_id: ChoiceId) -> Result<(), RoomError> {
        let index = self
            .shared
            .machine
            .lock()
            .await
            .question_index()
            .ok_or(RoomError::NoActiveQuestion)?;
        let question = self
            .shared
            .questions
            .get(index)
            .ok_or(RoomError::NoActiveQuestion)?;
        self.shared.buffer.select(index, question, choice_id).await;
        Ok(())
    }

    /// Undo a tap on the live question.
    pub async fn remove_choice(&self, choice_id: ChoiceId) -> Result<(), RoomError> {
        let index = self
            .shared
            .machine
            .lock()
            .await
            .question_index()
            .ok_or(RoomError::NoActiveQuestion)?;
        self.shared.buffer.remove(index, choice_id).await;
        Ok(())
    }

    pub async fn clear_answer(&self) {
        self.shared.buffer.clear().await;
    }

    /// Ask the server to move the session to `question_index`. The room
    /// does not transition here; like everyone else it waits for the
    /// resulting broadcast. The server rejects non-teachers.
    pub async fn advance_to_question(&self, question_index: usize) -> Result<(), RoomError> {
        self.shared
            .backend
            .next_question(self.shared.activity_id, question_index, &self.shared.me.user_id)
            .await?;
        Ok(())
    }

    /// Ask the server to end the quiz. Server-authorized like
    /// [`SessionRoom::advance_to_question`].
    pub async fn finish_quiz(&self) -> Result<(), RoomError> {
        self.shared
            .backend
            .finish_quiz(self.shared.activity_id, &self.shared.me.user_id)
            .await?;
        Ok(())
    }
}

impl Drop for SessionRoom {
    fn drop(&mut self) {
        if let Ok(mut link) = self.link.try_lock() {
            if let Some(link) = link.take() {
                link.task.abort();
            }
        }
    }
}

async fn subscribe_with_backoff(
    shared: &RoomShared,
) -> Result<TopicSubscription, TransportError> {
    let policy = &shared.config.reconnect;
    let attempts = policy.max_attempts.max(1);
    let mut last_error = TransportError::Subscribe("no subscribe attempt made".to_string());

    for attempt in 1..=attempts {
        match shared.transport.subscribe(shared.activity_id).await {
            Ok(subscription) => {
                if attempt > 1 {
                    tracing::info!(
                        activity_id = shared.activity_id,
                        attempt,
                        "subscribed after retry"
                    );
                }
                return Ok(subscription);
            }
            Err(e) => {
                if attempt < attempts {
                    let delay = policy.delay_before(attempt);
                    tracing::warn!(
                        activity_id = shared.activity_id,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "subscribe failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = e;
            }
        }
    }
    Err(last_error)
}

/// The room's event loop: pump broadcasts, poll the leaderboard, resubscribe
/// when the stream drops, stop on shutdown.
async fn room_loop(
    shared: Arc<RoomShared>,
    mut subscription: TopicSubscription,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut poll = tokio::time::interval(shared.config.leaderboard_poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::debug!(activity_id = shared.activity_id, "room loop stopped");
                break;
            }
            message = subscription.next() => match message {
                Some(raw) => handle_broadcast(&shared, &raw).await,
                None => {
                    tracing::warn!(activity_id = shared.activity_id, "broadcast stream ended");
                    match subscribe_with_backoff(&shared).await {
                        Ok(fresh) => {
                            subscription = fresh;
                            shared.emit(RoomEvent::Connected).await;
                        }
                        Err(e) => {
                            shared
                                .emit(RoomEvent::ConnectionLost { reason: e.to_string() })
                                .await;
                            break;
                        }
                    }
                }
            },
            // first tick fires immediately and doubles as the initial fetch
            _ = poll.tick() => {
                tokio::spawn(refresh_leaderboard(shared.clone()));
            }
        }
    }
}

async fn handle_broadcast(shared: &Arc<RoomShared>, raw: &str) {
    let event = match SessionEvent::parse(raw) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                activity_id = shared.activity_id,
                error = %e,
                "ignoring unrecognized broadcast"
            );
            return;
        }
    };

    let plan = shared.machine.lock().await.plan(event);
    match plan {
        Plan::Advance { to } => {
            // Flush initiation happens before the phase commit, so local
            // bookkeeping never claims question `to` with an answer for the
            // previous question still sitting in the buffer.
            flush_pending(shared).await;
            shared.machine.lock().await.advance_to(to);
            tracing::debug!(activity_id = shared.activity_id, question_index = to, "advanced");
            shared
                .emit(RoomEvent::QuestionChanged { question_index: to })
                .await;
            tokio::spawn(refresh_leaderboard(shared.clone()));
        }
        Plan::Finish => {
            flush_pending(shared).await;
            shared.machine.lock().await.finish();
            tracing::info!(activity_id = shared.activity_id, "quiz finished");
            shared.emit(RoomEvent::QuizFinished).await;
            tokio::spawn(refresh_leaderboard(shared.clone()));
        }
        Plan::Ignore(reason) => {
            tracing::debug!(activity_id = shared.activity_id, ?event, ?reason, "broadcast ignored");
        }
    }
}

/// Take whatever is pending right now and hand it to the scoring endpoint
/// on a detached task. The buffer is emptied before the caller commits its
/// transition; the network outcome is logged and never retried, so a
/// submission races the session at most once.
async fn flush_pending(shared: &Arc<RoomShared>) {
    let Some(pending) = shared.buffer.take().await else {
        return;
    };
    tracing::debug!(
        activity_id = shared.activity_id,
        question_index = pending.question_index,
        "flushing pending answer"
    );

    let shared = shared.clone();
    tokio::spawn(async move {
        let result = match &pending.selection {
            AnswerSelection::Single(choice_id) => {
                shared
                    .backend
                    .award_choice(
                        shared.activity_id,
                        &shared.me.user_id,
                        pending.question_id,
                        *choice_id,
                    )
                    .await
            }
            AnswerSelection::Ordered(sequence) => {
                shared
                    .backend
                    .award_translation(
                        shared.activity_id,
                        &shared.me.user_id,
                        pending.question_id,
                        sequence,
                    )
                    .await
            }
        };
        if let Err(e) = result {
            tracing::warn!(
                activity_id = shared.activity_id,
                question_id = pending.question_id,
                error = %e,
                "answer submission failed, not retrying"
            );
        }
    });
}

async fn refresh_leaderboard(shared: Arc<RoomShared>) {
    match shared.backend.fetch_leaderboard(shared.activity_id).await {
        Ok(snapshot) => {
            let standings = {
                let mut board = shared.board.lock().await;
                if !board.merge(&snapshot) {
                    return;
                }
                board.standings()
            };
            shared.emit(RoomEvent::LeaderboardUpdated { standings }).await;
        }
        Err(e) => {
            tracing::debug!(
                activity_id = shared.activity_id,
                error = %e,
                "leaderboard fetch failed"
            );
        }
    }
}
