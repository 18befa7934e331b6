//! Progression state machine
//!
//! Client-side mirror of the session phase, driven exclusively by broadcast
//! events. Planning is pure: it looks at the current phase and an inbound
//! event and says what to do, without touching state. The event loop
//! initiates the pending-answer flush dictated by the plan and only then
//! commits the phase change, which keeps flush-before-advance intact even
//! though the network call is still in flight.

use crate::protocol::SessionEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    /// Subscription not established yet; no events can be observed.
    AwaitingTransport,
    /// Connected while the session is still waiting for its first question.
    Lobby,
    /// Question `question_index` is live.
    Active { question_index: usize },
    /// Quiz over. Terminal.
    Finished,
}

impl Default for RoomPhase {
    fn default() -> Self {
        RoomPhase::AwaitingTransport
    }
}

/// What the event loop should do with an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Flush anything pending, then move to question `to`.
    Advance { to: usize },
    /// Flush anything pending, then end the session.
    Finish,
    Ignore(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Event arrived before the machine was marked connected.
    NotConnected,
    /// NEXT_QUESTION for the index that is already live (re-delivery).
    SameIndex,
    /// NEXT_QUESTION for an index behind the current one.
    StaleIndex,
    /// Anything after FINISHED.
    AlreadyFinished,
}

#[derive(Debug, Default)]
pub struct ProgressionMachine {
    phase: RoomPhase,
}

impl ProgressionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    /// Index of the live question, if one is.
    pub fn question_index(&self) -> Option<usize> {
        match self.phase {
            RoomPhase::Active { question_index } => Some(question_index),
            _ => None,
        }
    }

    /// Record that the subscription is up. `start_index` is the session's
    /// current question when joining mid-quiz, `None` when it has not
    /// started. Later calls (reconnects) change nothing.
    pub fn mark_connected(&mut self, start_index: Option<usize>) {
        if self.phase == RoomPhase::AwaitingTransport {
            self.phase = match start_index {
                Some(question_index) => RoomPhase::Active { question_index },
                None => RoomPhase::Lobby,
            };
        }
    }

    /// Decide what an inbound event means in the current phase.
    pub fn plan(&self, event: SessionEvent) -> Plan {
        match (self.phase, event) {
            (RoomPhase::AwaitingTransport, _) => Plan::Ignore(IgnoreReason::NotConnected),
            (RoomPhase::Finished, _) => Plan::Ignore(IgnoreReason::AlreadyFinished),
            (RoomPhase::Lobby, SessionEvent::NextQuestion { question_index }) => {
                Plan::Advance { to: question_index }
            }
            (RoomPhase::Active { question_index }, SessionEvent::NextQuestion { question_index: to }) => {
                // An index ahead of us is accepted even if it skips, so a
                // missed broadcast does not wedge the room.
                if to > question_index {
                    Plan::Advance { to }
                } else if to == question_index {
                    Plan::Ignore(IgnoreReason::SameIndex)
                } else {
                    Plan::Ignore(IgnoreReason::StaleIndex)
                }
            }
            (RoomPhase::Lobby | RoomPhase::Active { .. }, SessionEvent::FinishQuiz) => Plan::Finish,
        }
    }

    pub fn advance_to(&mut self, question_index: usize) {
        self.phase = RoomPhase::Active { question_index };
    }

    pub fn finish(&mut self) {
        self.phase = RoomPhase::Finished;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next(question_index: usize) -> SessionEvent {
        SessionEvent::NextQuestion { question_index }
    }

    fn connected_at(question_index: usize) -> ProgressionMachine {
        let mut machine = ProgressionMachine::new();
        machine.mark_connected(Some(question_index));
        machine
    }

    #[test]
    fn test_events_before_connect_are_ignored() {
        let machine = ProgressionMachine::new();
        assert_eq!(machine.plan(next(0)), Plan::Ignore(IgnoreReason::NotConnected));
        assert_eq!(
            machine.plan(SessionEvent::FinishQuiz),
            Plan::Ignore(IgnoreReason::NotConnected)
        );
    }

    #[test]
    fn test_lobby_accepts_the_first_question() {
        let mut machine = ProgressionMachine::new();
        machine.mark_connected(None);
        assert_eq!(machine.phase(), RoomPhase::Lobby);
        assert_eq!(machine.plan(next(0)), Plan::Advance { to: 0 });

        machine.advance_to(0);
        assert_eq!(machine.phase(), RoomPhase::Active { question_index: 0 });
        assert_eq!(machine.question_index(), Some(0));
    }

    #[test]
    fn test_mid_quiz_join_starts_at_the_current_index() {
        let machine = connected_at(2);
        assert_eq!(machine.phase(), RoomPhase::Active { question_index: 2 });
        assert_eq!(machine.plan(next(3)), Plan::Advance { to: 3 });
    }

    #[test]
    fn test_redelivered_and_stale_indices_are_ignored() {
        let machine = connected_at(2);
        assert_eq!(machine.plan(next(2)), Plan::Ignore(IgnoreReason::SameIndex));
        assert_eq!(machine.plan(next(1)), Plan::Ignore(IgnoreReason::StaleIndex));
    }

    #[test]
    fn test_skipped_indices_are_accepted() {
        let machine = connected_at(0);
        assert_eq!(machine.plan(next(4)), Plan::Advance { to: 4 });
    }

    #[test]
    fn test_finish_is_valid_from_lobby_and_active() {
        let mut lobby = ProgressionMachine::new();
        lobby.mark_connected(None);
        assert_eq!(lobby.plan(SessionEvent::FinishQuiz), Plan::Finish);

        let active = connected_at(1);
        assert_eq!(active.plan(SessionEvent::FinishQuiz), Plan::Finish);
    }

    #[test]
    fn test_nothing_moves_a_finished_machine() {
        let mut machine = connected_at(1);
        machine.finish();
        assert_eq!(machine.phase(), RoomPhase::Finished);
        assert_eq!(machine.plan(next(2)), Plan::Ignore(IgnoreReason::AlreadyFinished));
        assert_eq!(
            machine.plan(SessionEvent::FinishQuiz),
            Plan::Ignore(IgnoreReason::AlreadyFinished)
        );
    }

    #[test]
    fn test_reconnect_does_not_reset_progress() {
        let mut machine = connected_at(0);
        machine.advance_to(3);
        machine.mark_connected(Some(0));
        assert_eq!(machine.phase(), RoomPhase::Active { question_index: 3 });
    }
}
