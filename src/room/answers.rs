//! Answer buffer
//!
//! Holds at most one not-yet-submitted answer per participant. `take` is
//! the only way the flush path reads it, and it empties the slot in the
//! same step: a re-delivered transition finds nothing to flush, which is
//! what makes submission at-most-once per question.

use crate::types::{AnswerSelection, ChoiceId, PendingAnswer, Question};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct AnswerBuffer {
    slot: Mutex<Option<PendingAnswer>>,
}

impl AnswerBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite whatever is pending. Last write wins; nothing merges.
    pub async fn set(&self, answer: PendingAnswer) {
        *self.slot.lock().await = Some(answer);
    }

    pub async fn clear(&self) {
        *self.slot.lock().await = None;
    }

    /// Snapshot of the current pending answer for the UI.
    pub async fn pending(&self) -> Option<PendingAnswer> {
        self.slot.lock().await.clone()
    }

    /// Consume the pending answer for flushing. The slot is emptied in the
    /// same step, so a second take before new input returns `None`.
    pub async fn take(&self) -> Option<PendingAnswer> {
        self.slot.lock().await.take()
    }

    /// Record a tap on `choice_id` for the question at `question_index`.
    ///
    /// Single-choice game types replace the previous pick. Ordered-phrase
    /// appends in tap order, ignoring a choice that is already part of the
    /// sequence. Anything pending for an older question is replaced
    /// outright.
    pub async fn select(&self, question_index: usize, question: &Question, choice_id: ChoiceId) {
        let mut slot = self.slot.lock().await;

        if question.game_type.is_ordered() {
            if let Some(pending) = slot.as_mut() {
                if pending.question_index == question_index {
                    if let AnswerSelection::Ordered(sequence) = &mut pending.selection {
                        if !sequence.contains(&choice_id) {
                            sequence.push(choice_id);
                        }
                        return;
                    }
                }
            }
            *slot = Some(PendingAnswer {
                question_index,
                question_id: question.question_id,
                selection: AnswerSelection::Ordered(vec![choice_id]),
            });
        } else {
            *slot = Some(PendingAnswer {
                question_index,
                question_id: question.question_id,
                selection: AnswerSelection::Single(choice_id),
            });
        }
    }

    /// Undo a tap. List semantics for ordered-phrase: the choice is removed
    /// wherever it sits, the rest keep their order. Removing the last piece
    /// (or a single-choice pick) leaves the buffer empty.
    pub async fn remove(&self, question_index: usize, choice_id: ChoiceId) {
        let mut slot = self.slot.lock().await;
        let Some(pending) = slot.as_mut() else {
            return;
        };
        if pending.question_index != question_index {
            return;
        }

        let emptied = match &mut pending.selection {
            AnswerSelection::Single(current) => *current == choice_id,
            AnswerSelection::Ordered(sequence) => {
                sequence.retain(|c| *c != choice_id);
                sequence.is_empty()
            }
        };
        if emptied {
            *slot = None;
        }
    }
}
