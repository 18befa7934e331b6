//! Leaderboard reconciliation
//!
//! Folds pulled score snapshots into the locally displayed board. The first
//! successful fetch bootstraps from the union of the join-time roster and
//! the snapshot; every later fetch only updates scores in place and appends
//! users it has never seen. Entries are never removed, scores never move
//! backwards, and rank order is deterministic: score descending with
//! first-seen order breaking ties.

use crate::types::{LeaderboardEntry, Participant, Role, ScoreEntry, UserId};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerMode {
    /// No snapshot merged yet; the next one builds the board.
    Bootstrapping,
    /// Board exists; snapshots fold in as updates.
    SteadyState,
}

#[derive(Debug)]
pub struct LeaderboardReconciler {
    roster: Vec<Participant>,
    entries: IndexMap<UserId, LeaderboardEntry>,
    mode: ReconcilerMode,
}

impl LeaderboardReconciler {
    /// `roster` is the membership known at join time; it seeds the board on
    /// the first merge with everyone at score 0.
    pub fn new(roster: Vec<Participant>) -> Self {
        Self {
            roster,
            entries: IndexMap::new(),
            mode: ReconcilerMode::Bootstrapping,
        }
    }

    pub fn mode(&self) -> ReconcilerMode {
        self.mode
    }

    /// Fold a fetched snapshot in. Returns whether anything visible
    /// changed, so callers can skip redundant UI updates.
    ///
    /// Safe against out-of-order completion of concurrent fetches: updates
    /// are monotonic per user, so a late, older snapshot cannot revert a
    /// newer score.
    pub fn merge(&mut self, snapshot: &[ScoreEntry]) -> bool {
        match self.mode {
            ReconcilerMode::Bootstrapping => {
                self.bootstrap(snapshot);
                true
            }
            ReconcilerMode::SteadyState => self.absorb(snapshot),
        }
    }

    /// First fetch: union of roster and snapshot. Roster wins for display
    /// name and role, the snapshot supplies scores, and snapshot users
    /// missing from the roster are appended (they joined before we did).
    fn bootstrap(&mut self, snapshot: &[ScoreEntry]) {
        for participant in &self.roster {
            self.entries.insert(
                participant.user_id.clone(),
                LeaderboardEntry {
                    user_id: participant.user_id.clone(),
                    display_name: participant.display_name.clone(),
                    score: 0,
                    role: participant.role,
                },
            );
        }
        self.absorb(snapshot);
        self.mode = ReconcilerMode::SteadyState;
    }

    /// Steady state: update scores in place, append unknown users, delete
    /// nothing.
    fn absorb(&mut self, snapshot: &[ScoreEntry]) -> bool {
        let mut changed = false;
        for row in snapshot {
            match self.entries.get_mut(&row.user_id) {
                Some(entry) => {
                    if row.score > entry.score {
                        entry.score = row.score;
                        changed = true;
                    }
                }
                None => {
                    // Snapshots carry no identity beyond the id, so the id
                    // doubles as the name until a roster ever says better.
                    self.entries.insert(
                        row.user_id.clone(),
                        LeaderboardEntry {
                            user_id: row.user_id.clone(),
                            display_name: row.user_id.clone(),
                            score: row.score,
                            role: Role::Student,
                        },
                    );
                    changed = true;
                }
            }
        }
        changed
    }

    /// Ranked view for display. `sort_by` is stable, so equal scores keep
    /// their first-seen order across re-renders.
    pub fn standings(&self) -> Vec<LeaderboardEntry> {
        let mut rows: Vec<LeaderboardEntry> = self.entries.values().cloned().collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str, name: &str, role: Role) -> Participant {
        Participant {
            user_id: id.to_string(),
            display_name: name.to_string(),
            role,
        }
    }

    fn row(id: &str, score: u32) -> ScoreEntry {
        ScoreEntry {
            user_id: id.to_string(),
            score,
        }
    }

    fn class_roster() -> Vec<Participant> {
        vec![
            participant("u1", "Ana", Role::Student),
            participant("u2", "Bo", Role::Teacher),
        ]
    }

    #[test]
    fn test_bootstrap_unions_roster_and_snapshot() {
        let mut board = LeaderboardReconciler::new(class_roster());
        assert_eq!(board.mode(), ReconcilerMode::Bootstrapping);

        assert!(board.merge(&[row("u1", 3)]));
        assert_eq!(board.mode(), ReconcilerMode::SteadyState);

        let standings = board.standings();
        assert_eq!(standings.len(), 2);
        assert_eq!(standings[0].user_id, "u1");
        assert_eq!(standings[0].display_name, "Ana");
        assert_eq!(standings[0].score, 3);
        assert_eq!(standings[0].role, Role::Student);
        assert_eq!(standings[1].user_id, "u2");
        assert_eq!(standings[1].display_name, "Bo");
        assert_eq!(standings[1].score, 0);
        assert_eq!(standings[1].role, Role::Teacher);
    }

    #[test]
    fn test_bootstrap_appends_users_who_joined_before_us() {
        let mut board = LeaderboardReconciler::new(class_roster());
        board.merge(&[row("u9", 7)]);

        let standings = board.standings();
        assert_eq!(standings[0].user_id, "u9");
        assert_eq!(standings[0].display_name, "u9");
        assert_eq!(standings[0].role, Role::Student);
    }

    #[test]
    fn test_steady_state_updates_in_place_and_appends() {
        let mut board = LeaderboardReconciler::new(class_roster());
        board.merge(&[row("u1", 3)]);

        assert!(board.merge(&[row("u1", 5), row("u3", 1)]));

        let standings = board.standings();
        assert_eq!(standings.len(), 3);
        assert_eq!(standings[0].user_id, "u1");
        assert_eq!(standings[0].score, 5);
        assert_eq!(standings[0].display_name, "Ana");
        assert_eq!(standings[1].user_id, "u3");
        assert_eq!(standings[1].score, 1);
        let u2 = standings.iter().find(|e| e.user_id == "u2").unwrap();
        assert_eq!(u2.score, 0);
    }

    #[test]
    fn test_nobody_is_ever_deleted() {
        let mut board = LeaderboardReconciler::new(class_roster());
        board.merge(&[row("u1", 3), row("u2", 2)]);
        board.merge(&[row("u2", 4)]);

        assert!(board.standings().iter().any(|e| e.user_id == "u1"));
    }

    #[test]
    fn test_stale_fetch_cannot_revert_a_score() {
        let mut board = LeaderboardReconciler::new(class_roster());
        board.merge(&[row("u1", 5)]);

        assert!(!board.merge(&[row("u1", 3)]));
        assert_eq!(board.standings()[0].score, 5);
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let mut board = LeaderboardReconciler::new(vec![
            participant("u1", "Ana", Role::Student),
            participant("u2", "Bo", Role::Student),
            participant("u3", "Cy", Role::Student),
        ]);
        board.merge(&[]);
        board.merge(&[row("u2", 4), row("u3", 4)]);

        let standings = board.standings();
        let order: Vec<&str> = standings.iter().map(|e| e.user_id.as_str()).collect();
        assert_eq!(order, vec!["u2", "u3", "u1"]);
    }

    #[test]
    fn test_unchanged_snapshot_reports_no_change() {
        let mut board = LeaderboardReconciler::new(class_roster());
        board.merge(&[row("u1", 3)]);
        assert!(!board.merge(&[row("u1", 3)]));
    }
}
