//! Ranks open tasks and picks the single best next action.

use uuid::Uuid;

use crate::models::{NextTaskRecommendation, QuestState, TaskState};

const ACTIVE_QUEST_BONUS: i64 = 18;
const PRIORITY_WEIGHT: i64 = 11;
const BLOCKER_PENALTY: i64 = 20;

/// An open task joined with the quest and project it belongs to.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub task_id: Uuid,
    pub task_title: String,
    pub task_state: TaskState,
    pub blocker_count: usize,
    pub quest_title: String,
    pub quest_state: QuestState,
    pub quest_priority: i64,
    pub project_id: Uuid,
    pub project_name: String,
}

fn state_weight(state: TaskState) -> i64 {
    match state {
        TaskState::Doing => 40,
        TaskState::Review => 34,
        TaskState::Todo => 24,
        TaskState::Done | TaskState::Blocked => 0,
    }
}

/// Score in `0..=100` for one candidate.
pub fn score(candidate: &Candidate) -> u8 {
    let active_bonus = if candidate.quest_state == QuestState::Active {
        ACTIVE_QUEST_BONUS
    } else {
        0
    };
    let blockers = i64::try_from(candidate.blocker_count).unwrap_or(i64::MAX);

    let raw = state_weight(candidate.task_state)
        .saturating_add(candidate.quest_priority.saturating_mul(PRIORITY_WEIGHT))
        .saturating_add(active_bonus)
        .saturating_sub(blockers.saturating_mul(BLOCKER_PENALTY));
    raw.clamp(0, 100) as u8
}

pub fn reason(candidate: &Candidate) -> String {
    if candidate.blocker_count > 0 {
        format!(
            "Unblock {} in {}.",
            candidate.task_title, candidate.project_name
        )
    } else {
        format!(
            "Push {} ({}) forward.",
            candidate.task_title, candidate.quest_title
        )
    }
}

/// Pick the highest scoring candidate.
///
/// Candidates must already be ordered by quest priority then task recency;
/// on equal scores the earlier one wins.
pub fn pick(candidates: &[Candidate]) -> Option<NextTaskRecommendation> {
    let mut best: Option<(&Candidate, u8)> = None;
    for candidate in candidates.iter().filter(|c| c.task_state.is_open()) {
        let s = score(candidate);
        match best {
            Some((_, best_score)) if s <= best_score => {}
            _ => best = Some((candidate, s)),
        }
    }

    best.map(|(candidate, score)| NextTaskRecommendation {
        task_id: candidate.task_id,
        project_id: candidate.project_id,
        reason: reason(candidate),
        score,
    })
}
