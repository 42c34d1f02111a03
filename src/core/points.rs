//! Point arithmetic shared by session scoring, recovery and restore.

use super::types::SessionRecord;

/// Points every account starts with.
pub const BASE_POINTS: i64 = 1_000;
/// One-off bonus for OG members.
pub const OG_BONUS: i64 = 10_000;
/// Per-score multiplier applied to `quality + sincerity`.
pub const QUESTION_POINT_MULTIPLIER: i64 = 25;
/// Upper bound for a single quality or sincerity score.
pub const MAX_QUESTION_SCORE: u8 = 10;
/// Only the first questions of a session earn points.
pub const MAX_SCORED_QUESTIONS_PER_SESSION: usize = 5;
/// Largest total a single session can earn.
pub const MAX_SESSION_POINTS: i64 = MAX_SCORED_QUESTIONS_PER_SESSION as i64
    * (2 * MAX_QUESTION_SCORE as i64)
    * QUESTION_POINT_MULTIPLIER;
/// Restores moving more than this many points require explicit confirmation.
pub const LARGE_CHANGE_THRESHOLD: i64 = 10_000;

/// Floor for a user's total: base points plus the OG bonus when applicable.
pub fn calculate_minimum_points(is_og: bool) -> i64 {
    if is_og {
        BASE_POINTS + OG_BONUS
    } else {
        BASE_POINTS
    }
}

/// Points for one answered question. Scores above 10 are clamped.
pub fn question_points(quality: u8, sincerity: u8) -> i64 {
    let quality = quality.min(MAX_QUESTION_SCORE) as i64;
    let sincerity = sincerity.min(MAX_QUESTION_SCORE) as i64;
    (quality + sincerity) * QUESTION_POINT_MULTIPLIER
}

/// Scores a session from `(quality, sincerity)` pairs; questions past the
/// fifth earn nothing.
pub fn session_points<I>(scores: I) -> i64
where
    I: IntoIterator<Item = (u8, u8)>,
{
    scores
        .into_iter()
        .take(MAX_SCORED_QUESTIONS_PER_SESSION)
        .map(|(quality, sincerity)| question_points(quality, sincerity))
        .sum::<i64>()
        .min(MAX_SESSION_POINTS)
}

/// Authoritative total derived from recorded sessions.
pub fn recalculate_total(is_og: bool, sessions: &[SessionRecord]) -> i64 {
    calculate_minimum_points(is_og)
        + sessions
            .iter()
            .map(|session| session.points_earned)
            .sum::<i64>()
}

/// Ceiling for a single admin-chosen bounty award.
pub const MAX_BUG_BOUNTY_AWARD: i64 = 100_000;

/// Reward granted for a bug report when the admin does not pick an amount.
pub fn default_bug_bounty_reward(severity: super::types::BugSeverity) -> i64 {
    use super::types::BugSeverity;
    match severity {
        BugSeverity::Low => 500,
        BugSeverity::Medium => 1_000,
        BugSeverity::High => 2_500,
        BugSeverity::Critical => 5_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn session(points: i64) -> SessionRecord {
        SessionRecord {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            question_count: 1,
            points_earned: points,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn minimum_points_depend_on_og_status() {
        assert_eq!(calculate_minimum_points(false), 1_000);
        assert_eq!(calculate_minimum_points(true), 11_000);
    }

    #[test]
    fn question_points_follow_quality_and_sincerity() {
        assert_eq!(question_points(8, 8), 400);
        assert_eq!(question_points(10, 10), 500);
        assert_eq!(question_points(0, 0), 0);
        assert_eq!(question_points(42, 200), 500);
    }

    #[test]
    fn sessions_score_at_most_five_questions() {
        let scores = vec![(10, 10); 8];
        assert_eq!(session_points(scores), 2_500);
        assert_eq!(MAX_SESSION_POINTS, 2_500);
        assert_eq!(session_points([(8, 8), (5, 3)]), 600);
    }

    #[test]
    fn recalculated_total_adds_sessions_to_the_floor() {
        let sessions = vec![session(350), session(400)];
        assert_eq!(recalculate_total(true, &sessions), 11_750);
        assert_eq!(recalculate_total(false, &sessions), 1_750);
        assert_eq!(recalculate_total(false, &[]), 1_000);
    }
}
