//! crates/case_tutor_core/src/report.rs
//!
//! Read-only reporting over the session collection: averages, the leaderboard,
//! class-wide statistics and the CSV export. Everything is recomputed on demand.
//!
//! Every average in this module divides by the number of *completed* sessions, so a
//! student's average and the class average are comparable.

use chrono::SecondsFormat;
use serde::Serialize;

use crate::domain::{ClinicalCase, ClinicalSession, UserProfile};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardRow {
    pub student_id: String,
    pub name: String,
    pub average_score: f64,
    pub completed_sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStats {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub average_score: f64,
    pub total_students: usize,
    pub active_cases: usize,
}

/// One line of the professor's student list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRow {
    pub student_id: String,
    pub name: String,
    pub email: String,
    /// Every session the student started, finished or not.
    pub session_count: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub total_sessions: usize,
    pub completed_sessions: usize,
    pub in_progress_sessions: usize,
    pub average_score: f64,
}

/// Mean of the completed sessions' scores, 0 when there are none.
fn completed_mean<'a>(sessions: impl Iterator<Item = &'a ClinicalSession>) -> (f64, usize) {
    let (sum, count) = sessions
        .filter(|s| s.is_completed())
        .fold((0.0, 0usize), |(sum, count), s| (sum + s.total_score, count + 1));
    if count == 0 {
        (0.0, 0)
    } else {
        (sum / count as f64, count)
    }
}

pub fn student_average(sessions: &[ClinicalSession], student_id: &str) -> f64 {
    completed_mean(sessions.iter().filter(|s| s.student_id == student_id)).0
}

/// Students ranked by average score, best first, at most `limit` rows.
/// Ties keep the order in which `students` were listed.
pub fn leaderboard(
    students: &[UserProfile],
    sessions: &[ClinicalSession],
    limit: usize,
) -> Vec<LeaderboardRow> {
    let mut rows: Vec<LeaderboardRow> = students
        .iter()
        .map(|student| {
            let (average_score, completed_sessions) =
                completed_mean(sessions.iter().filter(|s| s.student_id == student.id));
            LeaderboardRow {
                student_id: student.id.clone(),
                name: student.name.clone(),
                average_score,
                completed_sessions,
            }
        })
        .collect();

    // sort_by is stable.
    rows.sort_by(|a, b| b.average_score.total_cmp(&a.average_score));
    rows.truncate(limit);
    rows
}

/// Every student with their session count and average, in the order given.
pub fn student_roster(students: &[UserProfile], sessions: &[ClinicalSession]) -> Vec<StudentRow> {
    students
        .iter()
        .map(|student| {
            let mine: Vec<&ClinicalSession> = sessions
                .iter()
                .filter(|s| s.student_id == student.id)
                .collect();
            StudentRow {
                student_id: student.id.clone(),
                name: student.name.clone(),
                email: student.email.clone(),
                session_count: mine.len(),
                average_score: completed_mean(mine.into_iter()).0,
            }
        })
        .collect()
}

pub fn class_average(sessions: &[ClinicalSession]) -> f64 {
    completed_mean(sessions.iter()).0
}

pub fn class_stats(
    cases: &[ClinicalCase],
    sessions: &[ClinicalSession],
    students: &[UserProfile],
) -> ClassStats {
    let (average_score, completed_sessions) = completed_mean(sessions.iter());
    ClassStats {
        total_sessions: sessions.len(),
        completed_sessions,
        average_score,
        total_students: students.len(),
        active_cases: cases.len(),
    }
}

/// Dashboard numbers for one student, given that student's sessions.
pub fn student_summary(sessions: &[ClinicalSession]) -> StudentSummary {
    let (average_score, completed_sessions) = completed_mean(sessions.iter());
    StudentSummary {
        total_sessions: sessions.len(),
        completed_sessions,
        in_progress_sessions: sessions.len() - completed_sessions,
        average_score,
    }
}

//=========================================================================================
// CSV Export
//=========================================================================================

pub const CSV_HEADER: &str = "student_id,case_title,score,started_at";

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// One row per session, header first, newline separated.
pub fn export_csv(sessions: &[ClinicalSession]) -> String {
    let mut lines = Vec::with_capacity(sessions.len() + 1);
    lines.push(CSV_HEADER.to_string());
    for s in sessions {
        lines.push(format!(
            "{},{},{},{}",
            csv_field(&s.student_id),
            csv_field(&s.case_title),
            s.total_score,
            s.started_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserRole;
    use crate::testing::{completed_session, profile, sample_case, session_for};

    #[test]
    fn student_average_ignores_unfinished_sessions() {
        let case = sample_case("c1", 5);
        let mut in_progress = session_for("s3", "ana", &case);
        in_progress.total_score = 10.0;
        let sessions = vec![
            completed_session("s1", "ana", &case, 6.0),
            completed_session("s2", "ana", &case, 8.0),
            in_progress,
            completed_session("s4", "bia", &case, 1.0),
        ];

        assert_eq!(student_average(&sessions, "ana"), 7.0);
        assert_eq!(student_average(&sessions, "nobody"), 0.0);
    }

    #[test]
    fn leaderboard_is_sorted_stable_and_truncated() {
        let case = sample_case("c1", 5);
        let students = vec![
            profile("a", "a@x.edu", UserRole::Student),
            profile("b", "b@x.edu", UserRole::Student),
            profile("c", "c@x.edu", UserRole::Student),
            profile("d", "d@x.edu", UserRole::Student),
        ];
        let sessions = vec![
            completed_session("s1", "a", &case, 4.0),
            completed_session("s2", "b", &case, 9.0),
            completed_session("s3", "c", &case, 4.0),
        ];

        let rows = leaderboard(&students, &sessions, 3);

        let order: Vec<_> = rows.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(rows[0].completed_sessions, 1);
    }

    #[test]
    fn class_average_uses_completed_sessions_only() {
        let case = sample_case("c1", 5);
        let mut started = session_for("s3", "c", &case);
        started.total_score = 2.0;
        let sessions = vec![
            completed_session("s1", "a", &case, 6.0),
            completed_session("s2", "b", &case, 10.0),
            started,
        ];

        assert_eq!(class_average(&sessions), 8.0);
        assert_eq!(class_average(&[]), 0.0);

        let stats = class_stats(&[case], &sessions, &[]);
        assert_eq!(stats.total_sessions, 3);
        assert_eq!(stats.completed_sessions, 2);
        assert_eq!(stats.active_cases, 1);
    }

    #[test]
    fn roster_counts_all_sessions_but_averages_completed_ones() {
        let case = sample_case("c1", 5);
        let students = vec![
            profile("a", "a@x.edu", UserRole::Student),
            profile("b", "b@x.edu", UserRole::Student),
        ];
        let sessions = vec![
            completed_session("s1", "a", &case, 6.0),
            completed_session("s2", "a", &case, 8.0),
            session_for("s3", "a", &case),
        ];

        let rows = student_roster(&students, &sessions);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].email, "a@x.edu");
        assert_eq!(rows[0].session_count, 3);
        assert_eq!(rows[0].average_score, 7.0);
        assert_eq!(rows[1].student_id, "b");
        assert_eq!(rows[1].session_count, 0);
        assert_eq!(rows[1].average_score, 0.0);
    }

    #[test]
    fn student_summary_counts_both_states() {
        let case = sample_case("c1", 5);
        let sessions = vec![
            completed_session("s1", "a", &case, 5.0),
            session_for("s2", "a", &case),
        ];

        let summary = student_summary(&sessions);

        assert_eq!(summary.completed_sessions, 1);
        assert_eq!(summary.in_progress_sessions, 1);
        assert_eq!(summary.average_score, 5.0);
    }

    #[test]
    fn csv_has_header_and_quotes_awkward_titles() {
        let mut case = sample_case("c1", 2);
        case.title = "Red eye, painful".to_string();
        let session = completed_session("s1", "ana", &case, 3.5);

        let csv = export_csv(&[session]);
        let lines: Vec<_> = csv.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].starts_with("ana,\"Red eye, painful\",3.5,"));
        assert_eq!(lines.len(), 2);
        assert_eq!(export_csv(&[]), CSV_HEADER);
    }
}
