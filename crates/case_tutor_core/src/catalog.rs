//! crates/case_tutor_core/src/catalog.rs
//!
//! The case catalog: the built-in seed case, case templates and validation, bulk JSON
//! import, and the choice of the next case a student should attempt.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{CaseStep, ClinicalCase, ClinicalSession, Difficulty};

pub const SEED_CASE_ID: &str = "seed-acute-angle-closure";

/// Errors raised while validating or importing cases.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("A case needs a title")]
    MissingTitle,
    #[error("Case '{0}' has no steps")]
    NoSteps(String),
    #[error("Step {step} of case '{case}' has no question")]
    MissingQuestion { case: String, step: usize },
    #[error("Invalid case JSON: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn new_case_id() -> String {
    Uuid::new_v4().to_string()
}

//=========================================================================================
// Seed Case and Template
//=========================================================================================

fn step(title: &str, content: &str, question: &str) -> CaseStep {
    CaseStep {
        title: title.to_string(),
        content: content.to_string(),
        question: question.to_string(),
    }
}

/// The built-in case served when no tier holds any case.
pub fn seed_case() -> ClinicalCase {
    ClinicalCase {
        id: SEED_CASE_ID.to_string(),
        title: "Sudden Red Eye".to_string(),
        theme: "Glaucoma".to_string(),
        difficulty: Difficulty::Medium,
        tags: vec!["Emergency".to_string(), "Acute Glaucoma".to_string()],
        steps: vec![
            step(
                "Initial Presentation",
                "A 65-year-old man presents with sudden, severe pain in the right eye, with nausea \
                 and vomiting. He reports seeing colored halos around lights.",
                "What are your main initial diagnostic hypotheses?",
            ),
            step(
                "Additional History",
                "He denies previous trauma or eye surgery. He is hyperopic and takes medication for \
                 systemic hypertension. The pain started after an evening at the cinema.",
                "Which complementary or office examinations would you request now?",
            ),
            step(
                "Examination Findings",
                "Visual acuity OD: counting fingers at 1 meter. Slit lamp OD: marked ciliary \
                 injection, microcystic corneal edema, shallow anterior chamber, fixed mid-dilated \
                 pupil. Applanation tonometry OD: 52 mmHg.",
                "What is the most likely diagnosis, and which findings support it?",
            ),
            step(
                "Management",
                "The diagnosis of an acute angle-closure glaucoma attack was confirmed.",
                "What is the immediate medical management, and what is the definitive treatment?",
            ),
            step(
                "Final Summary",
                "Well done on finishing the case. Acute glaucoma is an ophthalmic emergency that \
                 requires rapid IOP reduction to avoid irreversible optic nerve damage.",
                "Final reflection: what did you learn about the differential diagnosis of the \
                 painful red eye?",
            ),
        ],
        created_at: DateTime::<Utc>::default(),
        created_by: "system".to_string(),
    }
}

/// An untitled five-step case for an instructor to fill in.
pub fn blank_case(author: &str, now: DateTime<Utc>) -> ClinicalCase {
    ClinicalCase {
        id: new_case_id(),
        title: String::new(),
        theme: String::new(),
        difficulty: Difficulty::Medium,
        tags: Vec::new(),
        steps: vec![
            step("Initial Presentation", "", "What are your diagnostic hypotheses?"),
            step("Complementary Exams", "", "Which examinations would you request?"),
            step("Final Diagnosis", "", "What is the most likely diagnosis?"),
            step("Management", "", "What treatment is indicated?"),
            step("Summary and Feedback", "", "What did we learn from this case?"),
        ],
        created_at: now,
        created_by: author.to_string(),
    }
}

/// Checks the invariants every stored case must satisfy.
pub fn validate_case(case: &ClinicalCase) -> Result<(), CatalogError> {
    if case.title.trim().is_empty() {
        return Err(CatalogError::MissingTitle);
    }
    if case.steps.is_empty() {
        return Err(CatalogError::NoSteps(case.title.clone()));
    }
    if let Some(index) = case.steps.iter().position(|s| s.question.trim().is_empty()) {
        return Err(CatalogError::MissingQuestion {
            case: case.title.clone(),
            step: index,
        });
    }
    Ok(())
}

//=========================================================================================
// Import
//=========================================================================================

/// A case as found in an import file: ids and timestamps are optional.
#[derive(Deserialize)]
struct ImportedCase {
    #[serde(default)]
    id: Option<String>,
    title: String,
    #[serde(default)]
    theme: String,
    #[serde(default)]
    difficulty: Difficulty,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    steps: Vec<CaseStep>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    created_by: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImportPayload {
    Many(Vec<ImportedCase>),
    One(ImportedCase),
}

/// Parses a JSON document holding either one case or an array of cases.
///
/// Cases without an id get a fresh one. The whole import is rejected if any case is invalid.
pub fn import_cases(
    json: &str,
    author: &str,
    now: DateTime<Utc>,
) -> Result<Vec<ClinicalCase>, CatalogError> {
    let imported = match serde_json::from_str::<ImportPayload>(json)? {
        ImportPayload::Many(cases) => cases,
        ImportPayload::One(case) => vec![case],
    };

    imported
        .into_iter()
        .map(|raw| {
            let case = ClinicalCase {
                id: raw.id.filter(|id| !id.trim().is_empty()).unwrap_or_else(new_case_id),
                title: raw.title,
                theme: raw.theme,
                difficulty: raw.difficulty,
                tags: raw.tags,
                steps: raw.steps,
                created_at: raw.created_at.unwrap_or(now),
                created_by: raw.created_by.unwrap_or_else(|| author.to_string()),
            };
            validate_case(&case)?;
            Ok(case)
        })
        .collect()
}

/// In-progress sessions on `case_id` whose current step would no longer exist if the
/// case were cut down to `new_step_count` steps.
pub fn sessions_stranded_by_edit<'a>(
    case_id: &str,
    new_step_count: usize,
    sessions: &'a [ClinicalSession],
) -> Vec<&'a ClinicalSession> {
    sessions
        .iter()
        .filter(|s| {
            s.case_id == case_id && !s.is_completed() && s.current_step >= new_step_count
        })
        .collect()
}

//=========================================================================================
// Case Selection
//=========================================================================================

/// Picks the next case for a student.
///
/// Cases the student has not completed yet are preferred; once every case has been
/// completed at least once, any case may be replayed. Returns `None` only for an
/// empty catalog.
pub fn select_next_case<'a, R>(
    catalog: &'a [ClinicalCase],
    student_sessions: &[ClinicalSession],
    rng: &mut R,
) -> Option<&'a ClinicalCase>
where
    R: Rng + ?Sized,
{
    let completed: HashSet<&str> = student_sessions
        .iter()
        .filter(|s| s.is_completed())
        .map(|s| s.case_id.as_str())
        .collect();

    let fresh: Vec<&ClinicalCase> = catalog
        .iter()
        .filter(|c| !completed.contains(c.id.as_str()))
        .collect();

    match fresh.choose(rng) {
        Some(case) => Some(*case),
        None => catalog.choose(rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{completed_session, sample_case, session_for};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn seed_and_template_are_well_formed() {
        assert!(validate_case(&seed_case()).is_ok());
        assert_eq!(seed_case().steps.len(), 5);

        let blank = blank_case("prof-1", Utc::now());
        assert_eq!(blank.steps.len(), 5);
        assert!(matches!(validate_case(&blank), Err(CatalogError::MissingTitle)));
    }

    #[test]
    fn case_without_steps_is_rejected() {
        let mut case = sample_case("a", 1);
        case.steps.clear();
        assert!(matches!(validate_case(&case), Err(CatalogError::NoSteps(_))));
    }

    #[test]
    fn import_accepts_single_object_and_assigns_id() {
        let json = r#"{
            "title": "Painless vision loss",
            "theme": "Retina",
            "difficulty": "hard",
            "steps": [{"title": "Intro", "content": "...", "question": "What now?"}]
        }"#;
        let now = Utc::now();

        let cases = import_cases(json, "prof-1", now).unwrap();

        assert_eq!(cases.len(), 1);
        assert!(!cases[0].id.is_empty());
        assert_eq!(cases[0].difficulty, Difficulty::Hard);
        assert_eq!(cases[0].created_by, "prof-1");
        assert_eq!(cases[0].created_at, now);
    }

    #[test]
    fn import_accepts_arrays_and_keeps_ids() {
        let json = r#"[
            {"id": "x1", "title": "One", "steps": [{"title": "a", "content": "b", "question": "c?"}]},
            {"id": "", "title": "Two", "steps": [{"title": "a", "content": "b", "question": "c?"}]}
        ]"#;

        let cases = import_cases(json, "prof-1", Utc::now()).unwrap();

        assert_eq!(cases[0].id, "x1");
        assert_ne!(cases[1].id, "");
    }

    #[test]
    fn import_rejects_invalid_cases() {
        let json = r#"[{"title": "No steps"}]"#;
        assert!(matches!(
            import_cases(json, "prof-1", Utc::now()),
            Err(CatalogError::NoSteps(_))
        ));
        assert!(matches!(
            import_cases("not json", "prof-1", Utc::now()),
            Err(CatalogError::Malformed(_))
        ));
    }

    #[test]
    fn selection_skips_completed_cases_until_all_are_done() {
        let catalog = vec![sample_case("A", 2), sample_case("B", 2), sample_case("C", 2)];
        let mut rng = StdRng::seed_from_u64(7);
        let mut history = vec![completed_session("s-a", "ana", &catalog[0], 4.0)];

        for _ in 0..200 {
            let picked = select_next_case(&catalog, &history, &mut rng).unwrap();
            assert_ne!(picked.id, "A");
        }

        history.push(completed_session("s-b", "ana", &catalog[1], 2.0));
        for _ in 0..50 {
            let picked = select_next_case(&catalog, &history, &mut rng).unwrap();
            assert_eq!(picked.id, "C");
        }

        history.push(completed_session("s-c", "ana", &catalog[2], 1.0));
        let mut seen = HashSet::new();
        for _ in 0..200 {
            seen.insert(select_next_case(&catalog, &history, &mut rng).unwrap().id.clone());
        }
        assert!(seen.contains("A"));
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn in_progress_sessions_do_not_exclude_a_case() {
        let catalog = vec![sample_case("A", 2)];
        let history = vec![session_for("s-a", "ana", &catalog[0])];
        let mut rng = StdRng::seed_from_u64(1);

        let picked = select_next_case(&catalog, &history, &mut rng).unwrap();
        assert_eq!(picked.id, "A");
    }

    #[test]
    fn shortening_a_case_strands_sessions_past_the_new_end() {
        let case = sample_case("c1", 3);
        let mut at_last_step = session_for("s1", "ana", &case);
        at_last_step.current_step = 2;
        let at_first_step = session_for("s2", "bia", &case);
        let mut finished = completed_session("s3", "caio", &case, 4.0);
        finished.current_step = 2;
        let mut elsewhere = session_for("s4", "ana", &sample_case("c2", 3));
        elsewhere.current_step = 2;
        let sessions = vec![at_last_step, at_first_step, finished, elsewhere];

        let stranded = sessions_stranded_by_edit("c1", 1, &sessions);
        let ids: Vec<_> = stranded.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["s1"]);

        assert!(sessions_stranded_by_edit("c1", 3, &sessions).is_empty());
        assert_eq!(sessions_stranded_by_edit("c1", 0, &sessions).len(), 2);
    }

    #[test]
    fn empty_catalog_selects_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select_next_case(&[], &[], &mut rng).is_none());
    }
}
