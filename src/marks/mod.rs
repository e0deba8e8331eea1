//! Mark records: exam/session aggregates holding one entry per student and
//! subject, plus the pure pieces of the reconciliation workflow (field merge,
//! report filtering, first-match-wins dedup, `marksObtained` policy).
//!
//! Persistence lives in [`store`]; the request-level operations that combine
//! lookups and writes live in [`service`].

pub mod service;
pub mod store;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkEntry {
    pub id: String,
    pub subject_id: Option<String>,
    pub student_id: String,
    pub testscore: f64,
    pub examscore: f64,
    pub marks_obtained: f64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkRecord {
    pub id: String,
    pub exam_id: String,
    /// `None` only for records created by the bulk fallback upsert and not
    /// yet backfilled.
    pub session: Option<String>,
    pub marks: Vec<MarkEntry>,
    pub created_at: String,
    pub updated_at: String,
}

impl MarkRecord {
    pub fn entry_for(&self, student_id: &str, subject_id: &str) -> Option<&MarkEntry> {
        self.marks.iter().find(|m| {
            m.student_id == student_id && m.subject_id.as_deref() == Some(subject_id)
        })
    }
}

/// One incoming score change. Every field is optional: a merge only touches
/// the fields the client actually sent (`null` counts as not sent).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkUpdate {
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
    pub testscore: Option<f64>,
    pub examscore: Option<f64>,
    pub marks_obtained: Option<f64>,
    pub comment: Option<String>,
}

impl MarkUpdate {
    pub fn apply_to(&self, entry: &mut MarkEntry) {
        if let Some(v) = &self.student_id {
            entry.student_id = v.clone();
        }
        if let Some(v) = &self.subject_id {
            entry.subject_id = Some(v.clone());
        }
        if let Some(v) = self.testscore {
            entry.testscore = v;
        }
        if let Some(v) = self.examscore {
            entry.examscore = v;
        }
        if let Some(v) = self.marks_obtained {
            entry.marks_obtained = v;
        }
        if let Some(v) = &self.comment {
            entry.comment = Some(v.clone());
        }
    }

    /// First required field this update lacks for building a fresh entry.
    pub fn missing_required(&self) -> Option<&'static str> {
        if self.student_id.is_none() {
            return Some("studentId");
        }
        if self.testscore.is_none() {
            return Some("testscore");
        }
        if self.examscore.is_none() {
            return Some("examscore");
        }
        if self.marks_obtained.is_none() {
            return Some("marksObtained");
        }
        None
    }

    /// Build a new entry; the subject comes from the request scope, never
    /// from the update payload.
    pub fn to_entry(&self, entry_id: String, subject_id: &str) -> Option<MarkEntry> {
        Some(MarkEntry {
            id: entry_id,
            subject_id: Some(subject_id.to_string()),
            student_id: self.student_id.clone()?,
            testscore: self.testscore?,
            examscore: self.examscore?,
            marks_obtained: self.marks_obtained?,
            comment: self.comment.clone(),
        })
    }
}

/// Merge updates into existing entries, matching on `studentId`. The first
/// update for a student wins; updates without a matching entry are dropped
/// and the entry count never changes. Returns how many entries were touched.
pub fn merge_updates(entries: &mut [MarkEntry], updates: &[MarkUpdate]) -> usize {
    let mut merged = 0;
    for entry in entries.iter_mut() {
        let found = updates
            .iter()
            .find(|u| u.student_id.as_deref() == Some(entry.student_id.as_str()));
        if let Some(update) = found {
            update.apply_to(entry);
            merged += 1;
        }
    }
    merged
}

/// Whether a read path reports the stored `marksObtained` or recomputes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarksObtainedPolicy {
    Stored,
    Derived,
}

impl MarksObtainedPolicy {
    pub fn resolve(self, entry: &MarkEntry) -> f64 {
        match self {
            MarksObtainedPolicy::Stored => entry.marks_obtained,
            MarksObtainedPolicy::Derived => entry.testscore + entry.examscore,
        }
    }
}

/// Report-card filter: at least one non-zero score and a non-blank comment.
pub fn is_reportable(entry: &MarkEntry) -> bool {
    let has_score = entry.testscore != 0.0 || entry.examscore != 0.0;
    let has_comment = entry
        .comment
        .as_deref()
        .map(|c| !c.trim().is_empty())
        .unwrap_or(false);
    has_score && has_comment
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentScore {
    /// Entry id.
    pub id: String,
    pub exam_id: String,
    pub exam_name: String,
    pub subject_id: String,
    pub subject_name: String,
    pub student_id: String,
    pub testscore: f64,
    pub examscore: f64,
    pub marks_obtained: f64,
    pub comment: String,
}

/// Keep the first score per (examId, subjectId) in iteration order; later
/// duplicates are dropped without overwriting.
pub fn dedup_first_per_exam_subject(scores: Vec<StudentScore>) -> Vec<StudentScore> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::with_capacity(scores.len());
    for s in scores {
        if seen.insert((s.exam_id.clone(), s.subject_id.clone())) {
            out.push(s);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSheetRow {
    pub student_id: String,
    pub student_name: Option<String>,
    pub testscore: f64,
    pub examscore: f64,
    pub marks_obtained: f64,
    pub comment: Option<String>,
}
