use crate::db::now_rfc3339;
use crate::directory;
use crate::error::{AppError, AppResult};
use crate::marks::{
    dedup_first_per_exam_subject, is_reportable, merge_updates, store, MarkEntry, MarkRecord,
    MarkUpdate, MarksObtainedPolicy, ScoreSheetRow, StudentScore,
};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    Created(MarkRecord),
    Updated(MarkRecord),
}

/// Save path: merge into the record for (exam, subject, session), or create
/// it. Exactly one record write either way.
pub fn save_or_update(
    conn: &Connection,
    exam_id: &str,
    subject_id: &str,
    session_id: &str,
    updates: &[MarkUpdate],
) -> AppResult<SaveOutcome> {
    let existing = store::find_by_exam_subject_session(conn, exam_id, subject_id, session_id)?;

    if let Some(mut record) = existing.filter(|r| !r.marks.is_empty()) {
        let merged = merge_updates(&mut record.marks, updates);
        store::save_record(conn, &mut record)?;
        info!(
            record_id = %record.id,
            exam_id,
            subject_id,
            merged,
            dropped = updates.len().saturating_sub(merged),
            "marks updated"
        );
        return Ok(SaveOutcome::Updated(record));
    }

    for (i, update) in updates.iter().enumerate() {
        if let Some(field) = update.missing_required() {
            return Err(AppError::bad_params_with(
                format!("updates[{i}] is missing {field}"),
                json!({ "index": i, "field": field }),
            ));
        }
    }

    let marks: Vec<MarkEntry> = updates
        .iter()
        .filter_map(|u| u.to_entry(Uuid::new_v4().to_string(), subject_id))
        .collect();
    let now = now_rfc3339();
    let record = MarkRecord {
        id: Uuid::new_v4().to_string(),
        exam_id: exam_id.to_string(),
        session: Some(session_id.to_string()),
        marks,
        created_at: now.clone(),
        updated_at: now,
    };
    store::insert_record(conn, &record)?;
    info!(
        record_id = %record.id,
        exam_id,
        subject_id,
        entries = record.marks.len(),
        "marks created"
    );
    Ok(SaveOutcome::Created(record))
}

/// A complete score change, as the bulk and single-update paths need.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreChange {
    pub student_id: String,
    pub testscore: f64,
    pub examscore: f64,
    pub marks_obtained: f64,
    pub comment: Option<String>,
}

impl ScoreChange {
    pub fn from_update(update: &MarkUpdate) -> Result<Self, &'static str> {
        if let Some(field) = update.missing_required() {
            return Err(field);
        }
        Ok(ScoreChange {
            student_id: update.student_id.clone().unwrap_or_default(),
            testscore: update.testscore.unwrap_or_default(),
            examscore: update.examscore.unwrap_or_default(),
            marks_obtained: update.marks_obtained.unwrap_or_default(),
            comment: update.comment.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertPath {
    Updated,
    Appended,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    pub student_id: String,
    pub path: UpsertPath,
    pub record: MarkRecord,
}

/// Update the (student, subject) entry of the first matching record for the
/// exam. `None` when no record holds such an entry.
fn apply_scoped(
    conn: &Connection,
    exam_id: &str,
    subject_id: &str,
    change: &ScoreChange,
) -> AppResult<Option<MarkRecord>> {
    let Some(record) =
        store::find_by_exam_with_student_subject(conn, exam_id, &change.student_id, subject_id)?
    else {
        return Ok(None);
    };
    let Some(entry) = record.entry_for(&change.student_id, subject_id) else {
        return Ok(None);
    };

    store::set_entry_scores(
        conn,
        &record.id,
        &entry.id,
        change.testscore,
        change.examscore,
        change.marks_obtained,
        change.comment.as_deref(),
    )?;
    Ok(store::load_record(conn, &record.id)?)
}

/// Per-update read-modify-write; earlier updates stay applied if a later one
/// fails.
pub fn bulk_upsert(
    conn: &Connection,
    exam_id: &str,
    subject_id: &str,
    changes: &[ScoreChange],
) -> AppResult<Vec<BulkOutcome>> {
    let mut outcomes = Vec::with_capacity(changes.len());

    for change in changes {
        if let Some(record) = apply_scoped(conn, exam_id, subject_id, change)? {
            debug!(student_id = %change.student_id, record_id = %record.id, "bulk: scoped update");
            outcomes.push(BulkOutcome {
                student_id: change.student_id.clone(),
                path: UpsertPath::Updated,
                record,
            });
            continue;
        }

        let entry = MarkEntry {
            id: Uuid::new_v4().to_string(),
            subject_id: Some(subject_id.to_string()),
            student_id: change.student_id.clone(),
            testscore: change.testscore,
            examscore: change.examscore,
            marks_obtained: change.marks_obtained,
            comment: change.comment.clone(),
        };

        let record_id = match store::find_by_exam(conn, exam_id)? {
            Some(existing) => {
                store::append_entry(conn, &existing.id, &entry)?;
                existing.id
            }
            None => {
                // Upserted records carry no session until backfilled.
                let now = now_rfc3339();
                let created = MarkRecord {
                    id: Uuid::new_v4().to_string(),
                    exam_id: exam_id.to_string(),
                    session: None,
                    marks: vec![entry],
                    created_at: now.clone(),
                    updated_at: now,
                };
                store::insert_record(conn, &created)?;
                created.id
            }
        };

        let record = store::load_record(conn, &record_id)?
            .ok_or_else(|| AppError::Internal(format!("mark record {record_id} vanished")))?;
        debug!(student_id = %change.student_id, record_id = %record.id, "bulk: appended");
        outcomes.push(BulkOutcome {
            student_id: change.student_id.clone(),
            path: UpsertPath::Appended,
            record,
        });
    }

    info!(exam_id, subject_id, count = outcomes.len(), "bulk marks upsert");
    Ok(outcomes)
}

pub fn update_single(
    conn: &Connection,
    exam_id: &str,
    subject_id: &str,
    change: &ScoreChange,
) -> AppResult<MarkRecord> {
    match apply_scoped(conn, exam_id, subject_id, change)? {
        Some(record) => {
            info!(student_id = %change.student_id, record_id = %record.id, "mark updated");
            Ok(record)
        }
        None => Err(AppError::not_found("No matching records found")),
    }
}

pub fn by_exam_and_session(
    conn: &Connection,
    exam_name: &str,
    session_id: &str,
) -> AppResult<(String, Vec<MarkRecord>)> {
    let Some(exam_id) = directory::exam_id_by_name(conn, exam_name)? else {
        return Err(AppError::not_found("Exam not found"));
    };
    let records = store::list_by_exam_session(conn, &exam_id, session_id)?;
    if records.is_empty() {
        return Err(AppError::not_found("Marks not found"));
    }
    Ok((exam_id, records))
}

/// Report card: reportable entries of this student with exam and subject
/// resolved, first score per (exam, subject) only.
pub fn by_student(
    conn: &Connection,
    student_id: &str,
    session_id: Option<&str>,
) -> AppResult<Vec<StudentScore>> {
    let records = store::list_by_student(conn, student_id, session_id)?;

    let mut exam_names: HashMap<String, Option<String>> = HashMap::new();
    let mut subject_names: HashMap<String, Option<String>> = HashMap::new();
    let mut scores = Vec::new();

    for record in &records {
        if !exam_names.contains_key(&record.exam_id) {
            let name = directory::exam_name(conn, &record.exam_id)?;
            exam_names.insert(record.exam_id.clone(), name);
        }
        let Some(exam_name) = exam_names.get(&record.exam_id).cloned().flatten() else {
            continue;
        };

        for m in &record.marks {
            if m.student_id != student_id || !is_reportable(m) {
                continue;
            }
            let Some(subject_id) = m.subject_id.as_deref() else {
                continue;
            };
            if !subject_names.contains_key(subject_id) {
                let name = directory::subject_name(conn, subject_id)?;
                subject_names.insert(subject_id.to_string(), name);
            }
            let Some(subject_name) = subject_names.get(subject_id).cloned().flatten() else {
                continue;
            };

            scores.push(StudentScore {
                id: m.id.clone(),
                exam_id: record.exam_id.clone(),
                exam_name: exam_name.clone(),
                subject_id: subject_id.to_string(),
                subject_name,
                student_id: m.student_id.clone(),
                testscore: m.testscore,
                examscore: m.examscore,
                marks_obtained: MarksObtainedPolicy::Stored.resolve(m),
                comment: m.comment.clone().unwrap_or_default(),
            });
        }
    }

    Ok(dedup_first_per_exam_subject(scores))
}

/// Score sheet for one exam and subject. Totals are recomputed here, unlike
/// every other read path.
pub fn score_sheet(
    conn: &Connection,
    exam_id: &str,
    subject_id: &str,
) -> AppResult<Vec<ScoreSheetRow>> {
    let Some(record) = store::find_by_exam_with_subject(conn, exam_id, subject_id)? else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::with_capacity(record.marks.len());
    for m in &record.marks {
        rows.push(ScoreSheetRow {
            student_id: m.student_id.clone(),
            student_name: directory::student_display_name(conn, &m.student_id)?,
            testscore: m.testscore,
            examscore: m.examscore,
            marks_obtained: MarksObtainedPolicy::Derived.resolve(m),
            comment: m.comment.clone(),
        });
    }
    Ok(rows)
}

pub fn backfill_sessions(conn: &Connection, session_id: &str) -> AppResult<usize> {
    if store::count_without_session(conn)? == 0 {
        return Err(AppError::not_found("No marks found without session"));
    }
    let updated = store::backfill_session(conn, session_id)?;
    info!(session_id, updated, "mark sessions backfilled");
    Ok(updated)
}
