use crate::db::now_rfc3339;
use crate::marks::{MarkEntry, MarkRecord};
use rusqlite::{params, Connection, OptionalExtension};

fn load_entries(conn: &Connection, record_id: &str) -> rusqlite::Result<Vec<MarkEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, subject_id, student_id, testscore, examscore, marks_obtained, comment
         FROM mark_entries
         WHERE record_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt.query_map([record_id], |row| {
        Ok(MarkEntry {
            id: row.get(0)?,
            subject_id: row.get(1)?,
            student_id: row.get(2)?,
            testscore: row.get(3)?,
            examscore: row.get(4)?,
            marks_obtained: row.get(5)?,
            comment: row.get(6)?,
        })
    })?;
    rows.collect()
}

pub fn load_record(conn: &Connection, record_id: &str) -> rusqlite::Result<Option<MarkRecord>> {
    let header: Option<(String, String, Option<String>, String, Option<String>)> = conn
        .query_row(
            "SELECT id, exam_id, session_id, created_at, updated_at
             FROM mark_records
             WHERE id = ?",
            [record_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)),
        )
        .optional()?;

    let Some((id, exam_id, session, created_at, updated_at)) = header else {
        return Ok(None);
    };
    let marks = load_entries(conn, &id)?;
    Ok(Some(MarkRecord {
        updated_at: updated_at.unwrap_or_else(|| created_at.clone()),
        id,
        exam_id,
        session,
        marks,
        created_at,
    }))
}

fn load_records(conn: &Connection, ids: Vec<String>) -> rusqlite::Result<Vec<MarkRecord>> {
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(r) = load_record(conn, &id)? {
            out.push(r);
        }
    }
    Ok(out)
}

fn first_id<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(sql, params, |r| r.get(0)).optional()
}

fn all_ids<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |r| r.get::<_, String>(0))?;
    rows.collect()
}

/// Save path scope: exam + session, holding an entry for the subject.
pub fn find_by_exam_subject_session(
    conn: &Connection,
    exam_id: &str,
    subject_id: &str,
    session_id: &str,
) -> rusqlite::Result<Option<MarkRecord>> {
    let id = first_id(
        conn,
        "SELECT r.id FROM mark_records r
         WHERE r.exam_id = ?1
           AND r.session_id = ?2
           AND EXISTS (
             SELECT 1 FROM mark_entries e
             WHERE e.record_id = r.id AND e.subject_id = ?3
           )
         ORDER BY r.rowid
         LIMIT 1",
        params![exam_id, session_id, subject_id],
    )?;
    match id {
        Some(id) => load_record(conn, &id),
        None => Ok(None),
    }
}

/// Scoped-update match: exam, with one entry for this student and subject.
pub fn find_by_exam_with_student_subject(
    conn: &Connection,
    exam_id: &str,
    student_id: &str,
    subject_id: &str,
) -> rusqlite::Result<Option<MarkRecord>> {
    let id = first_id(
        conn,
        "SELECT r.id FROM mark_records r
         WHERE r.exam_id = ?1
           AND EXISTS (
             SELECT 1 FROM mark_entries e
             WHERE e.record_id = r.id AND e.student_id = ?2 AND e.subject_id = ?3
           )
         ORDER BY r.rowid
         LIMIT 1",
        params![exam_id, student_id, subject_id],
    )?;
    match id {
        Some(id) => load_record(conn, &id),
        None => Ok(None),
    }
}

/// Score-sheet scope: exam, with any entry for the subject.
pub fn find_by_exam_with_subject(
    conn: &Connection,
    exam_id: &str,
    subject_id: &str,
) -> rusqlite::Result<Option<MarkRecord>> {
    let id = first_id(
        conn,
        "SELECT r.id FROM mark_records r
         WHERE r.exam_id = ?1
           AND EXISTS (
             SELECT 1 FROM mark_entries e
             WHERE e.record_id = r.id AND e.subject_id = ?2
           )
         ORDER BY r.rowid
         LIMIT 1",
        params![exam_id, subject_id],
    )?;
    match id {
        Some(id) => load_record(conn, &id),
        None => Ok(None),
    }
}

/// Fallback scope: exam alone.
pub fn find_by_exam(conn: &Connection, exam_id: &str) -> rusqlite::Result<Option<MarkRecord>> {
    let id = first_id(
        conn,
        "SELECT id FROM mark_records WHERE exam_id = ? ORDER BY rowid LIMIT 1",
        [exam_id],
    )?;
    match id {
        Some(id) => load_record(conn, &id),
        None => Ok(None),
    }
}

pub fn list_by_exam_session(
    conn: &Connection,
    exam_id: &str,
    session_id: &str,
) -> rusqlite::Result<Vec<MarkRecord>> {
    let ids = all_ids(
        conn,
        "SELECT id FROM mark_records WHERE exam_id = ? AND session_id = ? ORDER BY rowid",
        [exam_id, session_id],
    )?;
    load_records(conn, ids)
}

pub fn list_by_student(
    conn: &Connection,
    student_id: &str,
    session_id: Option<&str>,
) -> rusqlite::Result<Vec<MarkRecord>> {
    let ids = match session_id {
        Some(session_id) => all_ids(
            conn,
            "SELECT r.id FROM mark_records r
             WHERE r.session_id = ?2
               AND EXISTS (
                 SELECT 1 FROM mark_entries e
                 WHERE e.record_id = r.id AND e.student_id = ?1
               )
             ORDER BY r.rowid",
            params![student_id, session_id],
        )?,
        None => all_ids(
            conn,
            "SELECT r.id FROM mark_records r
             WHERE EXISTS (
               SELECT 1 FROM mark_entries e
               WHERE e.record_id = r.id AND e.student_id = ?1
             )
             ORDER BY r.rowid",
            params![student_id],
        )?,
    };
    load_records(conn, ids)
}

fn insert_entry(
    conn: &Connection,
    record_id: &str,
    sort_order: i64,
    entry: &MarkEntry,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO mark_entries(
           id, record_id, sort_order, subject_id, student_id,
           testscore, examscore, marks_obtained, comment
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            entry.id,
            record_id,
            sort_order,
            entry.subject_id,
            entry.student_id,
            entry.testscore,
            entry.examscore,
            entry.marks_obtained,
            entry.comment,
        ],
    )?;
    Ok(())
}

pub fn insert_record(conn: &Connection, record: &MarkRecord) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO mark_records(id, exam_id, session_id, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?)",
        params![
            record.id,
            record.exam_id,
            record.session,
            record.created_at,
            record.updated_at
        ],
    )?;
    for (i, entry) in record.marks.iter().enumerate() {
        insert_entry(&tx, &record.id, i as i64, entry)?;
    }
    tx.commit()
}

/// Whole-record save: header plus the full entry list, in one transaction.
pub fn save_record(conn: &Connection, record: &mut MarkRecord) -> rusqlite::Result<()> {
    record.updated_at = now_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE mark_records SET exam_id = ?, session_id = ?, updated_at = ? WHERE id = ?",
        params![record.exam_id, record.session, record.updated_at, record.id],
    )?;
    tx.execute("DELETE FROM mark_entries WHERE record_id = ?", [&record.id])?;
    for (i, entry) in record.marks.iter().enumerate() {
        insert_entry(&tx, &record.id, i as i64, entry)?;
    }
    tx.commit()
}

/// Field-set update of one entry; `comment: None` leaves the stored comment.
pub fn set_entry_scores(
    conn: &Connection,
    record_id: &str,
    entry_id: &str,
    testscore: f64,
    examscore: f64,
    marks_obtained: f64,
    comment: Option<&str>,
) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE mark_entries
         SET testscore = ?, examscore = ?, marks_obtained = ?, comment = COALESCE(?, comment)
         WHERE id = ? AND record_id = ?",
        params![
            testscore,
            examscore,
            marks_obtained,
            comment,
            entry_id,
            record_id
        ],
    )?;
    tx.execute(
        "UPDATE mark_records SET updated_at = ? WHERE id = ?",
        params![now_rfc3339(), record_id],
    )?;
    tx.commit()
}

pub fn append_entry(conn: &Connection, record_id: &str, entry: &MarkEntry) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    let next: i64 = tx.query_row(
        "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM mark_entries WHERE record_id = ?",
        [record_id],
        |r| r.get(0),
    )?;
    insert_entry(&tx, record_id, next, entry)?;
    tx.execute(
        "UPDATE mark_records SET updated_at = ? WHERE id = ?",
        params![now_rfc3339(), record_id],
    )?;
    tx.commit()
}

pub fn count_without_session(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM mark_records WHERE session_id IS NULL",
        [],
        |r| r.get(0),
    )
}

pub fn backfill_session(conn: &Connection, session_id: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE mark_records SET session_id = ?, updated_at = ? WHERE session_id IS NULL",
        params![session_id, now_rfc3339()],
    )
}
