use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "schoold.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // Reference columns on users/sections/subjects are plain TEXT: the
    // directory accepts ids minted elsewhere and backfills sessions later.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            fullname TEXT NOT NULL,
            student_name TEXT,
            email TEXT,
            phone TEXT,
            photo_url TEXT,
            role TEXT NOT NULL,
            trade_section_id TEXT,
            session_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    ensure_users_tech(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_role_session ON users(role, session_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_trade_section ON users(trade_section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            hod_id TEXT,
            description TEXT,
            session_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_session ON sections(session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            classname TEXT NOT NULL,
            trade_section_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_subjects_trade_section ON subjects(trade_section_id, session_id)",
        [],
    )?;

    // Mark records are exam/session aggregates; entries keep their position
    // in sort_order so whole-record saves keep the submitted order.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS mark_records(
            id TEXT PRIMARY KEY,
            exam_id TEXT NOT NULL,
            session_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    ensure_mark_records_updated_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mark_records_exam_session ON mark_records(exam_id, session_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mark_entries(
            id TEXT PRIMARY KEY,
            record_id TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            subject_id TEXT,
            student_id TEXT NOT NULL,
            testscore REAL NOT NULL,
            examscore REAL NOT NULL,
            marks_obtained REAL NOT NULL,
            comment TEXT,
            FOREIGN KEY(record_id) REFERENCES mark_records(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mark_entries_record ON mark_entries(record_id, sort_order)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mark_entries_student ON mark_entries(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_mark_entries_subject ON mark_entries(subject_id)",
        [],
    )?;

    Ok(conn)
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn ensure_users_tech(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "tech")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN tech TEXT", [])?;
    Ok(())
}

fn ensure_mark_records_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "mark_records", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE mark_records ADD COLUMN updated_at TEXT", [])?;
    // Older workspaces: treat creation as the last write.
    conn.execute(
        "UPDATE mark_records SET updated_at = created_at WHERE updated_at IS NULL",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
