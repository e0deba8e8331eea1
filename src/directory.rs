//! Read-side lookups into the user, exam and subject registries. Marks,
//! sections and subjects resolve references through here; nothing in this
//! module writes.

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

pub const ROLE_STUDENT: &str = "student";
pub const ROLE_TEACHER: &str = "teacher";
pub const ROLE_HOD: &str = "head_of_department";
pub const ROLES: [&str; 3] = [ROLE_STUDENT, ROLE_TEACHER, ROLE_HOD];

pub const TECH_GROUPS: [&str; 3] = ["tech_1", "tech_2", "tech_3"];

pub fn is_valid_id(raw: &str) -> bool {
    uuid::Uuid::parse_str(raw).is_ok()
}

pub fn is_tech_group(raw: &str) -> bool {
    TECH_GROUPS.contains(&raw)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub fullname: String,
    pub student_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub photo_url: Option<String>,
    pub role: String,
    pub trade_section: Option<String>,
    pub session: Option<String>,
    pub tech: Option<String>,
    pub created_at: String,
}

pub const USER_COLUMNS: &str = "id, username, fullname, student_name, email, phone, photo_url, \
     role, trade_section_id, session_id, tech, created_at";

pub fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        fullname: row.get(2)?,
        student_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        photo_url: row.get(6)?,
        role: row.get(7)?,
        trade_section: row.get(8)?,
        session: row.get(9)?,
        tech: row.get(10)?,
        created_at: row.get(11)?,
    })
}

pub fn user_by_id(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    conn.query_row(&sql, [id], user_from_row).optional()
}

pub fn user_by_username_and_role(
    conn: &Connection,
    username: &str,
    role: &str,
) -> rusqlite::Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ? AND role = ?");
    conn.query_row(&sql, [username, role], user_from_row)
        .optional()
}

/// Display name used on score sheets. `None` when the user is unknown or has
/// no student name on file.
pub fn student_display_name(conn: &Connection, id: &str) -> rusqlite::Result<Option<String>> {
    let name: Option<Option<String>> = conn
        .query_row("SELECT student_name FROM users WHERE id = ?", [id], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(name.flatten())
}

pub fn exam_id_by_name(conn: &Connection, name: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT id FROM exams WHERE name = ?", [name], |r| r.get(0))
        .optional()
}

pub fn exam_name(conn: &Connection, id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT name FROM exams WHERE id = ?", [id], |r| r.get(0))
        .optional()
}

pub fn subject_name(conn: &Connection, id: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT name FROM subjects WHERE id = ?", [id], |r| r.get(0))
        .optional()
}
