use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::curriculum::{CourseCurriculum, LessonSummary, QuizSummary};

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("courseloft.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workspace_settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS brands(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    // Workspaces created before white-label theming lack the color columns.
    ensure_brands_theme_columns(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            brand_id TEXT,
            email TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            role TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(brand_id) REFERENCES brands(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_users_brand ON users(brand_id)",
        [],
    )?;
    ensure_users_invite_expiry(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lessons(
            id TEXT PRIMARY KEY,
            brand_id TEXT NOT NULL,
            title TEXT NOT NULL,
            summary TEXT NOT NULL DEFAULT '',
            free_preview INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(brand_id) REFERENCES brands(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lessons_brand ON lessons(brand_id)",
        [],
    )?;
    ensure_lessons_duration_minutes(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS quizzes(
            id TEXT PRIMARY KEY,
            brand_id TEXT NOT NULL,
            title TEXT NOT NULL,
            questions_json TEXT NOT NULL DEFAULT '[]',
            pass_percent INTEGER NOT NULL DEFAULT 70,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(brand_id) REFERENCES brands(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_quizzes_brand ON quizzes(brand_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            brand_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            curriculum_json TEXT NOT NULL DEFAULT '[]',
            module_names_json TEXT NOT NULL DEFAULT '[]',
            module_assignments_json TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY(brand_id) REFERENCES brands(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_brand ON courses(brand_id)",
        [],
    )?;
    ensure_courses_status(&conn)?;

    Ok(conn)
}

fn ensure_brands_theme_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "brands", "primary_color")? {
        conn.execute("ALTER TABLE brands ADD COLUMN primary_color TEXT", [])?;
    }
    if !table_has_column(conn, "brands", "accent_color")? {
        conn.execute("ALTER TABLE brands ADD COLUMN accent_color TEXT", [])?;
    }
    Ok(())
}

// Invite expiry tracking arrived after the first workspaces shipped.
fn ensure_users_invite_expiry(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "invite_expires_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE users ADD COLUMN invite_expires_at TEXT", [])?;
    Ok(())
}

fn ensure_lessons_duration_minutes(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "lessons", "duration_minutes")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE lessons ADD COLUMN duration_minutes INTEGER", [])?;
    Ok(())
}

fn ensure_courses_status(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "status")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE courses ADD COLUMN status TEXT NOT NULL DEFAULT 'draft'",
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

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw = conn
        .query_row(
            "SELECT value_json FROM workspace_settings WHERE key = ?",
            [key],
            |r| r.get::<_, String>(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO workspace_settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        params![key, serde_json::to_string(value)?],
    )?;
    Ok(())
}

// Load a course's stored curriculum triple. Absent or malformed columns read
// as empty so a half-written historical row still opens.
pub fn load_course_curriculum(
    conn: &Connection,
    brand_id: &str,
    course_id: &str,
) -> anyhow::Result<Option<CourseCurriculum>> {
    let row = conn
        .query_row(
            "SELECT curriculum_json, module_names_json, module_assignments_json
             FROM courses WHERE id = ? AND brand_id = ?",
            params![course_id, brand_id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    Ok(row.map(|(order_raw, names_raw, assignments_raw)| CourseCurriculum {
        curriculum_order: serde_json::from_str(&order_raw).unwrap_or_default(),
        module_names: serde_json::from_str(&names_raw).unwrap_or_default(),
        module_assignments: serde_json::from_str(&assignments_raw).unwrap_or_default(),
    }))
}

// Item mutations touch the flat order and the assignment map; module names
// are left alone. Returns false when the course row is gone.
pub fn update_course_items(
    conn: &Connection,
    brand_id: &str,
    course_id: &str,
    state: &CourseCurriculum,
    ts: &str,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE courses
         SET curriculum_json = ?, module_assignments_json = ?, updated_at = ?
         WHERE id = ? AND brand_id = ?",
        params![
            serde_json::to_string(&state.curriculum_order)?,
            serde_json::to_string(&state.module_assignments)?,
            ts,
            course_id,
            brand_id
        ],
    )?;
    Ok(n > 0)
}

// Module mutations write names and assignments in one statement so a rename
// can never leave the two halves disagreeing.
pub fn update_course_modules(
    conn: &Connection,
    brand_id: &str,
    course_id: &str,
    state: &CourseCurriculum,
    ts: &str,
) -> anyhow::Result<bool> {
    let n = conn.execute(
        "UPDATE courses
         SET module_names_json = ?, module_assignments_json = ?, updated_at = ?
         WHERE id = ? AND brand_id = ?",
        params![
            serde_json::to_string(&state.module_names)?,
            serde_json::to_string(&state.module_assignments)?,
            ts,
            course_id,
            brand_id
        ],
    )?;
    Ok(n > 0)
}

pub fn lesson_summaries(conn: &Connection, brand_id: &str) -> anyhow::Result<Vec<LessonSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, free_preview FROM lessons WHERE brand_id = ? ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([brand_id], |r| {
            Ok(LessonSummary {
                id: r.get(0)?,
                title: r.get(1)?,
                free_preview: r.get::<_, i64>(2)? != 0,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn quiz_summaries(conn: &Connection, brand_id: &str) -> anyhow::Result<Vec<QuizSummary>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, questions_json FROM quizzes WHERE brand_id = ? ORDER BY created_at, id",
    )?;
    let rows = stmt
        .query_map([brand_id], |r| {
            let questions_raw: String = r.get(2)?;
            Ok(QuizSummary {
                id: r.get(0)?,
                title: r.get(1)?,
                question_count: serde_json::from_str::<serde_json::Value>(&questions_raw)
                    .ok()
                    .and_then(|v| v.as_array().map(|a| a.len() as i64))
                    .unwrap_or(0),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
