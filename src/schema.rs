//! Ordered, versioned schema migrations.
//!
//! Applied versions are recorded in `schema_version`. Every step is written so
//! that running it against a database that already has its effect changes
//! nothing, which keeps databases created before versioning existed usable.

use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::err::Error;

pub struct Migration {
    pub version: i64,
    pub description: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create students table",
    },
    Migration {
        version: 2,
        description: "add contact and address columns to students",
    },
    Migration {
        version: 3,
        description: "add status column to students",
    },
    Migration {
        version: 4,
        description: "create attendance table",
    },
    Migration {
        version: 5,
        description: "create roll_calls table",
    },
];

const CONTACT_COLUMNS: &[&str] = &[
    "phone",
    "postal_code",
    "street",
    "number",
    "complement",
    "neighborhood",
    "city",
    "state",
];

/// Brings the database up to the latest version, returning how many steps ran.
pub async fn migrate(pool: &SqlitePool) -> Result<usize, Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current = current_version(pool).await?;
    let mut applied = 0;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut tx = pool.begin().await?;
        apply(&mut tx, migration.version).await?;
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(migration.version)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut tx)
            .await?;
        tx.commit().await?;

        log::info!(
            "Applied schema migration {}: {}",
            migration.version,
            migration.description
        );
        applied += 1;
    }

    Ok(applied)
}

pub async fn current_version(pool: &SqlitePool) -> Result<i64, Error> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

async fn apply(tx: &mut Transaction<'_, Sqlite>, version: i64) -> Result<(), Error> {
    match version {
        1 => {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS students (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    name       TEXT NOT NULL,
                    birth_date TEXT NOT NULL,
                    class_name TEXT NOT NULL DEFAULT '',
                    email      TEXT NOT NULL DEFAULT ''
                )",
            )
            .execute(&mut *tx)
            .await?;
        }
        2 => {
            for column in CONTACT_COLUMNS {
                add_column(tx, "students", column, "TEXT NOT NULL DEFAULT ''").await?;
            }
        }
        3 => {
            add_column(tx, "students", "status", "TEXT NOT NULL DEFAULT 'Active'").await?;
        }
        4 => {
            // student_id is advisory: deleting a student leaves its attendance rows.
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS attendance (
                    id         INTEGER PRIMARY KEY AUTOINCREMENT,
                    student_id INTEGER NOT NULL,
                    class_name TEXT NOT NULL,
                    date       TEXT NOT NULL,
                    present    INTEGER NOT NULL DEFAULT 0
                )",
            )
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_attendance_key ON attendance (class_name, date)",
            )
            .execute(&mut *tx)
            .await?;
        }
        5 => {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS roll_calls (
                    class_name  TEXT NOT NULL,
                    date        TEXT NOT NULL,
                    recorded_at TEXT NOT NULL,
                    PRIMARY KEY (class_name, date)
                )",
            )
            .execute(&mut *tx)
            .await?;
            sqlx::query(
                "INSERT OR IGNORE INTO roll_calls (class_name, date, recorded_at)
                 SELECT DISTINCT class_name, date, ? FROM attendance",
            )
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        other => {
            return Err(Error::internal(
                "MigrationError",
                format!("no migration step for version {}", other),
            ))
        }
    }
    Ok(())
}

async fn add_column(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<(), Error> {
    if has_column(tx, table, column).await? {
        return Ok(());
    }
    sqlx::query(&format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        table, column, definition
    ))
    .execute(&mut *tx)
    .await?;
    Ok(())
}

async fn has_column(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    column: &str,
) -> Result<bool, Error> {
    let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(&mut *tx)
        .await?;
    for row in rows {
        let name: String = row.try_get("name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
