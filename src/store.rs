use std::collections::BTreeSet;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::err::Error;
use crate::models::{AttendanceRecord, NewAttendance, NewStudent, RollCallLine, StudentData};
use crate::schema;

/// Handle over the registry database. Opened once at startup and shared with
/// every handler through an `Extension` layer; cloning only clones the pool.
#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if missing) the database at `url` and migrates it.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::from_pool(pool).await
    }

    /// Private in-memory database, used by the test-suite.
    pub async fn in_memory() -> Result<Self, Error> {
        Self::from_pool(Self::in_memory_pool().await?).await
    }

    /// An in-memory database lives as long as its connection, so the pool is
    /// pinned to a single connection that is never recycled.
    pub async fn in_memory_pool() -> Result<SqlitePool, Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Ok(pool)
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self, Error> {
        schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// All students, newest first.
    pub async fn list_students(&self) -> Result<Vec<StudentData>, Error> {
        let students =
            sqlx::query_as::<_, StudentData>("SELECT * FROM students ORDER BY id DESC")
                .fetch_all(&self.pool)
                .await?;
        Ok(students)
    }

    pub async fn insert_student(&self, student: &NewStudent) -> Result<i64, Error> {
        let res = sqlx::query(
            "INSERT INTO students
                (name, birth_date, class_name, phone, email, postal_code, street, number,
                 complement, neighborhood, city, state, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&student.name)
        .bind(&student.birth_date)
        .bind(&student.class_name)
        .bind(&student.phone)
        .bind(&student.email)
        .bind(&student.postal_code)
        .bind(&student.street)
        .bind(&student.number)
        .bind(&student.complement)
        .bind(&student.neighborhood)
        .bind(&student.city)
        .bind(&student.state)
        .bind(&student.status)
        .execute(&self.pool)
        .await?;

        Ok(res.last_insert_rowid())
    }

    /// Rewrites every column of student `id`. Returns whether a row matched;
    /// a missing id is not an error.
    pub async fn update_student(&self, id: i64, student: &NewStudent) -> Result<bool, Error> {
        let res = sqlx::query(
            "UPDATE students SET
                name = ?, birth_date = ?, class_name = ?, phone = ?, email = ?,
                postal_code = ?, street = ?, number = ?, complement = ?, neighborhood = ?,
                city = ?, state = ?, status = ?
             WHERE id = ?",
        )
        .bind(&student.name)
        .bind(&student.birth_date)
        .bind(&student.class_name)
        .bind(&student.phone)
        .bind(&student.email)
        .bind(&student.postal_code)
        .bind(&student.street)
        .bind(&student.number)
        .bind(&student.complement)
        .bind(&student.neighborhood)
        .bind(&student.city)
        .bind(&student.state)
        .bind(&student.status)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() >= 1)
    }

    pub async fn delete_student(&self, id: i64) -> Result<bool, Error> {
        let res = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() >= 1)
    }

    /// Inserts a whole batch in one transaction. Each distinct
    /// `(class_name, date)` in the batch claims its `roll_calls` row, so a batch
    /// for an already-recorded key fails with [`Error::AttendanceConflict`] and
    /// nothing is written.
    pub async fn insert_attendance_batch(&self, records: &[NewAttendance]) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        insert_batch(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Swaps the stored roll-call for `(class_name, date)` with `records`.
    pub async fn replace_attendance(
        &self,
        class_name: &str,
        date: &str,
        records: &[NewAttendance],
    ) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        delete_key(&mut tx, class_name, date).await?;
        insert_batch(&mut tx, records).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn query_attendance(
        &self,
        class_name: &str,
        date: &str,
    ) -> Result<Vec<AttendanceRecord>, Error> {
        let records = sqlx::query_as::<_, AttendanceRecord>(
            "SELECT id, student_id, class_name, date, present FROM attendance
             WHERE class_name = ? AND date = ?
             ORDER BY id",
        )
        .bind(class_name)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    pub async fn delete_attendance(&self, class_name: &str, date: &str) -> Result<u64, Error> {
        let mut tx = self.pool.begin().await?;
        let removed = delete_key(&mut tx, class_name, date).await?;
        tx.commit().await?;
        Ok(removed)
    }

    pub async fn attendance_exists(&self, class_name: &str, date: &str) -> Result<bool, Error> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM attendance WHERE class_name = ? AND date = ?",
        )
        .bind(class_name)
        .bind(date)
        .fetch_one(&self.pool)
        .await?;
        Ok(total > 0)
    }

    /// Attendance rows of one roll-call with the student's current name.
    /// Rows whose student was deleted keep an empty name.
    pub async fn roll_call_sheet(
        &self,
        class_name: &str,
        date: &str,
    ) -> Result<Vec<RollCallLine>, Error> {
        let lines = sqlx::query_as::<_, RollCallLine>(
            "SELECT a.student_id AS student_id, COALESCE(s.name, '') AS name, a.present AS present
             FROM attendance a
             LEFT JOIN students s ON s.id = a.student_id
             WHERE a.class_name = ? AND a.date = ?
             ORDER BY name COLLATE NOCASE, a.id",
        )
        .bind(class_name)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }
}

async fn insert_batch(
    tx: &mut Transaction<'_, Sqlite>,
    records: &[NewAttendance],
) -> Result<(), Error> {
    let keys: BTreeSet<(&str, &str)> = records
        .iter()
        .map(|r| (r.class_name.as_str(), r.date.as_str()))
        .collect();
    let recorded_at = chrono::Utc::now().to_rfc3339();

    for (class_name, date) in keys {
        sqlx::query("INSERT INTO roll_calls (class_name, date, recorded_at) VALUES (?, ?, ?)")
            .bind(class_name)
            .bind(date)
            .bind(&recorded_at)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    Error::conflict(class_name, date)
                } else {
                    Error::from(err)
                }
            })?;
    }

    for record in records {
        sqlx::query(
            "INSERT INTO attendance (student_id, class_name, date, present) VALUES (?, ?, ?, ?)",
        )
        .bind(record.student_id)
        .bind(&record.class_name)
        .bind(&record.date)
        .bind(record.present)
        .execute(&mut *tx)
        .await?;
    }
    Ok(())
}

async fn delete_key(
    tx: &mut Transaction<'_, Sqlite>,
    class_name: &str,
    date: &str,
) -> Result<u64, Error> {
    let res = sqlx::query("DELETE FROM attendance WHERE class_name = ? AND date = ?")
        .bind(class_name)
        .bind(date)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM roll_calls WHERE class_name = ? AND date = ?")
        .bind(class_name)
        .bind(date)
        .execute(&mut *tx)
        .await?;
    Ok(res.rows_affected())
}

// SQLITE_CONSTRAINT_PRIMARYKEY (1555) and SQLITE_CONSTRAINT_UNIQUE (2067)
fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("1555") | Some("2067"))
                || db.message().contains("UNIQUE constraint failed")
        }
        _ => false,
    }
}
