use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::{Extension, Json};

use crate::err::{Error, Message};
use crate::models::{
    parse_date, required, AttendanceKey, AttendanceRecord, NewAttendance, RollCallEntry,
    SubmitRollCall,
};
use crate::store::Store;
use crate::{proceeds, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Recorded,
    Replaced,
}

/// Records a roll-call for `(class_name, date)`.
///
/// A key with no stored rows is written directly. A key that already has rows
/// is only overwritten when `replace` is set; otherwise the call fails with
/// [`Error::AttendanceConflict`] and the stored rows stay as they were. The
/// existence check is backed by the `roll_calls` key, so two racing first
/// submissions cannot both land.
pub async fn submit(
    store: &Store,
    class_name: &str,
    date: &str,
    entries: &[RollCallEntry],
    replace: bool,
) -> Result<Submission, Error> {
    let records: Vec<NewAttendance> = entries
        .iter()
        .map(|entry| NewAttendance {
            student_id: entry.student_id,
            class_name: class_name.to_string(),
            date: date.to_string(),
            present: entry.present,
        })
        .collect();

    let exists = store.attendance_exists(class_name, date).await?;
    match (exists, replace) {
        (false, _) => {
            store.insert_attendance_batch(&records).await?;
            Ok(Submission::Recorded)
        }
        (true, false) => Err(Error::conflict(class_name, date)),
        (true, true) => {
            store.replace_attendance(class_name, date, &records).await?;
            Ok(Submission::Replaced)
        }
    }
}

pub async fn submit_roll_call(
    Extension(store): Extension<Store>,
    payload: Result<Json<SubmitRollCall>, JsonRejection>,
) -> Payload<Message> {
    let Json(payload) = payload?;
    let class_name = required(payload.class_name, "class_name")?;
    let date = required(payload.date, "date")?;
    parse_date(&date)?;
    let entries = payload
        .records
        .ok_or_else(|| Error::invalid("`records` must be an array of {student_id, present}"))?;

    let replace = payload.replace.unwrap_or(false);

    match submit(&store, &class_name, &date, &entries, replace).await {
        Ok(Submission::Recorded) => {
            log::info!(
                "Recorded attendance for class `{}` on {} ({} students)",
                class_name,
                date,
                entries.len()
            );
            proceeds(Message::new("Attendance saved"))
        }
        Ok(Submission::Replaced) => {
            log::info!(
                "Replaced attendance for class `{}` on {} ({} students)",
                class_name,
                date,
                entries.len()
            );
            proceeds(Message::new("Attendance replaced"))
        }
        Err(err @ Error::AttendanceConflict { .. }) => {
            log::warn!(
                "Rejected attendance for class `{}` on {}: already recorded",
                class_name,
                date
            );
            Err(err)
        }
        Err(err) => Err(err),
    }
}

pub async fn query_roll_call(
    Extension(store): Extension<Store>,
    key: Result<Query<AttendanceKey>, QueryRejection>,
) -> Result<Json<Vec<AttendanceRecord>>, Error> {
    let Query(key) = key?;
    let (class_name, date) = key.require()?;
    Ok(Json(store.query_attendance(&class_name, &date).await?))
}

pub async fn delete_roll_call(
    Extension(store): Extension<Store>,
    key: Result<Query<AttendanceKey>, QueryRejection>,
) -> Payload<Message> {
    let Query(key) = key?;
    let (class_name, date) = key.require()?;
    let removed = store.delete_attendance(&class_name, &date).await?;
    log::info!(
        "Deleted attendance for class `{}` on {} ({} rows)",
        class_name,
        date,
        removed
    );
    proceeds(Message::new("Attendance deleted"))
}
