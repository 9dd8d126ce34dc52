//! CSV exports of the student table and of a single roll-call.

use std::collections::BTreeMap;

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::{Local, NaiveDate};
use csv::Writer;
use serde::Deserialize;

use crate::err::Error;
use crate::models::{AttendanceKey, RollCallLine, StudentData, NO_CLASS};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StudentFilter {
    pub class_name: Option<String>,
    pub search: Option<String>,
}

impl StudentFilter {
    pub fn matches(&self, student: &StudentData) -> bool {
        let class_ok = match self.class_name.as_deref() {
            Some(class_name) if !class_name.is_empty() => student.class_name == class_name,
            _ => true,
        };
        let name_ok = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => student
                .name
                .to_lowercase()
                .contains(&term.to_lowercase()),
            _ => true,
        };
        class_ok && name_ok
    }
}

/// Buckets students by class, classes in ascending order, the unassigned
/// bucket last. Order inside a bucket is preserved.
pub fn group_by_class(students: Vec<StudentData>) -> Vec<(String, Vec<StudentData>)> {
    let mut classes: BTreeMap<String, Vec<StudentData>> = BTreeMap::new();
    let mut unassigned = Vec::new();
    for student in students {
        if student.class_name.trim().is_empty() {
            unassigned.push(student);
        } else {
            classes
                .entry(student.class_name.clone())
                .or_default()
                .push(student);
        }
    }

    let mut groups: Vec<_> = classes.into_iter().collect();
    if !unassigned.is_empty() {
        groups.push((NO_CLASS.to_string(), unassigned));
    }
    groups
}

pub fn write_students_csv(
    groups: &[(String, Vec<StudentData>)],
    today: NaiveDate,
) -> Result<Vec<u8>, Error> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record([
        "class", "name", "birth_date", "age", "status", "phone", "email", "address",
    ])?;

    for (class_name, students) in groups {
        for student in students {
            let age = student
                .age_on(today)
                .map(|age| age.to_string())
                .unwrap_or_default();
            wtr.write_record([
                class_name.as_str(),
                student.name.as_str(),
                student.birth_date.as_str(),
                age.as_str(),
                student.status.as_str(),
                student.phone.as_str(),
                student.email.as_str(),
                student.address_line().as_str(),
            ])?;
        }
    }

    into_bytes(wtr)
}

pub fn write_roll_call_csv(lines: &[RollCallLine]) -> Result<Vec<u8>, Error> {
    let mut wtr = Writer::from_writer(Vec::new());
    wtr.write_record(["student_id", "name", "present"])?;
    for line in lines {
        wtr.write_record(&[
            line.student_id.to_string(),
            line.name.clone(),
            if line.present { "yes" } else { "no" }.to_string(),
        ])?;
    }
    into_bytes(wtr)
}

fn into_bytes(wtr: Writer<Vec<u8>>) -> Result<Vec<u8>, Error> {
    wtr.into_inner()
        .map_err(|err| Error::internal("ReportError", err.to_string()))
}

fn csv_response(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

pub async fn students_report(
    Extension(store): Extension<Store>,
    filter: Result<Query<StudentFilter>, QueryRejection>,
) -> Result<Response, Error> {
    let Query(filter) = filter?;
    let students: Vec<StudentData> = store
        .list_students()
        .await?
        .into_iter()
        .filter(|student| filter.matches(student))
        .collect();

    let body = write_students_csv(&group_by_class(students), Local::now().date_naive())?;
    let filename = match filter.class_name.as_deref() {
        Some(class_name) if !class_name.is_empty() => {
            format!("students_{}.csv", class_name.split_whitespace().collect::<Vec<_>>().join("_"))
        }
        _ => "students_all_classes.csv".to_string(),
    };
    Ok(csv_response(&filename, body))
}

pub async fn roll_call_report(
    Extension(store): Extension<Store>,
    key: Result<Query<AttendanceKey>, QueryRejection>,
) -> Result<Response, Error> {
    let Query(key) = key?;
    let (class_name, date) = key.require()?;
    let lines = store.roll_call_sheet(&class_name, &date).await?;
    let body = write_roll_call_csv(&lines)?;
    let filename = format!(
        "attendance_{}_{}.csv",
        class_name.split_whitespace().collect::<Vec<_>>().join("_"),
        date
    );
    Ok(csv_response(&filename, body))
}
