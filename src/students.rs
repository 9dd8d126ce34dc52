use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Serialize;

use crate::err::{Error, Fine, Message, Success};
use crate::models::{StudentData, StudentFields};
use crate::store::Store;
use crate::{proceeds, Payload};

#[derive(Debug, Clone, Serialize)]
pub struct CreatedStudent {
    pub id: i64,
    pub message: String,
}

pub async fn list_students(
    Extension(store): Extension<Store>,
) -> Result<Json<Vec<StudentData>>, Error> {
    Ok(Json(store.list_students().await?))
}

pub async fn create_student(
    Extension(store): Extension<Store>,
    payload: Result<Json<StudentFields>, JsonRejection>,
) -> Result<(StatusCode, Json<Success<CreatedStudent>>), Error> {
    let Json(fields) = payload?;
    let student = fields.normalize()?;
    let id = store.insert_student(&student).await?;
    log::info!("Registered student #{} ({})", id, student.name);

    Ok((
        StatusCode::CREATED,
        Json(Fine(CreatedStudent {
            id,
            message: "Student registered".to_string(),
        })),
    ))
}

pub async fn update_student(
    Extension(store): Extension<Store>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<StudentFields>, JsonRejection>,
) -> Payload<Message> {
    let Path(id) = id?;
    let Json(fields) = payload?;
    let student = fields.normalize()?;
    if store.update_student(id, &student).await? {
        log::info!("Updated student #{}", id);
    } else {
        log::debug!("Update of unknown student #{} ignored", id);
    }
    proceeds(Message::new("Student updated"))
}

pub async fn delete_student(
    Extension(store): Extension<Store>,
    id: Result<Path<i64>, PathRejection>,
) -> Payload<Message> {
    let Path(id) = id?;
    if store.delete_student(id).await? {
        log::info!("Deleted student #{}", id);
    } else {
        log::debug!("Delete of unknown student #{} ignored", id);
    }
    proceeds(Message::new("Student deleted"))
}
