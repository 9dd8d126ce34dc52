pub mod attendance;
pub mod config;
pub mod err;
pub mod models;
pub mod report;
pub mod schema;
pub mod store;
pub mod students;

use axum::handler::Handler;
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::err::{Error, Fine, Success};
use crate::store::Store;

pub type Payload<T> = Result<Json<Success<T>>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Json(Fine(value)))
}

/// Every route of the registry, with `store` injected into the handlers.
/// Cross-origin requests are allowed from anywhere, so the UI can be served
/// from a different origin.
pub fn app(store: Store) -> Router {
    Router::new()
        .route(
            "/students",
            get(students::list_students).post(students::create_student),
        )
        .route(
            "/students/:id",
            put(students::update_student).delete(students::delete_student),
        )
        .route(
            "/attendance",
            get(attendance::query_roll_call)
                .post(attendance::submit_roll_call)
                .delete(attendance::delete_roll_call),
        )
        .route("/reports/students.csv", get(report::students_report))
        .route("/reports/attendance.csv", get(report::roll_call_report))
        .fallback(err::handler404.into_service())
        .layer(Extension(store))
        .layer(CorsLayer::permissive())
}
