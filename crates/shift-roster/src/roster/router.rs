use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use super::domain::{NewPeriod, NewService, PeriodDetails, PeriodId, ServiceId, UserId};
use super::repository::RosterRepository;
use super::service::{RosterError, RosterService};

/// Header carrying the identity established by the authentication gate.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug, Deserialize)]
pub struct CreatePeriodRequest {
    #[serde(flatten)]
    pub period: NewPeriod,
    pub services: Vec<NewService>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingQuery {
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

/// Router builder exposing the roster over HTTP.
pub fn roster_router<R>(service: Arc<RosterService<R>>) -> Router
where
    R: RosterRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/periods",
            post(create_period_handler::<R>).get(list_periods_handler::<R>),
        )
        .route(
            "/api/v1/periods/:period_id",
            get(period_detail_handler::<R>)
                .patch(update_period_handler::<R>)
                .delete(delete_period_handler::<R>),
        )
        .route(
            "/api/v1/periods/:period_id/services",
            post(add_service_handler::<R>),
        )
        .route(
            "/api/v1/services/:service_id",
            delete(delete_service_handler::<R>),
        )
        .route(
            "/api/v1/services/:service_id/registrations",
            post(apply_handler::<R>).delete(cancel_handler::<R>),
        )
        .route(
            "/api/v1/services/:service_id/reservations",
            get(reservations_handler::<R>),
        )
        .route(
            "/api/v1/services/:service_id/capacity",
            get(capacity_handler::<R>),
        )
        .route(
            "/api/v1/services/:service_id/roster",
            get(roster_handler::<R>),
        )
        .route(
            "/api/v1/users/:user_id/registrations",
            get(user_registrations_handler::<R>),
        )
        .route("/api/v1/upcoming-services", get(upcoming_handler::<R>))
        .route("/api/v1/board", get(board_handler::<R>))
        .with_state(service)
}

type SharedRoster<R> = State<Arc<RosterService<R>>>;

pub(crate) async fn apply_handler<R>(
    State(service): SharedRoster<R>,
    Path(service_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    R: RosterRepository + 'static,
{
    let user_id = match authenticated_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.apply(ServiceId(service_id), &user_id) {
        Ok(admission) => (StatusCode::CREATED, axum::Json(admission)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_handler<R>(
    State(service): SharedRoster<R>,
    Path(service_id): Path<u64>,
    headers: HeaderMap,
) -> Response
where
    R: RosterRepository + 'static,
{
    let user_id = match authenticated_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };

    match service.cancel(ServiceId(service_id), &user_id) {
        Ok(outcome) => {
            let payload = json!({
                "cancelled": outcome.cancelled,
                "previous_status": outcome.previous_status,
                "promoted": outcome.promoted_user(),
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reservations_handler<R>(
    State(service): SharedRoster<R>,
    Path(service_id): Path<u64>,
) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.list_reservations(ServiceId(service_id)))
}

pub(crate) async fn capacity_handler<R>(
    State(service): SharedRoster<R>,
    Path(service_id): Path<u64>,
) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.capacity(ServiceId(service_id)))
}

pub(crate) async fn roster_handler<R>(
    State(service): SharedRoster<R>,
    Path(service_id): Path<u64>,
) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.service_roster(ServiceId(service_id)))
}

pub(crate) async fn delete_service_handler<R>(
    State(service): SharedRoster<R>,
    Path(service_id): Path<u64>,
) -> Response
where
    R: RosterRepository + 'static,
{
    match service.delete_service(ServiceId(service_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn create_period_handler<R>(
    State(service): SharedRoster<R>,
    axum::Json(request): axum::Json<CreatePeriodRequest>,
) -> Response
where
    R: RosterRepository + 'static,
{
    match service.create_period(request.period, request.services) {
        Ok(overview) => (StatusCode::CREATED, axum::Json(overview)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn list_periods_handler<R>(State(service): SharedRoster<R>) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.periods())
}

pub(crate) async fn period_detail_handler<R>(
    State(service): SharedRoster<R>,
    Path(period_id): Path<u64>,
) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.period_detail(PeriodId(period_id)))
}

pub(crate) async fn update_period_handler<R>(
    State(service): SharedRoster<R>,
    Path(period_id): Path<u64>,
    axum::Json(details): axum::Json<PeriodDetails>,
) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.update_period_details(PeriodId(period_id), details))
}

pub(crate) async fn delete_period_handler<R>(
    State(service): SharedRoster<R>,
    Path(period_id): Path<u64>,
) -> Response
where
    R: RosterRepository + 'static,
{
    match service.delete_period(PeriodId(period_id)) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn add_service_handler<R>(
    State(service): SharedRoster<R>,
    Path(period_id): Path<u64>,
    axum::Json(new_service): axum::Json<NewService>,
) -> Response
where
    R: RosterRepository + 'static,
{
    match service.add_service(PeriodId(period_id), new_service) {
        Ok(created) => (StatusCode::CREATED, axum::Json(created)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn user_registrations_handler<R>(
    State(service): SharedRoster<R>,
    Path(user_id): Path<String>,
) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.user_registrations(&UserId(user_id)))
}

pub(crate) async fn upcoming_handler<R>(
    State(service): SharedRoster<R>,
    Query(query): Query<UpcomingQuery>,
    headers: HeaderMap,
) -> Response
where
    R: RosterRepository + 'static,
{
    let user_id = match authenticated_user(&headers) {
        Ok(user_id) => user_id,
        Err(response) => return response,
    };
    let today = query.today.unwrap_or_else(|| Local::now().date_naive());
    respond(service.upcoming_services(&user_id, today))
}

pub(crate) async fn board_handler<R>(State(service): SharedRoster<R>) -> Response
where
    R: RosterRepository + 'static,
{
    respond(service.roster_board())
}

fn authenticated_user(headers: &HeaderMap) -> Result<UserId, Response> {
    headers
        .get(USER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| UserId(value.to_string()))
        .ok_or_else(|| {
            let payload = json!({ "error": format!("missing {USER_HEADER} header") });
            (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response()
        })
}

fn respond<T: serde::Serialize>(result: Result<T, RosterError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, axum::Json(body)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) fn error_response(err: RosterError) -> Response {
    let status = match &err {
        RosterError::AlreadyRegistered { .. }
        | RosterError::NotRegistered { .. }
        | RosterError::SlotConflict { .. } => StatusCode::CONFLICT,
        RosterError::InvalidPeriod(_) | RosterError::InvalidService(_) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RosterError::PeriodNotFound(_) | RosterError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
        RosterError::CapacityComputation(_)
        | RosterError::LedgerIntegrity(_)
        | RosterError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}
