use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    access::{assert_lease_visible, scope_leases},
    auth::require_actor,
    error::{AppError, AppResult},
    models::LeaseStatus,
    repository::store::{LeaseFilter, PaymentFilter},
    schemas::{
        clamp_limit_in_range, validate_input, CreateLeaseRequestInput, LeasePath, LeasesQuery,
        RoomPath,
    },
    services::{
        lease_lifecycle::{approve, complete, reject, submit_request, terminate, LeaseRequest},
        payments::summarize,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/rooms/{room_id}/lease-requests",
            axum::routing::post(create_lease_request),
        )
        .route("/leases", axum::routing::get(list_leases))
        .route("/leases/{lease_id}", axum::routing::get(get_lease))
        .route(
            "/leases/{lease_id}/approve",
            axum::routing::post(approve_lease),
        )
        .route("/leases/{lease_id}/reject", axum::routing::post(reject_lease))
        .route(
            "/leases/{lease_id}/terminate",
            axum::routing::post(terminate_lease),
        )
        .route(
            "/leases/{lease_id}/complete",
            axum::routing::post(complete_lease),
        )
}

async fn create_lease_request(
    State(state): State<AppState>,
    Path(path): Path<RoomPath>,
    headers: HeaderMap,
    Json(payload): Json<CreateLeaseRequestInput>,
) -> AppResult<impl IntoResponse> {
    let actor = require_actor(&state.config, &headers)?;
    validate_input(&payload)?;

    let lease = submit_request(
        state.store.as_ref(),
        &state.lease_policy(),
        state.today(),
        &actor,
        &LeaseRequest {
            room_id: path.room_id,
            start_date: payload.start_date,
            duration_months: payload.duration_months,
            deposit_months: payload.deposit_months,
            payment_mode: payload.payment_mode,
            periodicity: payload.periodicity,
            description: payload.description,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "data": lease }))))
}

async fn list_leases(
    State(state): State<AppState>,
    Query(query): Query<LeasesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;

    let mut filter = LeaseFilter {
        room_id: query.room_id,
        status: parse_status(query.status.as_deref())?,
        limit: clamp_limit_in_range(query.limit, 1, 1000),
        ..LeaseFilter::default()
    };
    scope_leases(&actor, &mut filter);

    let leases = state.store.list_leases(&filter).await?;
    Ok(Json(json!({ "data": leases })))
}

fn parse_status(raw: Option<&str>) -> AppResult<Option<LeaseStatus>> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(None),
        Some(value) => LeaseStatus::parse(value)
            .map(Some)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown lease status '{value}'."))),
    }
}

async fn get_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let lease = state.store.get_lease(path.lease_id).await?;
    assert_lease_visible(state.store.as_ref(), &actor, &lease).await?;

    let room = state.store.get_room(lease.room_id).await?;
    let payments = state
        .store
        .list_payments(&PaymentFilter {
            lease_id: Some(lease.id),
            limit: 5000,
            ..PaymentFilter::default()
        })
        .await?;
    let balance = summarize(&payments);

    Ok(Json(json!({
        "data": lease,
        "room": room,
        "payments": payments,
        "balance": balance,
    })))
}

async fn approve_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let approval = approve(state.store.as_ref(), &actor, path.lease_id).await?;
    Ok(Json(json!({
        "data": approval.lease,
        "room": approval.room,
        "payments": approval.payments,
    })))
}

async fn reject_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let lease = reject(state.store.as_ref(), &actor, path.lease_id).await?;
    Ok(Json(json!({ "data": lease })))
}

async fn terminate_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let closure = terminate(state.store.as_ref(), &actor, path.lease_id).await?;
    Ok(Json(json!({ "data": closure.lease, "room": closure.room })))
}

async fn complete_lease(
    State(state): State<AppState>,
    Path(path): Path<LeasePath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let closure = complete(state.store.as_ref(), &actor, path.lease_id).await?;
    Ok(Json(json!({ "data": closure.lease, "room": closure.room })))
}

#[cfg(test)]
mod tests {
    use super::parse_status;
    use crate::models::LeaseStatus;

    #[test]
    fn parses_optional_status_filter() {
        assert_eq!(parse_status(None).expect("ok"), None);
        assert_eq!(parse_status(Some("  ")).expect("ok"), None);
        assert_eq!(
            parse_status(Some("Active")).expect("ok"),
            Some(LeaseStatus::Active)
        );
        assert!(parse_status(Some("pending")).is_err());
    }
}
