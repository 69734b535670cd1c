use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use serde_json::{json, Value};

use crate::{
    access::{assert_lease_visible, scope_payments},
    auth::require_actor,
    error::{AppError, AppResult},
    models::PaymentStatus,
    repository::store::PaymentFilter,
    schemas::{clamp_limit_in_range, PaymentPath, PaymentsQuery},
    services::{
        payments::{initiate_gateway_payment, mark_paid_manually, refresh_gateway_status, summarize},
        reconciliation::reconcile_callback,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/payments", axum::routing::get(list_payments))
        .route(
            "/payments/{payment_id}/mark-paid",
            axum::routing::post(mark_paid),
        )
        .route(
            "/payments/{payment_id}/checkout",
            axum::routing::post(create_checkout),
        )
        .route(
            "/payments/{payment_id}/refresh",
            axum::routing::post(refresh_payment),
        )
        .route("/webhooks/paydunya", axum::routing::post(paydunya_webhook))
}

async fn list_payments(
    State(state): State<AppState>,
    Query(query): Query<PaymentsQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;

    if let Some(lease_id) = query.lease_id {
        let lease = state.store.get_lease(lease_id).await?;
        assert_lease_visible(state.store.as_ref(), &actor, &lease).await?;
    }

    let status = match query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        None => None,
        Some(value) => Some(PaymentStatus::parse(value).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown payment status '{value}'."))
        })?),
    };

    let mut filter = PaymentFilter {
        lease_id: query.lease_id,
        status,
        limit: clamp_limit_in_range(query.limit, 1, 5000),
        ..PaymentFilter::default()
    };
    scope_payments(&actor, &mut filter);

    let payments = state.store.list_payments(&filter).await?;
    let summary = summarize(&payments);
    Ok(Json(json!({ "data": payments, "summary": summary })))
}

async fn mark_paid(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let payment = mark_paid_manually(
        state.store.as_ref(),
        state.today(),
        &actor,
        path.payment_id,
    )
    .await?;
    Ok(Json(json!({ "data": payment })))
}

async fn create_checkout(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let checkout = initiate_gateway_payment(
        state.store.as_ref(),
        state.gateway.as_ref(),
        &state.checkout_settings(),
        &actor,
        path.payment_id,
    )
    .await?;
    Ok(Json(json!({
        "data": checkout.payment,
        "checkout_url": checkout.checkout_url,
    })))
}

async fn refresh_payment(
    State(state): State<AppState>,
    Path(path): Path<PaymentPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let actor = require_actor(&state.config, &headers)?;
    let reconciliation = refresh_gateway_status(
        state.store.as_ref(),
        state.gateway.as_ref(),
        state.checkout_settings().timeout,
        state.today(),
        &actor,
        path.payment_id,
    )
    .await?;
    Ok(Json(json!({
        "data": reconciliation.payment,
        "outcome": reconciliation.outcome,
    })))
}

/// PayDunya IPN endpoint.
///
/// Unknown tokens are acknowledged with `acknowledged: false` so the gateway stops
/// retrying. Bad hashes and malformed bodies are refused; store failures return 503 so
/// the delivery is retried against a clean state.
async fn paydunya_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    match reconcile_callback(
        state.store.as_ref(),
        state.gateway.as_ref(),
        state.today(),
        content_type,
        &body,
    )
    .await
    {
        Ok(reconciliation) => Ok(Json(json!({
            "acknowledged": true,
            "outcome": reconciliation.outcome,
            "payment_id": reconciliation.payment.id,
            "status": reconciliation.payment.status,
        }))),
        Err(AppError::NotFound(detail)) => {
            tracing::warn!(detail = %detail, "PayDunya callback for unknown invoice");
            Ok(Json(json!({ "acknowledged": false, "detail": detail })))
        }
        Err(error) => Err(error),
    }
}
