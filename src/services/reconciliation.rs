use chrono::NaiveDate;
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{GatewayStatus, Payment, PaymentStatus},
    repository::store::Store,
    services::paydunya::{parse_notification, GatewayReport, PaymentGateway},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The payment changed.
    Applied,
    /// Same status as already recorded; nothing to do.
    Duplicate,
    /// Older than what is recorded; ignored.
    Stale,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub outcome: ReconcileOutcome,
    pub payment: Payment,
}

/// Decides how a gateway report changes a payment. Returns the updated payment only when
/// the outcome is [`ReconcileOutcome::Applied`].
///
/// `paid` is absorbing, and reports ranked below the last recorded gateway status never
/// overwrite it, so redelivered and reordered callbacks converge on the same state.
pub fn apply_gateway_status(
    payment: &Payment,
    report: &GatewayReport,
    today: NaiveDate,
) -> (ReconcileOutcome, Option<Payment>) {
    if payment.status == PaymentStatus::Paid {
        let outcome = if report.status == GatewayStatus::Completed {
            ReconcileOutcome::Duplicate
        } else {
            ReconcileOutcome::Stale
        };
        return (outcome, None);
    }

    if let Some(previous) = payment.gateway_status {
        if report.status == previous {
            return (ReconcileOutcome::Duplicate, None);
        }
        if report.status.rank() < previous.rank() {
            return (ReconcileOutcome::Stale, None);
        }
    }

    let mut updated = payment.clone();
    updated.gateway_status = Some(report.status);
    match report.status {
        GatewayStatus::Completed => {
            updated.status = PaymentStatus::Paid;
            updated.paid_date = Some(payment.paid_date.unwrap_or(today));
            updated.gateway_transaction_id = report
                .transaction_id
                .clone()
                .or_else(|| payment.gateway_transaction_id.clone());
        }
        GatewayStatus::Pending => {
            updated.status = PaymentStatus::Processing;
            if report.transaction_id.is_some() {
                updated.gateway_transaction_id = report.transaction_id.clone();
            }
        }
        GatewayStatus::Cancelled | GatewayStatus::Failed | GatewayStatus::Expired => {
            updated.status = PaymentStatus::Unpaid;
            updated.paid_date = None;
            updated.gateway_transaction_id = None;
        }
    }
    (ReconcileOutcome::Applied, Some(updated))
}

/// Applies a report to the payment holding `report.token`, under a row lock.
pub async fn apply_report(
    store: &dyn Store,
    today: NaiveDate,
    report: &GatewayReport,
) -> AppResult<Reconciliation> {
    let mut tx = store.begin().await?;
    let payment = tx
        .lock_payment_by_token(&report.token)
        .await?
        .ok_or_else(|| AppError::NotFound("No payment matches this invoice token.".to_string()))?;

    if let Some(total_amount) = report.total_amount {
        if total_amount != payment.amount.round() && total_amount != payment.amount {
            tracing::warn!(
                payment_id = %payment.id,
                expected = %payment.amount,
                reported = %total_amount,
                "Gateway amount mismatch"
            );
            return Err(AppError::BadRequest(
                "Reported amount does not match the payment.".to_string(),
            ));
        }
    }

    let (outcome, updated) = apply_gateway_status(&payment, report, today);
    let payment = match updated {
        Some(updated) => {
            let saved = tx.update_payment(&updated).await?;
            tx.commit().await?;
            saved
        }
        None => payment,
    };

    tracing::info!(
        payment_id = %payment.id,
        gateway_status = report.status.as_str(),
        payment_status = payment.status.as_str(),
        outcome = ?outcome,
        "Gateway status reconciled"
    );
    Ok(Reconciliation { outcome, payment })
}

/// Handles a raw IPN delivery: parse, authenticate, then apply.
pub async fn reconcile_callback(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    today: NaiveDate,
    content_type: Option<&str>,
    body: &[u8],
) -> AppResult<Reconciliation> {
    let notification = parse_notification(content_type, body)?;
    if !gateway.verify_callback(&notification.hash) {
        tracing::warn!(token = %notification.report.token, "Rejected callback with bad hash");
        return Err(AppError::Unauthorized(
            "Invalid callback signature.".to_string(),
        ));
    }
    apply_report(store, today, &notification.report).await
}
