use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    access::{assert_lease_tenant, assert_lease_visible},
    auth::Actor,
    config::AppConfig,
    error::{AppError, AppResult},
    models::{Payment, PaymentStatus},
    repository::store::Store,
    services::{
        paydunya::{InvoiceMetadata, InvoiceRequest, PaymentGateway},
        reconciliation::{apply_report, Reconciliation},
    },
};

/// Where the gateway sends the tenant and its notifications, and how long we wait on it.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub callback_url: String,
    pub return_url: String,
    pub cancel_url: String,
    pub timeout: Duration,
}

impl CheckoutSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            callback_url: config.paydunya_callback_url.clone(),
            return_url: config.paydunya_return_url.clone(),
            cancel_url: config.paydunya_cancel_url.clone(),
            timeout: Duration::from_secs(config.gateway_timeout_seconds.max(1)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Checkout {
    pub payment: Payment,
    pub checkout_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub count: usize,
    pub paid_count: usize,
    pub processing_count: usize,
    pub unpaid_count: usize,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub outstanding_amount: Decimal,
}

pub fn summarize(payments: &[Payment]) -> PaymentSummary {
    let mut summary = PaymentSummary::default();
    for payment in payments {
        summary.count += 1;
        summary.total_amount += payment.amount;
        match payment.status {
            PaymentStatus::Paid => {
                summary.paid_count += 1;
                summary.paid_amount += payment.amount;
            }
            PaymentStatus::Processing => summary.processing_count += 1,
            PaymentStatus::Unpaid => summary.unpaid_count += 1,
        }
    }
    summary.outstanding_amount = summary.total_amount - summary.paid_amount;
    summary
}

pub async fn mark_paid_manually(
    store: &dyn Store,
    today: NaiveDate,
    actor: &Actor,
    payment_id: Uuid,
) -> AppResult<Payment> {
    let mut tx = store.begin().await?;
    let payment = tx.lock_payment(payment_id).await?;
    let lease = tx.lease(payment.lease_id).await?;
    assert_lease_tenant(actor, &lease)?;

    if payment.status == PaymentStatus::Paid {
        return Err(AppError::InvalidState(
            "This payment is already paid.".to_string(),
        ));
    }

    let mut updated = payment.clone();
    updated.status = PaymentStatus::Paid;
    updated.paid_date = Some(today);
    let saved = tx.update_payment(&updated).await?;
    tx.commit().await?;

    tracing::info!(
        payment_id = %saved.id,
        lease_id = %saved.lease_id,
        from = payment.status.as_str(),
        to = saved.status.as_str(),
        "Payment marked paid manually"
    );
    Ok(saved)
}

fn ensure_unpaid(payment: &Payment) -> AppResult<()> {
    match payment.status {
        PaymentStatus::Unpaid => Ok(()),
        PaymentStatus::Processing => Err(AppError::InvalidState(
            "A checkout is already in progress for this payment.".to_string(),
        )),
        PaymentStatus::Paid => Err(AppError::InvalidState(
            "This payment is already paid.".to_string(),
        )),
    }
}

/// Opens a hosted checkout for an unpaid payment.
///
/// The gateway is called outside any transaction. The payment only moves to `processing`
/// once the invoice exists, so a failed or timed out call leaves it `unpaid`.
pub async fn initiate_gateway_payment(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    settings: &CheckoutSettings,
    actor: &Actor,
    payment_id: Uuid,
) -> AppResult<Checkout> {
    let payment = store.get_payment(payment_id).await?;
    let lease = store.get_lease(payment.lease_id).await?;
    assert_lease_tenant(actor, &lease)?;
    ensure_unpaid(&payment)?;

    let request = InvoiceRequest {
        amount: payment.amount,
        description: payment
            .description
            .clone()
            .unwrap_or_else(|| format!("Payment due {}", payment.due_date)),
        metadata: InvoiceMetadata {
            payment_id: payment.id,
            lease_id: lease.id,
            tenant_id: lease.tenant_id,
        },
        callback_url: settings.callback_url.clone(),
        return_url: settings.return_url.clone(),
        cancel_url: settings.cancel_url.clone(),
    };

    let invoice = match tokio::time::timeout(settings.timeout, gateway.create_invoice(&request)).await
    {
        Ok(Ok(invoice)) => invoice,
        Ok(Err(error)) => {
            tracing::warn!(payment_id = %payment.id, error = %error, "Checkout creation failed");
            return Err(error);
        }
        Err(_) => {
            tracing::warn!(
                payment_id = %payment.id,
                timeout_seconds = settings.timeout.as_secs(),
                "Checkout creation timed out"
            );
            return Err(AppError::Gateway(
                "Payment gateway did not respond in time.".to_string(),
            ));
        }
    };

    let mut tx = store.begin().await?;
    let current = tx.lock_payment(payment.id).await?;
    if let Err(error) = ensure_unpaid(&current) {
        tracing::warn!(
            payment_id = %current.id,
            token = %invoice.token,
            "Payment changed while the invoice was created; invoice abandoned"
        );
        return Err(error);
    }

    let mut updated = current.clone();
    updated.status = PaymentStatus::Processing;
    updated.gateway_token = Some(invoice.token.clone());
    updated.gateway_transaction_id = None;
    updated.gateway_status = None;
    let saved = tx.update_payment(&updated).await?;
    tx.commit().await?;

    tracing::info!(
        payment_id = %saved.id,
        lease_id = %saved.lease_id,
        token = %invoice.token,
        "Checkout created"
    );
    Ok(Checkout {
        payment: saved,
        checkout_url: invoice.checkout_url,
    })
}

/// Pulls the invoice status from the gateway and applies it like a callback would.
pub async fn refresh_gateway_status(
    store: &dyn Store,
    gateway: &dyn PaymentGateway,
    timeout: Duration,
    today: NaiveDate,
    actor: &Actor,
    payment_id: Uuid,
) -> AppResult<Reconciliation> {
    let payment = store.get_payment(payment_id).await?;
    let lease = store.get_lease(payment.lease_id).await?;
    assert_lease_visible(store, actor, &lease).await?;

    let Some(token) = payment.gateway_token.as_deref() else {
        return Err(AppError::BadRequest(
            "This payment has no gateway checkout.".to_string(),
        ));
    };

    let mut report = tokio::time::timeout(timeout, gateway.confirm(token))
        .await
        .map_err(|_| AppError::Gateway("Payment gateway did not respond in time.".to_string()))??;
    // The stored token is authoritative for which payment is refreshed.
    report.token = token.to_string();

    apply_report(store, today, &report).await
}
