use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha512};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::GatewayStatus,
};

/// Correlation data attached to an invoice and echoed back in callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceMetadata {
    pub payment_id: Uuid,
    pub lease_id: Uuid,
    pub tenant_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceRequest {
    pub amount: Decimal,
    pub description: String,
    pub metadata: InvoiceMetadata,
    pub callback_url: String,
    pub return_url: String,
    pub cancel_url: String,
}

/// A hosted checkout created by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub token: String,
    pub checkout_url: String,
}

/// Invoice state as reported by the gateway, through a callback or a confirm lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayReport {
    pub token: String,
    pub status: GatewayStatus,
    pub total_amount: Option<Decimal>,
    pub transaction_id: Option<String>,
}

/// A parsed IPN body: the delivered hash plus the report it vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayNotification {
    pub hash: String,
    pub report: GatewayReport,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_invoice(&self, request: &InvoiceRequest) -> AppResult<Invoice>;
    async fn confirm(&self, token: &str) -> AppResult<GatewayReport>;
    /// Checks the hash delivered with a callback against the shared secret.
    fn verify_callback(&self, delivered_hash: &str) -> bool;
}

pub struct PayDunyaClient {
    http: Client,
    api_base: String,
    master_key: Option<String>,
    private_key: Option<String>,
    token: Option<String>,
    store_name: String,
}

impl PayDunyaClient {
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_seconds.max(1)))
            .build()
            .map_err(|error| {
                tracing::error!(error = %error, "Could not build PayDunya HTTP client");
                AppError::Internal("Could not initialize payment gateway client.".to_string())
            })?;
        Ok(Self {
            http,
            api_base: config.paydunya_mode.api_base().to_string(),
            master_key: config.paydunya_master_key.clone(),
            private_key: config.paydunya_private_key.clone(),
            token: config.paydunya_token.clone(),
            store_name: config.paydunya_store_name.clone(),
        })
    }

    fn credentials(&self) -> AppResult<(&str, &str, &str)> {
        match (
            self.master_key.as_deref(),
            self.private_key.as_deref(),
            self.token.as_deref(),
        ) {
            (Some(master), Some(private), Some(token)) => Ok((master, private, token)),
            _ => Err(AppError::Gateway(
                "PayDunya is not configured. Set PAYDUNYA_MASTER_KEY, PAYDUNYA_PRIVATE_KEY and PAYDUNYA_TOKEN."
                    .to_string(),
            )),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> AppResult<reqwest::RequestBuilder> {
        let (master, private, token) = self.credentials()?;
        Ok(self
            .http
            .request(method, format!("{}/{path}", self.api_base))
            .header("PAYDUNYA-MASTER-KEY", master)
            .header("PAYDUNYA-PRIVATE-KEY", private)
            .header("PAYDUNYA-TOKEN", token))
    }
}

#[async_trait]
impl PaymentGateway for PayDunyaClient {
    async fn create_invoice(&self, request: &InvoiceRequest) -> AppResult<Invoice> {
        let body = invoice_body(&self.store_name, request);
        let response = self
            .request(reqwest::Method::POST, "checkout-invoice/create")?
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "PayDunya invoice request failed");
                AppError::Gateway("PayDunya invoice request failed.".to_string())
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .unwrap_or_else(|_| json!({"response_text": "failed to parse response"}));

        if status.is_success() && response_code_ok(&payload) {
            let token = str_field(&payload, "token").ok_or_else(|| {
                AppError::Gateway("PayDunya response is missing the invoice token.".to_string())
            })?;
            return Ok(Invoice {
                token,
                checkout_url: str_field(&payload, "response_text").unwrap_or_default(),
            });
        }

        let message = str_field(&payload, "response_text")
            .unwrap_or_else(|| "Unknown PayDunya error".to_string());
        tracing::warn!(http_status = %status, message = %message, "PayDunya rejected invoice");
        Err(AppError::Gateway(format!(
            "PayDunya invoice error ({status}): {message}"
        )))
    }

    async fn confirm(&self, token: &str) -> AppResult<GatewayReport> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("checkout-invoice/confirm/{token}"),
            )?
            .send()
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "PayDunya confirm request failed");
                AppError::Gateway("PayDunya confirm request failed.".to_string())
            })?;

        let status = response.status();
        let payload: Value = response.json().await.map_err(|error| {
            tracing::error!(error = %error, "PayDunya confirm response unreadable");
            AppError::Gateway("PayDunya confirm response was not JSON.".to_string())
        })?;

        if !status.is_success() || !response_code_ok(&payload) {
            let message = str_field(&payload, "response_text")
                .unwrap_or_else(|| "Unknown PayDunya error".to_string());
            return Err(AppError::Gateway(format!(
                "PayDunya confirm error ({status}): {message}"
            )));
        }

        let mut report = report_from_value(&payload)
            .map_err(|error| AppError::Gateway(format!("PayDunya confirm response: {error}")))?;
        if report.token.is_empty() {
            report.token = token.to_string();
        }
        Ok(report)
    }

    fn verify_callback(&self, delivered_hash: &str) -> bool {
        match self.master_key.as_deref() {
            Some(master_key) => verify_callback_hash(master_key, delivered_hash),
            None => {
                tracing::warn!("PAYDUNYA_MASTER_KEY is not set; rejecting callback");
                false
            }
        }
    }
}

fn invoice_body(store_name: &str, request: &InvoiceRequest) -> Value {
    // XOF has no minor unit.
    let total_amount = request.amount.round().to_i64().unwrap_or_default();
    json!({
        "invoice": {
            "total_amount": total_amount,
            "description": request.description,
        },
        "store": { "name": store_name },
        "actions": {
            "callback_url": request.callback_url,
            "return_url": request.return_url,
            "cancel_url": request.cancel_url,
        },
        "custom_data": {
            "payment_id": request.metadata.payment_id.to_string(),
            "lease_id": request.metadata.lease_id.to_string(),
            "tenant_id": request.metadata.tenant_id.to_string(),
        },
    })
}

fn response_code_ok(payload: &Value) -> bool {
    match payload.get("response_code") {
        Some(Value::String(code)) => code == "00",
        Some(Value::Number(code)) => code.as_i64() == Some(0),
        _ => false,
    }
}

/// Lowercase hex SHA-512 of the master key; PayDunya signs every IPN with it.
pub fn callback_hash(master_key: &str) -> String {
    let digest = Sha512::digest(master_key.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

pub fn verify_callback_hash(master_key: &str, delivered_hash: &str) -> bool {
    let expected = callback_hash(master_key);
    let delivered = delivered_hash.trim().to_ascii_lowercase();
    expected.as_bytes().ct_eq(delivered.as_bytes()).into()
}

/// Parses an IPN body. PayDunya posts `application/x-www-form-urlencoded` with bracketed
/// keys (`data[invoice][token]`); JSON bodies with or without the `data` envelope are
/// accepted too.
pub fn parse_notification(content_type: Option<&str>, body: &[u8]) -> AppResult<GatewayNotification> {
    let is_json = content_type
        .map(|value| value.to_ascii_lowercase().contains("json"))
        .unwrap_or(false)
        || body
            .iter()
            .find(|byte| !byte.is_ascii_whitespace())
            .is_some_and(|byte| *byte == b'{');

    let root = if is_json {
        serde_json::from_slice::<Value>(body)
            .map_err(|_| AppError::BadRequest("Callback body is not valid JSON.".to_string()))?
    } else {
        unflatten_form(body)
    };

    let envelope = root.get("data").filter(|value| value.is_object()).unwrap_or(&root);
    let hash = str_field(envelope, "hash")
        .ok_or_else(|| AppError::BadRequest("Callback is missing its hash.".to_string()))?;
    let report = report_from_value(envelope).map_err(AppError::BadRequest)?;
    if report.token.is_empty() {
        return Err(AppError::BadRequest(
            "Callback is missing the invoice token.".to_string(),
        ));
    }

    Ok(GatewayNotification { hash, report })
}

fn report_from_value(envelope: &Value) -> Result<GatewayReport, String> {
    let invoice = envelope.get("invoice");
    let raw_status = str_field(envelope, "status")
        .or_else(|| invoice.and_then(|invoice| str_field(invoice, "status")))
        .ok_or_else(|| "missing status".to_string())?;
    let status = GatewayStatus::parse(&raw_status)
        .ok_or_else(|| format!("unknown gateway status '{raw_status}'"))?;

    let token = invoice
        .and_then(|invoice| str_field(invoice, "token"))
        .or_else(|| str_field(envelope, "token"))
        .unwrap_or_default();

    let total_amount = match invoice.and_then(|invoice| invoice.get("total_amount")) {
        None | Some(Value::Null) => None,
        Some(value) => Some(decimal_value(value).ok_or_else(|| "invalid total_amount".to_string())?),
    };

    let transaction_id = str_field(envelope, "transaction_id")
        .or_else(|| str_field(envelope, "receipt_identifier"))
        .or_else(|| invoice.and_then(|invoice| str_field(invoice, "receipt_identifier")));

    Ok(GatewayReport {
        token,
        status,
        total_amount,
        transaction_id,
    })
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(text) => Decimal::from_str(text.trim()).ok(),
        Value::Number(number) => Decimal::from_str(&number.to_string()).ok(),
        _ => None,
    }
}

fn unflatten_form(body: &[u8]) -> Value {
    let mut root = Map::new();
    for (key, value) in url::form_urlencoded::parse(body) {
        let path = split_form_key(&key);
        insert_path(&mut root, &path, value.into_owned());
    }
    Value::Object(root)
}

fn split_form_key(key: &str) -> Vec<String> {
    let (head, rest) = match key.find('[') {
        Some(index) => (&key[..index], &key[index..]),
        None => (key, ""),
    };
    let mut parts = vec![head.to_string()];
    parts.extend(
        rest.split('[')
            .skip(1)
            .map(|segment| segment.trim_end_matches(']').to_string()),
    );
    parts
}

fn insert_path(map: &mut Map<String, Value>, path: &[String], value: String) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert(first.clone(), Value::String(value));
        return;
    }
    let entry = map
        .entry(first.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(child) = entry {
        insert_path(child, rest, value);
    }
}
