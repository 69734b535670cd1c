use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

fn positive_amount(value: &Decimal) -> Result<(), ValidationError> {
    if *value > Decimal::ZERO {
        return Ok(());
    }
    Err(ValidationError::new("must_be_positive"))
}

fn default_limit() -> i64 {
    200
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateHouseInput {
    #[validate(length(min = 1, max = 255))]
    pub address: String,
    #[validate(length(max = 120))]
    pub city: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateRoomInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 50))]
    pub size: Option<String>,
    #[validate(length(max = 50))]
    pub room_type: Option<String>,
    #[serde(default)]
    pub furnished: bool,
    #[serde(default)]
    pub private_bathroom: bool,
    #[validate(custom(function = "positive_amount"))]
    pub monthly_price: Decimal,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct CreateLeaseRequestInput {
    pub start_date: NaiveDate,
    #[validate(range(min = 1))]
    pub duration_months: i32,
    #[validate(range(min = 0))]
    pub deposit_months: Option<i32>,
    #[validate(length(max = 50))]
    pub payment_mode: Option<String>,
    #[validate(length(max = 50))]
    pub periodicity: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeasesQuery {
    pub status: Option<String>,
    pub room_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsQuery {
    pub status: Option<String>,
    pub lease_id: Option<Uuid>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HousePath {
    pub house_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomPath {
    pub room_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeasePath {
    pub lease_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPath {
    pub payment_id: Uuid,
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}
