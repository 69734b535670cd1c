use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Tenant,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Tenant => "tenant",
            Self::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "owner" | "proprietaire" => Some(Self::Owner),
            "tenant" | "locataire" => Some(Self::Tenant),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "lease_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Requested,
    Active,
    Rejected,
    Terminated,
    Completed,
}

impl LeaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Terminated => "terminated",
            Self::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "requested" => Some(Self::Requested),
            "active" => Some(Self::Active),
            "rejected" => Some(Self::Rejected),
            "terminated" => Some(Self::Terminated),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Requested and active leases claim their room.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Requested | Self::Active)
    }

    pub fn can_transition_to(self, next: LeaseStatus) -> bool {
        matches!(
            (self, next),
            (Self::Requested, Self::Active)
                | (Self::Requested, Self::Rejected)
                | (Self::Active, Self::Terminated)
                | (Self::Active, Self::Completed)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Processing,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unpaid => "unpaid",
            Self::Processing => "processing",
            Self::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unpaid" => Some(Self::Unpaid),
            "processing" => Some(Self::Processing),
            "paid" => Some(Self::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Deposit,
    Rent,
}

/// Invoice status as reported by the payment gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "gateway_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GatewayStatus {
    Pending,
    Completed,
    Cancelled,
    Failed,
    Expired,
}

impl GatewayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "failed" => Some(Self::Failed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }

    /// Callbacks ranked below the last applied status are stale.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 1,
            Self::Cancelled | Self::Failed | Self::Expired => 2,
            Self::Completed => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct House {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub address: String,
    pub city: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Room {
    pub id: Uuid,
    pub house_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub size: Option<String>,
    pub room_type: Option<String>,
    pub furnished: bool,
    pub private_bathroom: bool,
    pub monthly_price: Decimal,
    pub available: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Media {
    pub id: Uuid,
    pub room_id: Uuid,
    pub url: String,
    pub media_type: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Lease {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub room_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_months: i32,
    pub deposit_amount: Decimal,
    pub deposit_months: i32,
    pub payment_mode: String,
    pub periodicity: String,
    pub description: Option<String>,
    pub status: LeaseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub lease_id: Uuid,
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    pub status: PaymentStatus,
    pub gateway_token: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub gateway_status: Option<GatewayStatus>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHouse {
    pub owner_id: Uuid,
    pub address: String,
    pub city: Option<String>,
    pub latitude: Option<Decimal>,
    pub longitude: Option<Decimal>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub house_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub size: Option<String>,
    pub room_type: Option<String>,
    pub furnished: bool,
    pub private_bathroom: bool,
    pub monthly_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewLease {
    pub tenant_id: Uuid,
    pub room_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub duration_months: i32,
    pub deposit_amount: Decimal,
    pub deposit_months: i32,
    pub payment_mode: String,
    pub periodicity: String,
    pub description: Option<String>,
}

/// One obligation produced by the schedule generator, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledPayment {
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub description: String,
}
