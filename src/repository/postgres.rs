use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{
        House, Lease, LeaseStatus, Media, NewHouse, NewLease, NewRoom, Payment, Room,
        ScheduledPayment, User,
    },
    repository::store::{LeaseFilter, PaymentFilter, Store, StoreTx},
};

const USER_COLUMNS: &str = "id, username, email, phone, role, created_at";
const HOUSE_COLUMNS: &str =
    "id, owner_id, address, city, latitude, longitude, description, created_at";
const ROOM_COLUMNS: &str = "id, house_id, title, description, size, room_type, furnished, \
     private_bathroom, monthly_price, available, created_at";
const MEDIA_COLUMNS: &str = "id, room_id, url, media_type, description, created_at";
const LEASE_COLUMNS: &str = "id, tenant_id, room_id, start_date, end_date, duration_months, \
     deposit_amount, deposit_months, payment_mode, periodicity, description, status, \
     created_at, updated_at";
const PAYMENT_COLUMNS: &str = "id, lease_id, kind, amount, due_date, paid_date, status, \
     gateway_token, gateway_transaction_id, gateway_status, description, created_at, updated_at";

const OPEN_LEASE_INDEX: &str = "leases_one_open_per_room";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn connect_lazy(config: &AppConfig) -> AppResult<Self> {
        let url = config.database_url.as_deref().ok_or_else(|| {
            AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
        })?;
        let pool = PgPoolOptions::new()
            .max_connections(config.db_pool_max_connections)
            .min_connections(config.db_pool_min_connections)
            .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
            .connect_lazy(url)
            .map_err(|error| {
                tracing::error!(error = %error, "Invalid DATABASE_URL");
                AppError::Dependency("Database is misconfigured.".to_string())
            })?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|error| {
                tracing::error!(error = %error, "Database migration failed");
                AppError::Dependency("Database migration failed.".to_string())
            })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await.map_err(map_db_error)?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found("users"))
    }

    async fn get_house(&self, house_id: Uuid) -> AppResult<House> {
        sqlx::query_as::<_, House>(&format!("SELECT {HOUSE_COLUMNS} FROM houses WHERE id = $1"))
            .bind(house_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found("houses"))
    }

    async fn get_room(&self, room_id: Uuid) -> AppResult<Room> {
        sqlx::query_as::<_, Room>(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"))
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found("rooms"))
    }

    async fn get_lease(&self, lease_id: Uuid) -> AppResult<Lease> {
        sqlx::query_as::<_, Lease>(&format!("SELECT {LEASE_COLUMNS} FROM leases WHERE id = $1"))
            .bind(lease_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found("leases"))
    }

    async fn get_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| not_found("payments"))
    }

    async fn list_media(&self, room_id: Uuid) -> AppResult<Vec<Media>> {
        sqlx::query_as::<_, Media>(&format!(
            "SELECT {MEDIA_COLUMNS} FROM media WHERE room_id = $1 ORDER BY created_at ASC"
        ))
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_error)
    }

    async fn list_leases(&self, filter: &LeaseFilter) -> AppResult<Vec<Lease>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT ");
        query
            .push(qualified(LEASE_COLUMNS, "l"))
            .push(
                " FROM leases l JOIN rooms r ON r.id = l.room_id \
                 JOIN houses h ON h.id = r.house_id WHERE 1=1",
            );
        if let Some(tenant_id) = filter.tenant_id {
            query.push(" AND l.tenant_id = ").push_bind(tenant_id);
        }
        if let Some(owner_id) = filter.owner_id {
            query.push(" AND h.owner_id = ").push_bind(owner_id);
        }
        if let Some(room_id) = filter.room_id {
            query.push(" AND l.room_id = ").push_bind(room_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND l.status = ").push_bind(status);
        }
        query
            .push(" ORDER BY l.start_date DESC, l.created_at DESC LIMIT ")
            .push_bind(filter.limit.clamp(1, 1000));

        query
            .build_query_as::<Lease>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> AppResult<Vec<Payment>> {
        let mut query = QueryBuilder::<Postgres>::new("SELECT ");
        query.push(qualified(PAYMENT_COLUMNS, "p")).push(
            " FROM payments p JOIN leases l ON l.id = p.lease_id \
             JOIN rooms r ON r.id = l.room_id JOIN houses h ON h.id = r.house_id WHERE 1=1",
        );
        if let Some(lease_id) = filter.lease_id {
            query.push(" AND p.lease_id = ").push_bind(lease_id);
        }
        if let Some(tenant_id) = filter.tenant_id {
            query.push(" AND l.tenant_id = ").push_bind(tenant_id);
        }
        if let Some(owner_id) = filter.owner_id {
            query.push(" AND h.owner_id = ").push_bind(owner_id);
        }
        if let Some(status) = filter.status {
            query.push(" AND p.status = ").push_bind(status);
        }
        query
            .push(" ORDER BY p.due_date ASC, p.kind ASC, p.created_at ASC LIMIT ")
            .push_bind(filter.limit.clamp(1, 5000));

        query
            .build_query_as::<Payment>()
            .fetch_all(&self.pool)
            .await
            .map_err(map_db_error)
    }

    async fn ping(&self) -> bool {
        match tokio::time::timeout(
            Duration::from_secs(3),
            sqlx::query("SELECT 1").fetch_one(&self.pool),
        )
        .await
        {
            Ok(Ok(_)) => true,
            Ok(Err(error)) => {
                tracing::error!(error = %error, "Health check DB query failed");
                false
            }
            Err(_) => {
                tracing::error!("Health check DB query timed out (3s)");
                false
            }
        }
    }
}

pub struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn lock_room(&mut self, room_id: Uuid) -> AppResult<Room> {
        sqlx::query_as::<_, Room>(&format!(
            "SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1 FOR UPDATE"
        ))
        .bind(room_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| not_found("rooms"))
    }

    async fn lock_lease(&mut self, lease_id: Uuid) -> AppResult<Lease> {
        sqlx::query_as::<_, Lease>(&format!(
            "SELECT {LEASE_COLUMNS} FROM leases WHERE id = $1 FOR UPDATE"
        ))
        .bind(lease_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| not_found("leases"))
    }

    async fn lock_payment(&mut self, payment_id: Uuid) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1 FOR UPDATE"
        ))
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| not_found("payments"))
    }

    async fn lock_payment_by_token(&mut self, token: &str) -> AppResult<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE gateway_token = $1 FOR UPDATE"
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn house(&mut self, house_id: Uuid) -> AppResult<House> {
        sqlx::query_as::<_, House>(&format!("SELECT {HOUSE_COLUMNS} FROM houses WHERE id = $1"))
            .bind(house_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found("houses"))
    }

    async fn lease(&mut self, lease_id: Uuid) -> AppResult<Lease> {
        sqlx::query_as::<_, Lease>(&format!("SELECT {LEASE_COLUMNS} FROM leases WHERE id = $1"))
            .bind(lease_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found("leases"))
    }

    async fn room(&mut self, room_id: Uuid) -> AppResult<Room> {
        sqlx::query_as::<_, Room>(&format!("SELECT {ROOM_COLUMNS} FROM rooms WHERE id = $1"))
            .bind(room_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_db_error)?
            .ok_or_else(|| not_found("rooms"))
    }

    async fn open_leases_for_room(&mut self, room_id: Uuid) -> AppResult<Vec<Lease>> {
        sqlx::query_as::<_, Lease>(&format!(
            "SELECT {LEASE_COLUMNS} FROM leases
             WHERE room_id = $1 AND status IN ('requested', 'active')
             ORDER BY created_at ASC"
        ))
        .bind(room_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn insert_house(&mut self, house: &NewHouse) -> AppResult<House> {
        sqlx::query_as::<_, House>(&format!(
            "INSERT INTO houses (owner_id, address, city, latitude, longitude, description)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {HOUSE_COLUMNS}"
        ))
        .bind(house.owner_id)
        .bind(&house.address)
        .bind(&house.city)
        .bind(house.latitude)
        .bind(house.longitude)
        .bind(&house.description)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn insert_room(&mut self, room: &NewRoom) -> AppResult<Room> {
        sqlx::query_as::<_, Room>(&format!(
            "INSERT INTO rooms (house_id, title, description, size, room_type, furnished,
                                private_bathroom, monthly_price, available)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE)
             RETURNING {ROOM_COLUMNS}"
        ))
        .bind(room.house_id)
        .bind(&room.title)
        .bind(&room.description)
        .bind(&room.size)
        .bind(&room.room_type)
        .bind(room.furnished)
        .bind(room.private_bathroom)
        .bind(room.monthly_price)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn insert_lease(&mut self, lease: &NewLease) -> AppResult<Lease> {
        sqlx::query_as::<_, Lease>(&format!(
            "INSERT INTO leases (tenant_id, room_id, start_date, end_date, duration_months,
                                 deposit_amount, deposit_months, payment_mode, periodicity,
                                 description, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {LEASE_COLUMNS}"
        ))
        .bind(lease.tenant_id)
        .bind(lease.room_id)
        .bind(lease.start_date)
        .bind(lease.end_date)
        .bind(lease.duration_months)
        .bind(lease.deposit_amount)
        .bind(lease.deposit_months)
        .bind(&lease.payment_mode)
        .bind(&lease.periodicity)
        .bind(&lease.description)
        .bind(LeaseStatus::Requested)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(map_db_error)
    }

    async fn insert_payments(
        &mut self,
        lease_id: Uuid,
        schedule: &[ScheduledPayment],
    ) -> AppResult<Vec<Payment>> {
        let sql = format!(
            "INSERT INTO payments (lease_id, kind, amount, due_date, status, description)
             VALUES ($1, $2, $3, $4, 'unpaid', $5)
             RETURNING {PAYMENT_COLUMNS}"
        );
        let mut created = Vec::with_capacity(schedule.len());
        for item in schedule {
            let payment = sqlx::query_as::<_, Payment>(&sql)
                .bind(lease_id)
                .bind(item.kind)
                .bind(item.amount)
                .bind(item.due_date)
                .bind(&item.description)
                .fetch_one(&mut *self.tx)
                .await
                .map_err(map_db_error)?;
            created.push(payment);
        }
        Ok(created)
    }

    async fn set_lease_status(&mut self, lease_id: Uuid, status: LeaseStatus) -> AppResult<Lease> {
        sqlx::query_as::<_, Lease>(&format!(
            "UPDATE leases SET status = $2, updated_at = now()
             WHERE id = $1
             RETURNING {LEASE_COLUMNS}"
        ))
        .bind(lease_id)
        .bind(status)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| not_found("leases"))
    }

    async fn set_room_available(&mut self, room_id: Uuid, available: bool) -> AppResult<Room> {
        sqlx::query_as::<_, Room>(&format!(
            "UPDATE rooms SET available = $2 WHERE id = $1 RETURNING {ROOM_COLUMNS}"
        ))
        .bind(room_id)
        .bind(available)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| not_found("rooms"))
    }

    async fn update_payment(&mut self, payment: &Payment) -> AppResult<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            "UPDATE payments
             SET status = $2, paid_date = $3, gateway_token = $4,
                 gateway_transaction_id = $5, gateway_status = $6, updated_at = now()
             WHERE id = $1
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment.id)
        .bind(payment.status)
        .bind(payment.paid_date)
        .bind(&payment.gateway_token)
        .bind(&payment.gateway_transaction_id)
        .bind(payment.gateway_status)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(map_db_error)?
        .ok_or_else(|| not_found("payments"))
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await.map_err(map_db_error)
    }
}

fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(str::trim)
        .filter(|column| !column.is_empty())
        .map(|column| format!("{alias}.{column}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn not_found(table_name: &str) -> AppError {
    AppError::NotFound(format!("{table_name} record not found."))
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if let Some(db_error) = error.as_database_error() {
        if db_error.code().as_deref() == Some("23505") {
            if db_error.constraint() == Some(OPEN_LEASE_INDEX) {
                return AppError::Conflict(
                    "This room already has a pending request or an active lease.".to_string(),
                );
            }
            return AppError::Conflict(
                "Duplicate value violates a unique constraint.".to_string(),
            );
        }
    }
    AppError::Dependency("Database operation failed.".to_string())
}
