use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    access::{assert_house_owner, require_role, unknown_user},
    auth::Actor,
    config::AppConfig,
    error::{AppError, AppResult},
    models::{Lease, LeaseStatus, NewLease, Payment, Role, Room},
    repository::store::{Store, StoreTx},
    services::lease_schedule::{add_months, generate_schedule, ScheduleTerms},
};

/// Deposit and duration rules applied to new lease requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeasePolicy {
    pub default_deposit_months: u32,
    pub max_deposit_months: u32,
    pub max_duration_months: u32,
}

impl LeasePolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_deposit_months: config.effective_default_deposit_months(),
            max_deposit_months: config.max_deposit_months,
            max_duration_months: config.max_lease_duration_months,
        }
    }

    /// Each month becomes a payment row on approval, so the duration is capped.
    fn duration_months(&self, requested: i32) -> AppResult<u32> {
        match u32::try_from(requested) {
            Ok(months) if (1..=self.max_duration_months).contains(&months) => Ok(months),
            _ => Err(AppError::BadRequest(format!(
                "duration_months must be between 1 and {}.",
                self.max_duration_months
            ))),
        }
    }

    fn deposit_months(&self, requested: Option<i32>) -> AppResult<u32> {
        let Some(requested) = requested else {
            return Ok(self.default_deposit_months);
        };
        match u32::try_from(requested) {
            Ok(months) if months <= self.max_deposit_months => Ok(months),
            _ => Err(AppError::BadRequest(format!(
                "deposit_months must be between 0 and {}.",
                self.max_deposit_months
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeaseRequest {
    pub room_id: Uuid,
    pub start_date: NaiveDate,
    pub duration_months: i32,
    pub deposit_months: Option<i32>,
    pub payment_mode: Option<String>,
    pub periodicity: Option<String>,
    pub description: Option<String>,
}

/// Everything written by an approval.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub lease: Lease,
    pub room: Room,
    pub payments: Vec<Payment>,
}

/// Lease and room after the lease left the active state.
#[derive(Debug, Clone, Serialize)]
pub struct Closure {
    pub lease: Lease,
    pub room: Room,
}

pub async fn submit_request(
    store: &dyn Store,
    policy: &LeasePolicy,
    today: NaiveDate,
    actor: &Actor,
    request: &LeaseRequest,
) -> AppResult<Lease> {
    require_role(actor, &[Role::Tenant])?;

    let duration_months = policy.duration_months(request.duration_months)?;
    if request.start_date < today {
        return Err(AppError::BadRequest(
            "start_date cannot be in the past.".to_string(),
        ));
    }
    let deposit_months = policy.deposit_months(request.deposit_months)?;
    let tenant = store.get_user(actor.id).await.map_err(unknown_user)?;
    let end_date = add_months(request.start_date, duration_months)?;

    let mut tx = store.begin().await?;
    let room = tx.lock_room(request.room_id).await?;
    ensure_room_unclaimed(tx.as_mut(), room.id).await?;

    let lease = tx
        .insert_lease(&NewLease {
            tenant_id: tenant.id,
            room_id: room.id,
            start_date: request.start_date,
            end_date,
            duration_months: request.duration_months,
            deposit_amount: room.monthly_price * Decimal::from(deposit_months),
            deposit_months: i32::try_from(deposit_months).unwrap_or_default(),
            payment_mode: non_empty_or(request.payment_mode.as_deref(), "mobile_money"),
            periodicity: non_empty_or(request.periodicity.as_deref(), "monthly"),
            description: request.description.clone(),
        })
        .await?;
    tx.commit().await?;

    tracing::info!(
        lease_id = %lease.id,
        room_id = %room.id,
        tenant_id = %actor.id,
        start_date = %lease.start_date,
        duration_months = lease.duration_months,
        "Lease requested"
    );
    Ok(lease)
}

async fn ensure_room_unclaimed(tx: &mut dyn StoreTx, room_id: Uuid) -> AppResult<()> {
    if tx.open_leases_for_room(room_id).await?.is_empty() {
        return Ok(());
    }
    Err(AppError::Conflict(
        "This room already has a pending request or an active lease.".to_string(),
    ))
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// Locks the lease's room, then the lease, and checks that `actor` owns the room.
async fn lock_owned_lease(
    tx: &mut dyn StoreTx,
    actor: &Actor,
    lease_id: Uuid,
) -> AppResult<(Room, Lease)> {
    let room_id = tx.lease(lease_id).await?.room_id;
    let room = tx.lock_room(room_id).await?;
    let lease = tx.lock_lease(lease_id).await?;
    let house = tx.house(room.house_id).await?;
    assert_house_owner(actor, &house)?;
    Ok((room, lease))
}

fn ensure_transition(lease: &Lease, next: LeaseStatus) -> AppResult<()> {
    if lease.status.can_transition_to(next) {
        return Ok(());
    }
    Err(AppError::InvalidState(format!(
        "Cannot move a {} lease to {}.",
        lease.status.as_str(),
        next.as_str()
    )))
}

pub async fn approve(store: &dyn Store, actor: &Actor, lease_id: Uuid) -> AppResult<Approval> {
    let mut tx = store.begin().await?;
    let (room, lease) = lock_owned_lease(tx.as_mut(), actor, lease_id).await?;
    ensure_transition(&lease, LeaseStatus::Active)?;

    let occupied = tx
        .open_leases_for_room(room.id)
        .await?
        .iter()
        .any(|other| other.id != lease.id && other.status == LeaseStatus::Active);
    if occupied {
        return Err(AppError::Conflict(
            "This room already has an active lease.".to_string(),
        ));
    }

    let lease = tx.set_lease_status(lease.id, LeaseStatus::Active).await?;
    let schedule = generate_schedule(&ScheduleTerms::for_lease(&lease, &room))?;
    let payments = tx.insert_payments(lease.id, &schedule).await?;
    let room = tx.set_room_available(room.id, false).await?;
    tx.commit().await?;

    tracing::info!(
        lease_id = %lease.id,
        room_id = %room.id,
        from = LeaseStatus::Requested.as_str(),
        to = LeaseStatus::Active.as_str(),
        payments = payments.len(),
        "Lease approved"
    );
    Ok(Approval {
        lease,
        room,
        payments,
    })
}

pub async fn reject(store: &dyn Store, actor: &Actor, lease_id: Uuid) -> AppResult<Lease> {
    let mut tx = store.begin().await?;
    let (room, lease) = lock_owned_lease(tx.as_mut(), actor, lease_id).await?;
    ensure_transition(&lease, LeaseStatus::Rejected)?;

    let lease = tx.set_lease_status(lease.id, LeaseStatus::Rejected).await?;
    tx.commit().await?;

    tracing::info!(
        lease_id = %lease.id,
        room_id = %room.id,
        from = LeaseStatus::Requested.as_str(),
        to = LeaseStatus::Rejected.as_str(),
        "Lease rejected"
    );
    Ok(lease)
}

pub async fn terminate(store: &dyn Store, actor: &Actor, lease_id: Uuid) -> AppResult<Closure> {
    close_active(store, actor, lease_id, LeaseStatus::Terminated).await
}

pub async fn complete(store: &dyn Store, actor: &Actor, lease_id: Uuid) -> AppResult<Closure> {
    close_active(store, actor, lease_id, LeaseStatus::Completed).await
}

async fn close_active(
    store: &dyn Store,
    actor: &Actor,
    lease_id: Uuid,
    next: LeaseStatus,
) -> AppResult<Closure> {
    let mut tx = store.begin().await?;
    let (room, lease) = lock_owned_lease(tx.as_mut(), actor, lease_id).await?;
    ensure_transition(&lease, next)?;

    let lease = tx.set_lease_status(lease.id, next).await?;
    // The room frees up only when no other lease still claims it.
    let still_claimed = tx
        .open_leases_for_room(room.id)
        .await?
        .iter()
        .any(|other| other.id != lease.id);
    let room = tx.set_room_available(room.id, !still_claimed).await?;
    tx.commit().await?;

    tracing::info!(
        lease_id = %lease.id,
        room_id = %room.id,
        from = LeaseStatus::Active.as_str(),
        to = next.as_str(),
        room_available = room.available,
        "Lease closed"
    );
    Ok(Closure { lease, room })
}
