use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        House, Lease, LeaseStatus, Media, NewHouse, NewLease, NewRoom, Payment, PaymentStatus,
        Room, ScheduledPayment, User,
    },
};

#[derive(Debug, Clone, Default)]
pub struct LeaseFilter {
    pub tenant_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub status: Option<LeaseStatus>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub lease_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub limit: i64,
}

/// Persistence handle shared by every request.
///
/// Reads outside `begin()` see committed data only. Every mutation goes through a
/// [`StoreTx`] so multi-entity changes are applied all-or-nothing.
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>>;

    async fn get_user(&self, user_id: Uuid) -> AppResult<User>;
    async fn get_house(&self, house_id: Uuid) -> AppResult<House>;
    async fn get_room(&self, room_id: Uuid) -> AppResult<Room>;
    async fn get_lease(&self, lease_id: Uuid) -> AppResult<Lease>;
    async fn get_payment(&self, payment_id: Uuid) -> AppResult<Payment>;

    async fn list_media(&self, room_id: Uuid) -> AppResult<Vec<Media>>;
    async fn list_leases(&self, filter: &LeaseFilter) -> AppResult<Vec<Lease>>;
    /// Ordered by due date, deposits before rent on the same day.
    async fn list_payments(&self, filter: &PaymentFilter) -> AppResult<Vec<Payment>>;

    async fn ping(&self) -> bool;
}

/// A unit of work. Dropping it without [`StoreTx::commit`] discards every write.
///
/// `lock_*` reads take a row lock held until the transaction ends. Callers lock the
/// room before the lease and the lease before its payments.
#[async_trait]
pub trait StoreTx: Send {
    async fn lock_room(&mut self, room_id: Uuid) -> AppResult<Room>;
    async fn lock_lease(&mut self, lease_id: Uuid) -> AppResult<Lease>;
    async fn lock_payment(&mut self, payment_id: Uuid) -> AppResult<Payment>;
    async fn lock_payment_by_token(&mut self, token: &str) -> AppResult<Option<Payment>>;

    async fn house(&mut self, house_id: Uuid) -> AppResult<House>;
    async fn lease(&mut self, lease_id: Uuid) -> AppResult<Lease>;
    async fn room(&mut self, room_id: Uuid) -> AppResult<Room>;
    async fn open_leases_for_room(&mut self, room_id: Uuid) -> AppResult<Vec<Lease>>;

    async fn insert_house(&mut self, house: &NewHouse) -> AppResult<House>;
    async fn insert_room(&mut self, room: &NewRoom) -> AppResult<Room>;
    async fn insert_lease(&mut self, lease: &NewLease) -> AppResult<Lease>;
    async fn insert_payments(
        &mut self,
        lease_id: Uuid,
        schedule: &[ScheduledPayment],
    ) -> AppResult<Vec<Payment>>;

    async fn set_lease_status(&mut self, lease_id: Uuid, status: LeaseStatus) -> AppResult<Lease>;
    async fn set_room_available(&mut self, room_id: Uuid, available: bool) -> AppResult<Room>;
    /// Writes the mutable payment fields: status, paid date and gateway columns.
    async fn update_payment(&mut self, payment: &Payment) -> AppResult<Payment>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
