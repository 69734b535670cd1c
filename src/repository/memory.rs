use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        House, Lease, LeaseStatus, Media, NewHouse, NewLease, NewRoom, Payment, PaymentKind,
        PaymentStatus, Role, Room, ScheduledPayment, User,
    },
    repository::store::{LeaseFilter, PaymentFilter, Store, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    houses: HashMap<Uuid, House>,
    rooms: HashMap<Uuid, Room>,
    media: Vec<Media>,
    leases: HashMap<Uuid, Lease>,
    payments: HashMap<Uuid, Payment>,
}

/// Store used by tests. Transactions are fully serialized: `begin` holds the state lock
/// and works on a copy that only replaces the shared state on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_payment_inserts: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later `insert_payments` call fail with a dependency error.
    pub fn fail_payment_inserts(&self, fail: bool) {
        self.fail_payment_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn add_user(&self, role: Role) -> User {
        let id = Uuid::new_v4();
        let user = User {
            id,
            username: format!("user-{}", &id.simple().to_string()[..8]),
            email: format!("{id}@example.test"),
            phone: None,
            role,
            created_at: Utc::now(),
        };
        self.state.lock().await.users.insert(id, user.clone());
        user
    }

    pub async fn add_house(&self, owner_id: Uuid) -> House {
        let house = House {
            id: Uuid::new_v4(),
            owner_id,
            address: "12 Rue des Jardins".to_string(),
            city: Some("Dakar".to_string()),
            latitude: None,
            longitude: None,
            description: None,
            created_at: Utc::now(),
        };
        self.state
            .lock()
            .await
            .houses
            .insert(house.id, house.clone());
        house
    }

    pub async fn add_room(&self, house_id: Uuid, monthly_price: Decimal) -> Room {
        let room = Room {
            id: Uuid::new_v4(),
            house_id,
            title: "Chambre meublée".to_string(),
            description: None,
            size: Some("12m2".to_string()),
            room_type: Some("chambre".to_string()),
            furnished: true,
            private_bathroom: false,
            monthly_price,
            available: true,
            created_at: Utc::now(),
        };
        self.state.lock().await.rooms.insert(room.id, room.clone());
        room
    }

    pub async fn add_media(&self, room_id: Uuid, url: &str) -> Media {
        let media = Media {
            id: Uuid::new_v4(),
            room_id,
            url: url.to_string(),
            media_type: "photo".to_string(),
            description: None,
            created_at: Utc::now(),
        };
        self.state.lock().await.media.push(media.clone());
        media
    }

    /// Overwrites a payment outside any transaction, for arranging test fixtures.
    pub async fn put_payment(&self, payment: Payment) {
        self.state
            .lock()
            .await
            .payments
            .insert(payment.id, payment);
    }
}

fn not_found(table_name: &str) -> AppError {
    AppError::NotFound(format!("{table_name} record not found."))
}

fn owner_of_room(state: &MemoryState, room_id: Uuid) -> Option<Uuid> {
    let room = state.rooms.get(&room_id)?;
    state.houses.get(&room.house_id).map(|house| house.owner_id)
}

fn kind_order(kind: PaymentKind) -> u8 {
    match kind {
        PaymentKind::Deposit => 0,
        PaymentKind::Rent => 1,
    }
}

#[async_trait]
impl Store for MemoryStore {
    /// Holds the whole state for the life of the transaction: transactions never interleave.
    async fn begin(&self) -> AppResult<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_payment_inserts: self.fail_payment_inserts.load(Ordering::SeqCst),
        }))
    }

    async fn get_user(&self, user_id: Uuid) -> AppResult<User> {
        self.state
            .lock()
            .await
            .users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| not_found("users"))
    }

    async fn get_house(&self, house_id: Uuid) -> AppResult<House> {
        self.state
            .lock()
            .await
            .houses
            .get(&house_id)
            .cloned()
            .ok_or_else(|| not_found("houses"))
    }

    async fn get_room(&self, room_id: Uuid) -> AppResult<Room> {
        self.state
            .lock()
            .await
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| not_found("rooms"))
    }

    async fn get_lease(&self, lease_id: Uuid) -> AppResult<Lease> {
        self.state
            .lock()
            .await
            .leases
            .get(&lease_id)
            .cloned()
            .ok_or_else(|| not_found("leases"))
    }

    async fn get_payment(&self, payment_id: Uuid) -> AppResult<Payment> {
        self.state
            .lock()
            .await
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| not_found("payments"))
    }

    async fn list_media(&self, room_id: Uuid) -> AppResult<Vec<Media>> {
        let state = self.state.lock().await;
        Ok(state
            .media
            .iter()
            .filter(|media| media.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn list_leases(&self, filter: &LeaseFilter) -> AppResult<Vec<Lease>> {
        let state = self.state.lock().await;
        let mut leases = state
            .leases
            .values()
            .filter(|lease| filter.tenant_id.is_none_or(|id| lease.tenant_id == id))
            .filter(|lease| filter.room_id.is_none_or(|id| lease.room_id == id))
            .filter(|lease| filter.status.is_none_or(|status| lease.status == status))
            .filter(|lease| {
                filter
                    .owner_id
                    .is_none_or(|id| owner_of_room(&state, lease.room_id) == Some(id))
            })
            .cloned()
            .collect::<Vec<_>>();
        leases.sort_by(|a, b| {
            b.start_date
                .cmp(&a.start_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        leases.truncate(filter.limit.clamp(1, 1000) as usize);
        Ok(leases)
    }

    async fn list_payments(&self, filter: &PaymentFilter) -> AppResult<Vec<Payment>> {
        let state = self.state.lock().await;
        let mut payments = state
            .payments
            .values()
            .filter(|payment| filter.lease_id.is_none_or(|id| payment.lease_id == id))
            .filter(|payment| filter.status.is_none_or(|status| payment.status == status))
            .filter(|payment| {
                let Some(lease) = state.leases.get(&payment.lease_id) else {
                    return false;
                };
                filter.tenant_id.is_none_or(|id| lease.tenant_id == id)
                    && filter
                        .owner_id
                        .is_none_or(|id| owner_of_room(&state, lease.room_id) == Some(id))
            })
            .cloned()
            .collect::<Vec<_>>();
        payments.sort_by(|a, b| {
            a.due_date
                .cmp(&b.due_date)
                .then(kind_order(a.kind).cmp(&kind_order(b.kind)))
                .then(a.created_at.cmp(&b.created_at))
        });
        payments.truncate(filter.limit.clamp(1, 5000) as usize);
        Ok(payments)
    }

    async fn ping(&self) -> bool {
        true
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_payment_inserts: bool,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn lock_room(&mut self, room_id: Uuid) -> AppResult<Room> {
        self.room(room_id).await
    }

    async fn lock_lease(&mut self, lease_id: Uuid) -> AppResult<Lease> {
        self.lease(lease_id).await
    }

    async fn lock_payment(&mut self, payment_id: Uuid) -> AppResult<Payment> {
        self.working
            .payments
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| not_found("payments"))
    }

    async fn lock_payment_by_token(&mut self, token: &str) -> AppResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|payment| payment.gateway_token.as_deref() == Some(token))
            .cloned())
    }

    async fn house(&mut self, house_id: Uuid) -> AppResult<House> {
        self.working
            .houses
            .get(&house_id)
            .cloned()
            .ok_or_else(|| not_found("houses"))
    }

    async fn lease(&mut self, lease_id: Uuid) -> AppResult<Lease> {
        self.working
            .leases
            .get(&lease_id)
            .cloned()
            .ok_or_else(|| not_found("leases"))
    }

    async fn room(&mut self, room_id: Uuid) -> AppResult<Room> {
        self.working
            .rooms
            .get(&room_id)
            .cloned()
            .ok_or_else(|| not_found("rooms"))
    }

    async fn open_leases_for_room(&mut self, room_id: Uuid) -> AppResult<Vec<Lease>> {
        Ok(self
            .working
            .leases
            .values()
            .filter(|lease| lease.room_id == room_id && lease.status.is_open())
            .cloned()
            .collect())
    }

    async fn insert_house(&mut self, house: &NewHouse) -> AppResult<House> {
        let created = House {
            id: Uuid::new_v4(),
            owner_id: house.owner_id,
            address: house.address.clone(),
            city: house.city.clone(),
            latitude: house.latitude,
            longitude: house.longitude,
            description: house.description.clone(),
            created_at: Utc::now(),
        };
        self.working.houses.insert(created.id, created.clone());
        Ok(created)
    }

    async fn insert_room(&mut self, room: &NewRoom) -> AppResult<Room> {
        let created = Room {
            id: Uuid::new_v4(),
            house_id: room.house_id,
            title: room.title.clone(),
            description: room.description.clone(),
            size: room.size.clone(),
            room_type: room.room_type.clone(),
            furnished: room.furnished,
            private_bathroom: room.private_bathroom,
            monthly_price: room.monthly_price,
            available: true,
            created_at: Utc::now(),
        };
        self.working.rooms.insert(created.id, created.clone());
        Ok(created)
    }

    async fn insert_lease(&mut self, lease: &NewLease) -> AppResult<Lease> {
        // Mirrors the partial unique index on open leases per room.
        if self
            .working
            .leases
            .values()
            .any(|existing| existing.room_id == lease.room_id && existing.status.is_open())
        {
            return Err(AppError::Conflict(
                "This room already has a pending request or an active lease.".to_string(),
            ));
        }
        let now = Utc::now();
        let created = Lease {
            id: Uuid::new_v4(),
            tenant_id: lease.tenant_id,
            room_id: lease.room_id,
            start_date: lease.start_date,
            end_date: lease.end_date,
            duration_months: lease.duration_months,
            deposit_amount: lease.deposit_amount,
            deposit_months: lease.deposit_months,
            payment_mode: lease.payment_mode.clone(),
            periodicity: lease.periodicity.clone(),
            description: lease.description.clone(),
            status: LeaseStatus::Requested,
            created_at: now,
            updated_at: now,
        };
        self.working.leases.insert(created.id, created.clone());
        Ok(created)
    }

    async fn insert_payments(
        &mut self,
        lease_id: Uuid,
        schedule: &[ScheduledPayment],
    ) -> AppResult<Vec<Payment>> {
        if self.fail_payment_inserts {
            return Err(AppError::Dependency("Database operation failed.".to_string()));
        }
        let now = Utc::now();
        let mut created = Vec::with_capacity(schedule.len());
        for item in schedule {
            let payment = Payment {
                id: Uuid::new_v4(),
                lease_id,
                kind: item.kind,
                amount: item.amount,
                due_date: item.due_date,
                paid_date: None,
                status: PaymentStatus::Unpaid,
                gateway_token: None,
                gateway_transaction_id: None,
                gateway_status: None,
                description: Some(item.description.clone()),
                created_at: now,
                updated_at: now,
            };
            self.working.payments.insert(payment.id, payment.clone());
            created.push(payment);
        }
        Ok(created)
    }

    async fn set_lease_status(&mut self, lease_id: Uuid, status: LeaseStatus) -> AppResult<Lease> {
        let lease = self
            .working
            .leases
            .get_mut(&lease_id)
            .ok_or_else(|| not_found("leases"))?;
        lease.status = status;
        lease.updated_at = Utc::now();
        Ok(lease.clone())
    }

    async fn set_room_available(&mut self, room_id: Uuid, available: bool) -> AppResult<Room> {
        let room = self
            .working
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| not_found("rooms"))?;
        room.available = available;
        Ok(room.clone())
    }

    async fn update_payment(&mut self, payment: &Payment) -> AppResult<Payment> {
        if let Some(token) = payment.gateway_token.as_deref() {
            let taken = self.working.payments.values().any(|other| {
                other.id != payment.id && other.gateway_token.as_deref() == Some(token)
            });
            if taken {
                return Err(AppError::Conflict(
                    "Duplicate value violates a unique constraint.".to_string(),
                ));
            }
        }
        let stored = self
            .working
            .payments
            .get_mut(&payment.id)
            .ok_or_else(|| not_found("payments"))?;
        stored.status = payment.status;
        stored.paid_date = payment.paid_date;
        stored.gateway_token = payment.gateway_token.clone();
        stored.gateway_transaction_id = payment.gateway_transaction_id.clone();
        stored.gateway_status = payment.gateway_status;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let MemoryTx {
            mut guard, working, ..
        } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::MemoryStore;
    use crate::{models::Role, repository::store::Store};

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let owner = store.add_user(Role::Owner).await;
        let house = store.add_house(owner.id).await;
        let room = store.add_room(house.id, Decimal::new(50_000, 0)).await;

        {
            let mut tx = store.begin().await.expect("begin");
            tx.set_room_available(room.id, false).await.expect("update");
        }
        assert!(store.get_room(room.id).await.expect("room").available);

        let mut tx = store.begin().await.expect("begin");
        tx.set_room_available(room.id, false).await.expect("update");
        tx.commit().await.expect("commit");
        assert!(!store.get_room(room.id).await.expect("room").available);
    }
}
