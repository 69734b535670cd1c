use crate::{
    auth::Actor,
    error::{AppError, AppResult},
    models::{House, Lease, Role},
    repository::store::{LeaseFilter, PaymentFilter, Store},
};

pub fn require_role(actor: &Actor, allowed_roles: &[Role]) -> AppResult<()> {
    if allowed_roles.contains(&actor.role) {
        return Ok(());
    }
    Err(AppError::Forbidden(format!(
        "Forbidden: role '{}' is not allowed for this action.",
        actor.role.as_str()
    )))
}

/// Tokens can outlive the account they were issued for.
pub fn unknown_user(error: AppError) -> AppError {
    match error {
        AppError::NotFound(_) => {
            AppError::Unauthorized("Unauthorized: unknown user.".to_string())
        }
        other => other,
    }
}

pub fn assert_house_owner(actor: &Actor, house: &House) -> AppResult<()> {
    if actor.role == Role::Owner && house.owner_id == actor.id {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Forbidden: you do not own this property.".to_string(),
    ))
}

pub fn assert_lease_tenant(actor: &Actor, lease: &Lease) -> AppResult<()> {
    if actor.role == Role::Tenant && lease.tenant_id == actor.id {
        return Ok(());
    }
    Err(AppError::Forbidden(
        "Forbidden: this lease belongs to another tenant.".to_string(),
    ))
}

/// Tenants see their own leases, owners the leases on their rooms, admins everything.
pub async fn assert_lease_visible(store: &dyn Store, actor: &Actor, lease: &Lease) -> AppResult<()> {
    match actor.role {
        Role::Admin => Ok(()),
        Role::Tenant => assert_lease_tenant(actor, lease),
        Role::Owner => {
            let room = store.get_room(lease.room_id).await?;
            let house = store.get_house(room.house_id).await?;
            assert_house_owner(actor, &house)
        }
    }
}

pub fn scope_leases(actor: &Actor, filter: &mut LeaseFilter) {
    match actor.role {
        Role::Tenant => filter.tenant_id = Some(actor.id),
        Role::Owner => filter.owner_id = Some(actor.id),
        Role::Admin => {}
    }
}

pub fn scope_payments(actor: &Actor, filter: &mut PaymentFilter) {
    match actor.role {
        Role::Tenant => filter.tenant_id = Some(actor.id),
        Role::Owner => filter.owner_id = Some(actor.id),
        Role::Admin => {}
    }
}
