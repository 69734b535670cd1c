pub mod lease_lifecycle;
pub mod lease_schedule;
pub mod paydunya;
pub mod payments;
pub mod reconciliation;
