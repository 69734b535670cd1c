use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;

use crate::{
    error::{AppError, AppResult},
    models::{Lease, PaymentKind, Room, ScheduledPayment},
};

/// Inputs of the payment schedule for one lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTerms {
    pub start_date: NaiveDate,
    pub duration_months: u32,
    pub monthly_rent: Decimal,
    pub deposit_amount: Decimal,
}

impl ScheduleTerms {
    pub fn for_lease(lease: &Lease, room: &Room) -> Self {
        Self {
            start_date: lease.start_date,
            duration_months: u32::try_from(lease.duration_months).unwrap_or(0),
            monthly_rent: room.monthly_price,
            deposit_amount: lease.deposit_amount,
        }
    }
}

/// `date` plus `months` calendar months, clamped to the end of the target month.
pub fn add_months(date: NaiveDate, months: u32) -> AppResult<NaiveDate> {
    date.checked_add_months(Months::new(months))
        .ok_or_else(|| AppError::BadRequest("Lease dates are out of range.".to_string()))
}

/// Builds the obligations of a lease: an optional deposit followed by one rent row per month.
///
/// The first rent row is due on the start date and each next one a calendar month after the
/// previous row, so a clamped day carries forward (Jan 31, Feb 28, Mar 28).
pub fn generate_schedule(terms: &ScheduleTerms) -> AppResult<Vec<ScheduledPayment>> {
    let mut schedule = Vec::with_capacity(terms.duration_months as usize + 1);

    if terms.deposit_amount > Decimal::ZERO {
        schedule.push(ScheduledPayment {
            kind: PaymentKind::Deposit,
            amount: terms.deposit_amount,
            due_date: terms.start_date,
            description: "Security deposit".to_string(),
        });
    }

    let mut cursor = terms.start_date;
    for index in 0..terms.duration_months {
        if index > 0 {
            cursor = add_months(cursor, 1)?;
        }
        schedule.push(ScheduledPayment {
            kind: PaymentKind::Rent,
            amount: terms.monthly_rent,
            due_date: cursor,
            description: format!("Rent for {}", cursor.format("%B %Y")),
        });
    }

    Ok(schedule)
}
