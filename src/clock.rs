use chrono::{NaiveDate, Utc};

/// Source of "today" for date validation and settlement dates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    fixed: Option<NaiveDate>,
}

impl Clock {
    pub fn system() -> Self {
        Self { fixed: None }
    }

    #[cfg(test)]
    pub fn fixed(today: NaiveDate) -> Self {
        Self { fixed: Some(today) }
    }

    pub fn today(&self) -> NaiveDate {
        self.fixed.unwrap_or_else(|| Utc::now().date_naive())
    }
}
