use std::sync::Arc;

use chrono::NaiveDate;

use crate::{
    clock::Clock,
    config::AppConfig,
    error::AppResult,
    repository::{postgres::PgStore, store::Store},
    services::{
        lease_lifecycle::LeasePolicy,
        paydunya::{PayDunyaClient, PaymentGateway},
        payments::CheckoutSettings,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub clock: Clock,
}

impl AppState {
    pub async fn build(config: AppConfig) -> AppResult<Self> {
        let store = PgStore::connect_lazy(&config)?;
        if config.run_migrations {
            store.migrate().await?;
            tracing::info!("Database migrations applied");
        }
        let gateway = PayDunyaClient::from_config(&config)?;

        Ok(Self {
            config: Arc::new(config),
            store: Arc::new(store),
            gateway: Arc::new(gateway),
            clock: Clock::system(),
        })
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn lease_policy(&self) -> LeasePolicy {
        LeasePolicy::from_config(&self.config)
    }

    pub fn checkout_settings(&self) -> CheckoutSettings {
        CheckoutSettings::from_config(&self.config)
    }
}

#[cfg(test)]
impl AppState {
    pub fn for_tests(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Clock,
    ) -> Self {
        Self {
            config: Arc::new(AppConfig::for_tests()),
            store,
            gateway,
            clock,
        }
    }
}
