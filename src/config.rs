use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayDunyaMode {
    Test,
    Live,
}

impl PayDunyaMode {
    fn from_env(value: Option<String>) -> Self {
        match value
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "live" | "production" => Self::Live,
            _ => Self::Test,
        }
    }

    pub fn api_base(self) -> &'static str {
        match self {
            Self::Test => "https://app.paydunya.com/sandbox-api/v1",
            Self::Live => "https://app.paydunya.com/api/v1",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Live => "live",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub dev_auth_overrides_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub database_url: Option<String>,
    pub db_pool_max_connections: u32,
    pub db_pool_min_connections: u32,
    pub db_pool_acquire_timeout_seconds: u64,
    pub db_pool_idle_timeout_seconds: u64,
    pub run_migrations: bool,
    pub auth_jwt_secret: Option<String>,
    pub default_deposit_months: u32,
    pub max_deposit_months: u32,
    pub max_lease_duration_months: u32,
    pub paydunya_mode: PayDunyaMode,
    pub paydunya_master_key: Option<String>,
    pub paydunya_private_key: Option<String>,
    pub paydunya_public_key: Option<String>,
    pub paydunya_token: Option<String>,
    pub paydunya_store_name: String,
    pub paydunya_callback_url: String,
    pub paydunya_return_url: String,
    pub paydunya_cancel_url: String,
    pub gateway_timeout_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let app_public_url = env_or("APP_PUBLIC_URL", "http://localhost:5173");
        Self {
            app_name: env_or("APP_NAME", "Roomrent API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:5173")),
            dev_auth_overrides_enabled: env_parse_bool_or("DEV_AUTH_OVERRIDES_ENABLED", false),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            database_url: env_opt("DATABASE_URL"),
            db_pool_max_connections: env_parse_or("DB_POOL_MAX_CONNECTIONS", 5),
            db_pool_min_connections: env_parse_or("DB_POOL_MIN_CONNECTIONS", 1),
            db_pool_acquire_timeout_seconds: env_parse_or("DB_POOL_ACQUIRE_TIMEOUT_SECONDS", 5),
            db_pool_idle_timeout_seconds: env_parse_or("DB_POOL_IDLE_TIMEOUT_SECONDS", 600),
            run_migrations: env_parse_bool_or("RUN_MIGRATIONS", true),
            auth_jwt_secret: env_opt("AUTH_JWT_SECRET"),
            default_deposit_months: env_parse_or("DEFAULT_DEPOSIT_MONTHS", 1),
            max_deposit_months: env_parse_or("MAX_DEPOSIT_MONTHS", 3),
            max_lease_duration_months: env_parse_or("MAX_LEASE_DURATION_MONTHS", 120),
            paydunya_mode: PayDunyaMode::from_env(env_opt("PAYDUNYA_MODE")),
            paydunya_master_key: env_opt("PAYDUNYA_MASTER_KEY"),
            paydunya_private_key: env_opt("PAYDUNYA_PRIVATE_KEY"),
            paydunya_public_key: env_opt("PAYDUNYA_PUBLIC_KEY"),
            paydunya_token: env_opt("PAYDUNYA_TOKEN"),
            paydunya_store_name: env_or("PAYDUNYA_STORE_NAME", "Roomrent"),
            paydunya_callback_url: env_or(
                "PAYDUNYA_CALLBACK_URL",
                "http://localhost:8000/v1/webhooks/paydunya",
            ),
            paydunya_return_url: env_or(
                "PAYDUNYA_RETURN_URL",
                &format!("{app_public_url}/payments/success"),
            ),
            paydunya_cancel_url: env_or(
                "PAYDUNYA_CANCEL_URL",
                &format!("{app_public_url}/payments/cancel"),
            ),
            gateway_timeout_seconds: env_parse_or("GATEWAY_TIMEOUT_SECONDS", 15),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn auth_dev_overrides_enabled(&self) -> bool {
        if self.is_production() {
            return false;
        }
        self.dev_auth_overrides_enabled
    }

    /// Deposit defaults never exceed the configured ceiling.
    pub fn effective_default_deposit_months(&self) -> u32 {
        self.default_deposit_months.min(self.max_deposit_months)
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
impl AppConfig {
    pub fn for_tests() -> Self {
        Self {
            app_name: "Roomrent API".to_string(),
            environment: "test".to_string(),
            api_prefix: "/v1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            dev_auth_overrides_enabled: true,
            rate_limit_per_second: 10,
            rate_limit_burst_size: 100,
            database_url: None,
            db_pool_max_connections: 1,
            db_pool_min_connections: 0,
            db_pool_acquire_timeout_seconds: 1,
            db_pool_idle_timeout_seconds: 60,
            run_migrations: false,
            auth_jwt_secret: Some("test-secret".to_string()),
            default_deposit_months: 1,
            max_deposit_months: 3,
            max_lease_duration_months: 120,
            paydunya_mode: PayDunyaMode::Test,
            paydunya_master_key: Some("master-key".to_string()),
            paydunya_private_key: None,
            paydunya_public_key: None,
            paydunya_token: None,
            paydunya_store_name: "Roomrent".to_string(),
            paydunya_callback_url: "http://localhost/v1/webhooks/paydunya".to_string(),
            paydunya_return_url: "http://localhost/payments/success".to_string(),
            paydunya_cancel_url: "http://localhost/payments/cancel".to_string(),
            gateway_timeout_seconds: 1,
        }
    }
}
