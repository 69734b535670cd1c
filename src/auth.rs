use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::Role,
};

/// Authenticated caller of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub fn require_actor(config: &AppConfig, headers: &HeaderMap) -> AppResult<Actor> {
    if let Some(token) = bearer_token(headers) {
        return decode_actor(config, token);
    }

    if config.auth_dev_overrides_enabled() {
        if let Some(actor) = dev_override(headers)? {
            return Ok(actor);
        }
    }

    Err(AppError::Unauthorized(
        "Unauthorized: missing bearer token.".to_string(),
    ))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}

fn decode_actor(config: &AppConfig, token: &str) -> AppResult<Actor> {
    let secret = config.auth_jwt_secret.as_deref().ok_or_else(|| {
        AppError::Dependency("Authentication is not configured. Set AUTH_JWT_SECRET.".to_string())
    })?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|error| {
        tracing::debug!(error = %error, "Rejected bearer token");
        AppError::Unauthorized("Unauthorized: invalid or expired token.".to_string())
    })?;

    actor_from_parts(&data.claims.sub, &data.claims.role)
}

fn dev_override(headers: &HeaderMap) -> AppResult<Option<Actor>> {
    let user_id = header_str(headers, "x-user-id");
    let role = header_str(headers, "x-user-role");
    match (user_id, role) {
        (Some(user_id), Some(role)) => actor_from_parts(user_id, role).map(Some),
        _ => Ok(None),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn actor_from_parts(user_id: &str, role: &str) -> AppResult<Actor> {
    let id = Uuid::parse_str(user_id.trim())
        .map_err(|_| AppError::Unauthorized("Unauthorized: invalid subject.".to_string()))?;
    let role = Role::parse(role)
        .ok_or_else(|| AppError::Unauthorized("Unauthorized: unknown role.".to_string()))?;
    Ok(Actor { id, role })
}

#[cfg(test)]
pub fn issue_token(secret: &str, actor: &Actor) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let claims = Claims {
        sub: actor.id.to_string(),
        role: actor.role.as_str().to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("token encodes")
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue};
    use uuid::Uuid;

    use super::{issue_token, require_actor, Actor};
    use crate::{config::AppConfig, error::AppError, models::Role};

    #[test]
    fn accepts_signed_bearer_token() {
        let config = AppConfig::for_tests();
        let actor = Actor {
            id: Uuid::new_v4(),
            role: Role::Owner,
        };
        let token = issue_token("test-secret", &actor);
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        assert_eq!(require_actor(&config, &headers).expect("actor"), actor);
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let config = AppConfig::for_tests();
        let actor = Actor {
            id: Uuid::new_v4(),
            role: Role::Tenant,
        };
        let token = issue_token("wrong-secret", &actor);
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {token}")).expect("header"),
        );
        assert!(matches!(
            require_actor(&config, &headers),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn dev_override_headers_only_outside_production() {
        let mut config = AppConfig::for_tests();
        let user_id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-user-id",
            HeaderValue::from_str(&user_id.to_string()).expect("header"),
        );
        headers.insert("x-user-role", HeaderValue::from_static("tenant"));

        let actor = require_actor(&config, &headers).expect("actor");
        assert_eq!(actor.id, user_id);
        assert_eq!(actor.role, Role::Tenant);

        config.environment = "production".to_string();
        assert!(matches!(
            require_actor(&config, &headers),
            Err(AppError::Unauthorized(_))
        ));
    }
}
