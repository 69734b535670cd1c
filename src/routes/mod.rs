use axum::{routing::get, Router};

use crate::state::AppState;

pub mod health;
pub mod leases;
pub mod payments;
pub mod properties;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(properties::router())
        .merge(leases::router())
        .merge(payments::router())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::v1_router;
    use crate::{
        clock::Clock,
        error::AppResult,
        models::{GatewayStatus, Role},
        repository::memory::MemoryStore,
        services::paydunya::{
            callback_hash, verify_callback_hash, GatewayReport, Invoice, InvoiceRequest,
            PaymentGateway,
        },
        state::AppState,
    };

    struct StubGateway;

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_invoice(&self, request: &InvoiceRequest) -> AppResult<Invoice> {
            Ok(Invoice {
                token: format!("tok_{}", request.metadata.payment_id.simple()),
                checkout_url: "https://paydunya.test/checkout".to_string(),
            })
        }

        async fn confirm(&self, token: &str) -> AppResult<GatewayReport> {
            Ok(GatewayReport {
                token: token.to_string(),
                status: GatewayStatus::Pending,
                total_amount: None,
                transaction_id: None,
            })
        }

        fn verify_callback(&self, delivered_hash: &str) -> bool {
            verify_callback_hash("master-key", delivered_hash)
        }
    }

    fn app(store: MemoryStore) -> Router {
        let state = AppState::for_tests(
            Arc::new(store),
            Arc::new(StubGateway),
            Clock::fixed(NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date")),
        );
        Router::new().nest("/v1", v1_router()).with_state(state)
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        actor: Option<(Uuid, Role)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, role)) = actor {
            builder = builder
                .header("x-user-id", id.to_string())
                .header("x-user-role", role.as_str());
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn lease_to_paid_rent_over_http() {
        let store = MemoryStore::new();
        let owner = (store.add_user(Role::Owner).await.id, Role::Owner);
        let tenant = (store.add_user(Role::Tenant).await.id, Role::Tenant);
        let app = app(store.clone());

        let (status, _) = send(&app, "GET", "/v1/leases", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, house) = send(
            &app,
            "POST",
            "/v1/houses",
            Some(owner),
            Some(json!({ "address": "12 Rue des Jardins", "city": "Dakar" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let house_id = house["data"]["id"].as_str().expect("house id").to_string();

        let (status, room) = send(
            &app,
            "POST",
            &format!("/v1/houses/{house_id}/rooms"),
            Some(owner),
            Some(json!({ "title": "Chambre 1", "monthly_price": "100000" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let room_id = room["data"]["id"].as_str().expect("room id").to_string();
        store
            .add_media(
                Uuid::parse_str(&room_id).expect("uuid"),
                "https://cdn.test/rooms/1.jpg",
            )
            .await;

        let (status, lease) = send(
            &app,
            "POST",
            &format!("/v1/rooms/{room_id}/lease-requests"),
            Some(tenant),
            Some(json!({ "start_date": "2024-01-15", "duration_months": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(lease["data"]["status"], "requested");
        let lease_id = lease["data"]["id"].as_str().expect("lease id").to_string();

        let (status, conflict) = send(
            &app,
            "POST",
            &format!("/v1/rooms/{room_id}/lease-requests"),
            Some(tenant),
            Some(json!({ "start_date": "2024-02-01", "duration_months": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(conflict["code"], "conflict");

        let (status, approved) = send(
            &app,
            "POST",
            &format!("/v1/leases/{lease_id}/approve"),
            Some(owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["room"]["available"], false);
        let payments = approved["payments"].as_array().expect("payments");
        assert_eq!(payments.len(), 4);
        assert_eq!(payments[0]["kind"], "deposit");
        assert_eq!(payments[0]["amount"], "100000");
        let rent_id = payments[1]["id"].as_str().expect("payment id").to_string();

        let (status, again) = send(
            &app,
            "POST",
            &format!("/v1/leases/{lease_id}/approve"),
            Some(owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(again["code"], "state_error");

        let (status, checkout) = send(
            &app,
            "POST",
            &format!("/v1/payments/{rent_id}/checkout"),
            Some(tenant),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(checkout["data"]["status"], "processing");
        let token = checkout["data"]["gateway_token"]
            .as_str()
            .expect("token")
            .to_string();

        let form = format!(
            "data%5Bhash%5D={}&data%5Bstatus%5D=completed&data%5Binvoice%5D%5Btoken%5D={token}\
             &data%5Binvoice%5D%5Btotal_amount%5D=100000&data%5Btransaction_id%5D=TX-1",
            callback_hash("master-key")
        );
        let callback = |body: String| {
            Request::builder()
                .method("POST")
                .uri("/v1/webhooks/paydunya")
                .header("content-type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .expect("request")
        };
        let response = app.clone().oneshot(callback(form.clone())).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(callback(form)).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024).await.expect("body");
        let ack: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(ack["outcome"], "duplicate");

        let forged = callback(format!(
            "data%5Bhash%5D=deadbeef&data%5Bstatus%5D=failed&data%5Binvoice%5D%5Btoken%5D={token}"
        ));
        let response = app.clone().oneshot(forged).await.expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let unknown = callback(format!(
            "data%5Bhash%5D={}&data%5Bstatus%5D=completed&data%5Binvoice%5D%5Btoken%5D=nope",
            callback_hash("master-key")
        ));
        let response = app.clone().oneshot(unknown).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let (status, detail) = send(
            &app,
            "GET",
            &format!("/v1/leases/{lease_id}"),
            Some(tenant),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["balance"]["paid_count"], 1);
        assert_eq!(detail["balance"]["outstanding_amount"], "300000");

        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/leases/{lease_id}/terminate"),
            Some(owner),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, room) = send(
            &app,
            "GET",
            &format!("/v1/rooms/{room_id}"),
            Some(tenant),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(room["data"]["available"], true);
        assert_eq!(room["media"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn health_reports_store_status() {
        let app = app(MemoryStore::new());
        let (status, body) = send(&app, "GET", "/v1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }
}
