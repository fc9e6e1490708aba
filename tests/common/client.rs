//! HTTP client for end-to-end tests
//!
//! Wraps reqwest and provides methods for every jukebox endpoint.
//! When API routes or request formats change, update only this file.
#![allow(dead_code)]

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self { client, base_url }
    }

    // ========================================================================
    // Public endpoints
    // ========================================================================

    pub async fn search(&self, query: &str) -> Response {
        self.client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query)])
            .send()
            .await
            .expect("Search request failed")
    }

    pub async fn get_state(&self) -> Response {
        self.client
            .get(format!("{}/state", self.base_url))
            .send()
            .await
            .expect("State request failed")
    }

    /// Returns the parsed `/state` body.
    pub async fn state(&self) -> Value {
        self.get_state()
            .await
            .json()
            .await
            .expect("State body is not JSON")
    }

    // ========================================================================
    // Payments
    // ========================================================================

    pub async fn create_payment_raw(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/create-payment", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Create payment request failed")
    }

    /// Orders `items` (media id, title) at R$ 5,00 each.
    pub async fn create_payment(
        &self,
        items: &[(&str, &str)],
        message: Option<&str>,
        correlation_id: &str,
    ) -> Response {
        let items: Vec<Value> = items
            .iter()
            .map(|(media_id, title)| json!({"mediaId": media_id, "title": title}))
            .collect();
        let amount = 5.0 * items.len() as f64;
        self.create_payment_raw(json!({
            "items": items,
            "amount": amount,
            "message": message,
            "correlationId": correlation_id,
        }))
        .await
    }

    pub async fn webhook(&self, body: Value) -> Response {
        self.client
            .post(format!("{}/webhook", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Webhook request failed")
    }

    pub async fn webhook_query(&self, query: &[(&str, &str)]) -> Response {
        self.client
            .post(format!("{}/webhook", self.base_url))
            .query(query)
            .send()
            .await
            .expect("Webhook request failed")
    }

    /// The most common notification shape.
    pub async fn notify_payment(&self, payment_id: &str) -> Response {
        self.webhook(json!({"type": "payment", "action": "payment.updated", "data": {"id": payment_id}}))
            .await
    }

    // ========================================================================
    // Admin
    // ========================================================================

    pub async fn get_admin_page(&self, credentials: Option<(&str, &str)>) -> Response {
        let mut request = self.client.get(format!("{}/admin.html", self.base_url));
        if let Some((user, pass)) = credentials {
            request = request.basic_auth(user, Some(pass));
        }
        request.send().await.expect("Admin page request failed")
    }
}
