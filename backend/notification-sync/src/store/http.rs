/// PostgREST-style HTTP adapters for the store and preference collaborators
use super::{NotificationStore, PreferenceService, StoreError};
use crate::config::StoreConfig;
use crate::models::{Notification, NotificationId, Preferences};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

const NOTIFICATIONS_TABLE: &str = "notifications";
const PREFERENCES_TABLE: &str = "user_preferences";

#[derive(Clone)]
struct RestClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestClient {
    fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, table: &str, query: &str) -> RequestBuilder {
        let url = format!("{}/rest/v1/{}?{}", self.base_url, table, query);
        let mut builder = self.client.request(method, url);
        if !self.api_key.is_empty() {
            builder = builder
                .header("apikey", &self.api_key)
                .bearer_auth(&self.api_key);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        let response = builder
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

/// Notification store backed by a PostgREST endpoint
#[derive(Clone)]
pub struct HttpNotificationStore {
    rest: RestClient,
}

impl HttpNotificationStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            rest: RestClient::new(config)?,
        })
    }
}

#[async_trait]
impl NotificationStore for HttpNotificationStore {
    async fn list(&self, user_id: Uuid, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let query = format!(
            "user_id=eq.{}&order=created_at.desc&limit={}",
            user_id, limit
        );
        let response = self
            .rest
            .send(self.rest.request(Method::GET, NOTIFICATIONS_TABLE, &query))
            .await?;

        response
            .json::<Vec<Notification>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64, StoreError> {
        let query = format!("user_id=eq.{}&is_read=eq.false&select=id", user_id);
        let builder = self
            .rest
            .request(Method::HEAD, NOTIFICATIONS_TABLE, &query)
            .header("Prefer", "count=exact");
        let response = self.rest.send(builder).await?;

        let content_range = response
            .headers()
            .get(header::CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| StoreError::Decode("missing Content-Range header".to_string()))?;

        parse_content_range_total(content_range)
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), StoreError> {
        let query = format!("id=eq.{}", urlencoding::encode(id.as_str()));
        let body = serde_json::json!({ "is_read": true, "read_at": Utc::now() });
        self.rest
            .send(
                self.rest
                    .request(Method::PATCH, NOTIFICATIONS_TABLE, &query)
                    .json(&body),
            )
            .await?;
        debug!("Marked notification {} as read", id);
        Ok(())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<(), StoreError> {
        let query = format!("user_id=eq.{}&is_read=eq.false", user_id);
        let body = serde_json::json!({ "is_read": true, "read_at": Utc::now() });
        self.rest
            .send(
                self.rest
                    .request(Method::PATCH, NOTIFICATIONS_TABLE, &query)
                    .json(&body),
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &NotificationId) -> Result<(), StoreError> {
        let query = format!("id=eq.{}", urlencoding::encode(id.as_str()));
        self.rest
            .send(self.rest.request(Method::DELETE, NOTIFICATIONS_TABLE, &query))
            .await?;
        Ok(())
    }
}

/// Preference service backed by the same PostgREST endpoint
#[derive(Clone)]
pub struct HttpPreferenceService {
    rest: RestClient,
}

impl HttpPreferenceService {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            rest: RestClient::new(config)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PreferenceRow {
    #[serde(default)]
    sound_enabled: Option<bool>,
}

#[async_trait]
impl PreferenceService for HttpPreferenceService {
    async fn get_preferences(&self, user_id: Uuid) -> Result<Preferences, StoreError> {
        let query = format!("user_id=eq.{}&select=sound_enabled&limit=1", user_id);
        let response = self
            .rest
            .send(self.rest.request(Method::GET, PREFERENCES_TABLE, &query))
            .await?;
        let rows = response
            .json::<Vec<PreferenceRow>>()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;

        Ok(preferences_from_rows(rows))
    }
}

// Users without a preference row get the defaults.
fn preferences_from_rows(rows: Vec<PreferenceRow>) -> Preferences {
    match rows.into_iter().next().and_then(|row| row.sound_enabled) {
        Some(sound_enabled) => Preferences { sound_enabled },
        None => Preferences::default(),
    }
}

/// Parse the total from a `Content-Range` value such as `0-4/42` or `*/0`.
fn parse_content_range_total(value: &str) -> Result<i64, StoreError> {
    let total = value
        .rsplit_once('/')
        .map(|(_, total)| total.trim())
        .ok_or_else(|| StoreError::Decode(format!("malformed Content-Range: {}", value)))?;

    total
        .parse::<i64>()
        .map_err(|_| StoreError::Decode(format!("Content-Range without exact count: {}", value)))
}
