use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::config::{Config, SnowflakeConfig};
use crate::error::{IntervaiewError, Result};

const CLIENT_APP_ID: &str = "IntervAIew";

/// Response codes for a statement that has not finished yet.
const QUERY_IN_PROGRESS: &[&str] = &["333333", "333334"];
const RESULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Authenticated warehouse session. Only the query gateway holds one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseSession {
    pub token: String,
}

/// Backend data service able to open a session and run a single-value query.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn connect(&self) -> Result<WarehouseSession>;

    /// First column of the first row, `None` for an empty result set.
    async fn query_scalar(&self, session: &WarehouseSession, sql: &str) -> Result<Option<String>>;
}

/// Snowflake over its HTTPS session/query endpoints.
pub struct SnowflakeTransport {
    client: Client,
    base_url: String,
    credentials: SnowflakeConfig,
    sequence: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Debug, Deserialize, Default)]
struct QueryData {
    #[serde(default)]
    rowset: Vec<Vec<Value>>,
    #[serde(default, rename = "getResultUrl")]
    get_result_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    sql_text: &'a str,
    async_exec: bool,
    sequence_id: u64,
    query_submission_time: i64,
}

impl SnowflakeTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("{CLIENT_APP_ID}/{}", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.snowflake_base_url(),
            credentials: config.snowflake.clone(),
            sequence: AtomicU64::new(0),
        })
    }

    fn auth_header(session: &WarehouseSession) -> String {
        format!("Snowflake Token=\"{}\"", session.token)
    }

    /// Result URLs come back relative to the account host.
    fn result_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    async fn read_query_envelope(response: reqwest::Response) -> Result<Envelope> {
        if !response.status().is_success() {
            return Err(IntervaiewError::Query(format!(
                "query returned HTTP {}",
                response.status()
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| IntervaiewError::Query(format!("unreadable query response: {e}")))?;
        if !envelope.success {
            return Err(IntervaiewError::Query(
                envelope
                    .message
                    .unwrap_or_else(|| "query rejected".to_string()),
            ));
        }
        Ok(envelope)
    }

    /// Follows `getResultUrl` while the statement is still running.
    async fn await_result(
        &self,
        session: &WarehouseSession,
        mut envelope: Envelope,
    ) -> Result<QueryData> {
        loop {
            let data: QueryData = match envelope.data {
                Some(value) => serde_json::from_value(value)?,
                None => QueryData::default(),
            };

            let in_progress = envelope
                .code
                .as_deref()
                .is_some_and(|code| QUERY_IN_PROGRESS.contains(&code));
            if !in_progress {
                return Ok(data);
            }

            let Some(path) = data.get_result_url else {
                return Err(IntervaiewError::Query(
                    "query still running but no result URL was returned".to_string(),
                ));
            };

            tokio::time::sleep(RESULT_POLL_INTERVAL).await;
            tracing::debug!(%path, "Polling for Snowflake query result");

            let response = self
                .client
                .get(self.result_url(&path))
                .header("Accept", "application/json")
                .header("Authorization", Self::auth_header(session))
                .send()
                .await
                .map_err(|e| IntervaiewError::Query(format!("result request failed: {e}")))?;
            envelope = Self::read_query_envelope(response).await?;
        }
    }

    fn login_body(&self) -> Value {
        json!({
            "data": {
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
                "ACCOUNT_NAME": account_name(&self.credentials.account),
                "LOGIN_NAME": self.credentials.username,
                "PASSWORD": self.credentials.password,
            }
        })
    }
}

/// The account locator without its region/cloud suffix.
fn account_name(account: &str) -> &str {
    account.split('.').next().unwrap_or(account)
}

/// Snowflake returns cells as JSON strings; anything else is rendered as JSON text.
fn scalar_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn first_scalar(data: QueryData) -> Option<String> {
    data.rowset
        .first()
        .and_then(|row| row.first())
        .and_then(scalar_to_text)
}

#[async_trait]
impl Warehouse for SnowflakeTransport {
    async fn connect(&self) -> Result<WarehouseSession> {
        if self.credentials.account.is_empty() {
            return Err(IntervaiewError::Connection(
                "no Snowflake account configured".to_string(),
            ));
        }

        let url = format!("{}/session/v1/login-request", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[
                ("warehouse", self.credentials.warehouse.as_str()),
                ("databaseName", self.credentials.database.as_str()),
                ("schemaName", self.credentials.schema.as_str()),
            ])
            .header("Accept", "application/json")
            .json(&self.login_body())
            .send()
            .await
            .map_err(|e| IntervaiewError::Connection(format!("login request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(IntervaiewError::Connection(format!(
                "login returned HTTP {}",
                response.status()
            )));
        }

        let envelope: Envelope = response
            .json()
            .await
            .map_err(|e| IntervaiewError::Connection(format!("unreadable login response: {e}")))?;
        if !envelope.success {
            return Err(IntervaiewError::Connection(
                envelope
                    .message
                    .unwrap_or_else(|| "login rejected".to_string()),
            ));
        }

        let data: LoginData = serde_json::from_value(envelope.data.unwrap_or(Value::Null))
            .map_err(|e| IntervaiewError::Connection(format!("login response lacks token: {e}")))?;

        tracing::info!(
            account = %self.credentials.account,
            warehouse = %self.credentials.warehouse,
            "Snowflake session established"
        );
        Ok(WarehouseSession { token: data.token })
    }

    async fn query_scalar(&self, session: &WarehouseSession, sql: &str) -> Result<Option<String>> {
        let sequence_id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let request_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/queries/v1/query-request", self.base_url);
        let body = QueryRequest {
            sql_text: sql,
            async_exec: false,
            sequence_id,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };

        tracing::debug!(sequence_id, sql_len = sql.len(), "Submitting Snowflake query");

        let response = self
            .client
            .post(&url)
            .query(&[("requestId", request_id.as_str())])
            .header("Accept", "application/json")
            .header("Authorization", Self::auth_header(session))
            .json(&body)
            .send()
            .await
            .map_err(|e| IntervaiewError::Query(format!("query request failed: {e}")))?;

        let envelope = Self::read_query_envelope(response).await?;
        let data = self.await_result(session, envelope).await?;
        Ok(first_scalar(data))
    }
}
