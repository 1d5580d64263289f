use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{IntervaiewError, Result};

/// Source of the USD to local-currency exchange rate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate(&self) -> Result<f64>;
}

/// HTTP rate service answering `{"data": {"<CURRENCY>": rate}}`.
pub struct CurrencyApi {
    client: Client,
    url: String,
    currency: String,
}

impl CurrencyApi {
    pub fn new(url: String, currency: String) -> Self {
        Self {
            client: Client::new(),
            url,
            currency,
        }
    }
}

#[async_trait]
impl RateSource for CurrencyApi {
    async fn fetch_rate(&self) -> Result<f64> {
        if self.url.is_empty() {
            return Err(IntervaiewError::RateFetch(
                "no currency API URL configured".to_string(),
            ));
        }

        let body: Value = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| IntervaiewError::RateFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| IntervaiewError::RateFetch(e.to_string()))?;

        body.get("data")
            .and_then(|data| data.get(&self.currency))
            .and_then(Value::as_f64)
            .ok_or_else(|| {
                IntervaiewError::RateFetch(format!("response has no data.{}", self.currency))
            })
    }
}

struct CachedRate {
    rate: f64,
    fetched_at: Instant,
}

/// Single-slot rate memo with a fixed staleness window.
///
/// A failed fetch resolves to the fallback rate, which is cached like a
/// fetched one.
pub struct RateCache {
    source: Arc<dyn RateSource>,
    ttl: Duration,
    fallback_rate: f64,
    slot: Mutex<Option<CachedRate>>,
}

impl RateCache {
    pub fn new(source: Arc<dyn RateSource>, ttl: Duration, fallback_rate: f64) -> Self {
        Self {
            source,
            ttl,
            fallback_rate,
            slot: Mutex::new(None),
        }
    }

    pub async fn rate(&self) -> f64 {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return cached.rate;
            }
        }

        let rate = match self.source.fetch_rate().await {
            Ok(rate) if rate.is_finite() && rate > 0.0 => {
                tracing::info!(rate, "Refreshed exchange rate");
                rate
            }
            Ok(rate) => {
                tracing::warn!(rate, "Ignoring unusable exchange rate, using fallback");
                self.fallback_rate
            }
            Err(e) => {
                tracing::warn!("{} - using fallback rate {}", e, self.fallback_rate);
                self.fallback_rate
            }
        };

        *slot = Some(CachedRate {
            rate,
            fetched_at: Instant::now(),
        });
        rate
    }

    /// Converts `amount` USD into the local currency.
    pub async fn get_usd_to_local(&self, amount: f64) -> f64 {
        amount * self.rate().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::get};
    use serde_json::json;

    const HOUR: Duration = Duration::from_secs(3600);

    #[tokio::test(start_paused = true)]
    async fn test_second_call_within_window_uses_cache() {
        let mut source = MockRateSource::new();
        source.expect_fetch_rate().times(1).returning(|| Ok(80.0));
        let cache = RateCache::new(Arc::new(source), HOUR, 85.4);

        assert!((cache.get_usd_to_local(2.0).await - 160.0).abs() < 1e-9);
        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!((cache.get_usd_to_local(1.0).await - 80.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetches_once_after_window() {
        let mut source = MockRateSource::new();
        let mut calls = 0;
        source.expect_fetch_rate().times(2).returning(move || {
            calls += 1;
            Ok(if calls == 1 { 80.0 } else { 82.5 })
        });
        let cache = RateCache::new(Arc::new(source), HOUR, 85.4);

        assert!((cache.rate().await - 80.0).abs() < 1e-9);
        tokio::time::advance(HOUR + Duration::from_secs(1)).await;
        assert!((cache.rate().await - 82.5).abs() < 1e-9);
        assert!((cache.rate().await - 82.5).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_failure_falls_back() {
        let mut source = MockRateSource::new();
        source
            .expect_fetch_rate()
            .times(1)
            .returning(|| Err(IntervaiewError::RateFetch("offline".to_string())));
        let cache = RateCache::new(Arc::new(source), HOUR, 85.4);

        assert!((cache.get_usd_to_local(1.0).await - 85.4).abs() < 1e-9);
        assert!((cache.get_usd_to_local(10.0).await - 854.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_positive_rate_falls_back() {
        let mut source = MockRateSource::new();
        source.expect_fetch_rate().times(1).returning(|| Ok(0.0));
        let cache = RateCache::new(Arc::new(source), HOUR, 85.4);
        assert!((cache.rate().await - 85.4).abs() < 1e-9);
    }

    async fn serve(body: Value) -> String {
        let app = Router::new().route(
            "/latest",
            get(move || {
                let body = body.clone();
                async move { Json(body) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/latest")
    }

    #[tokio::test]
    async fn test_currency_api_reads_rate() {
        let url = serve(json!({"data": {"INR": 83.25, "EUR": 0.92}})).await;
        let api = CurrencyApi::new(url, "INR".to_string());
        assert!((api.fetch_rate().await.unwrap() - 83.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_currency_api_missing_field() {
        let url = serve(json!({"data": {"EUR": 0.92}})).await;
        let api = CurrencyApi::new(url, "INR".to_string());
        assert!(matches!(
            api.fetch_rate().await,
            Err(IntervaiewError::RateFetch(_))
        ));
    }
}
