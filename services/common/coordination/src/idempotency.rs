use std::time::Duration;

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use serde_json::Value;
use tokio::time::sleep;

/// Sentinel stored while the first writer is still doing the work.
pub const PROCESSING_MARKER: &str = r#"{"status":"processing"}"#;

const POLL_ATTEMPTS: u32 = 15;
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const MAX_CLIENT_KEY_LEN: usize = 128;

/// Normalizes a client-supplied idempotency key: trimmed, truncated to 128
/// characters; empty or missing becomes `None` (the request is then not
/// idempotent).
pub fn normalize_client_key(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.chars().count() > MAX_CLIENT_KEY_LEN {
        return Some(trimmed.chars().take(MAX_CLIENT_KEY_LEN).collect());
    }
    Some(trimmed.to_string())
}

/// Outcome of an atomic claim on an idempotency cache key.
#[derive(Debug)]
pub enum Claim {
    /// No prior record: the caller is the first writer and must do the work.
    FirstWriter,
    /// Another worker holds the processing marker; poll for its result.
    Pending,
    /// A completed response is cached; return it verbatim.
    Hit(Value),
}

/// Two-phase idempotency cache: a `processing` marker is claimed atomically,
/// then replaced by the final JSON response. Markers expire at TTL so a
/// crashed first writer cannot strand retries.
#[derive(Clone)]
pub struct IdempotencyStore {
    manager: ConnectionManager,
}

impl IdempotencyStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;
        let manager = ConnectionManager::new(client)
            .await
            .context("Failed to create Redis connection manager")?;
        Ok(Self::new(manager))
    }

    /// Atomically claims `cache_key`. Exactly one concurrent caller observes
    /// `FirstWriter`; the rest see `Pending` until the response is stored.
    pub async fn claim(&self, cache_key: &str, ttl_ms: u64) -> Result<Claim> {
        let mut conn = self.manager.clone();
        let claimed: Option<String> = redis::cmd("SET")
            .arg(cache_key)
            .arg(PROCESSING_MARKER)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if claimed.is_some() {
            return Ok(Claim::FirstWriter);
        }
        match self.get(cache_key).await? {
            None => Ok(Claim::Pending),
            Some(value) => Ok(Claim::Hit(value)),
        }
    }

    /// Reads the cached final response. `None` means absent or still
    /// processing.
    pub async fn get(&self, cache_key: &str) -> Result<Option<Value>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(cache_key)
            .query_async(&mut conn)
            .await?;
        match raw {
            None => Ok(None),
            Some(ref s) if s == PROCESSING_MARKER => Ok(None),
            Some(s) => {
                let value = serde_json::from_str(&s)
                    .with_context(|| format!("Malformed idempotency cache entry at {cache_key}"))?;
                Ok(Some(value))
            }
        }
    }

    /// Polls for the first writer's response, up to 15 attempts at 100 ms.
    /// `None` means the polling budget ran out while the marker was still
    /// processing; the caller should fail with a retry hint.
    pub async fn await_result(&self, cache_key: &str) -> Result<Option<Value>> {
        for _ in 0..POLL_ATTEMPTS {
            sleep(POLL_INTERVAL).await;
            if let Some(value) = self.get(cache_key).await? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Replaces the processing marker with the final response.
    pub async fn store(&self, cache_key: &str, response: &Value, ttl_ms: u64) -> Result<()> {
        let mut conn = self.manager.clone();
        let body = serde_json::to_string(response)?;
        let _: () = redis::cmd("SET")
            .arg(cache_key)
            .arg(body)
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Deletes the marker so the next retry may attempt the work afresh.
    /// Called by the claimant when the work failed.
    pub async fn clear(&self, cache_key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("DEL").arg(cache_key).query_async(&mut conn).await?;
        Ok(())
    }
}
