use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Script;

/// Owner-checked compare-and-delete. Deleting unconditionally would let a
/// slow worker drop a lock a later owner re-acquired after TTL expiry.
const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

/// Advisory lock service over Redis. `acquire` is a single atomic
/// set-if-absent with a millisecond TTL; there is exactly one winner per key.
/// Locks disappear at TTL without any process running, so callers must treat
/// absence as "expired or released" and re-verify against the database.
#[derive(Clone)]
pub struct LockService {
    manager: ConnectionManager,
}

impl LockService {
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

    /// Returns true iff the caller now owns `key`.
    pub async fn acquire(&self, key: &str, owner: &str, ttl_ms: u64) -> Result<bool> {
        let mut conn = self.manager.clone();
        let outcome: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        Ok(outcome.is_some())
    }

    /// Releases `key` only if its stored value still equals `owner`.
    pub async fn release(&self, key: &str, owner: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _deleted: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Unconditional delete of a list of keys. Used after all owners were
    /// verified by the caller, or for best-effort reclaim in the reaper.
    pub async fn release_all(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        let _: () = redis::cmd("DEL").arg(keys).query_async(&mut conn).await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    /// Batched read preserving index order: result[i] is the value of keys[i].
    pub async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.manager.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }
}
