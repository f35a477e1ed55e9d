//! Redis-backed saga state store.
//!
//! Saga records are short-lived and looked up by id, so they live in a
//! key-value store as JSON values. Updates go through a Lua script that
//! compares the embedded version counter before overwriting, giving the
//! same compare-and-swap discipline as the in-memory store. Terminal
//! records get a TTL as their retention window.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::SagaId;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};

use crate::instance::SagaInstance;
use crate::store::SagaStore;
use crate::{Result, SagaError};

/// Compare-and-swap update: overwrite only when the stored version
/// matches, applying a TTL when requested.
const CAS_UPDATE_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then
    return -1
end
local decoded = cjson.decode(current)
if decoded['version'] ~= tonumber(ARGV[1]) then
    return -2
end
redis.call('SET', KEYS[1], ARGV[2])
local ttl = tonumber(ARGV[3])
if ttl > 0 then
    redis.call('EXPIRE', KEYS[1], ttl)
end
return 0
"#;

/// Redis saga state store.
#[derive(Clone)]
pub struct RedisSagaStore {
    conn: ConnectionManager,
    key_prefix: String,
    /// Retention window applied to terminal records. Zero disables expiry.
    terminal_ttl: Duration,
    cas_update: Script,
}

impl RedisSagaStore {
    /// Default retention window for terminal sagas.
    pub const DEFAULT_TERMINAL_TTL: Duration = Duration::from_secs(3600);

    /// Connects to Redis at the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::with_connection(conn))
    }

    /// Builds a store over an existing connection.
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: "saga".to_string(),
            terminal_ttl: Self::DEFAULT_TERMINAL_TTL,
            cas_update: Script::new(CAS_UPDATE_SCRIPT),
        }
    }

    /// Overrides the key prefix (useful for test isolation).
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Overrides the terminal-record retention window.
    pub fn with_terminal_ttl(mut self, ttl: Duration) -> Self {
        self.terminal_ttl = ttl;
        self
    }

    fn key(&self, saga_id: SagaId) -> String {
        format!("{}:{}", self.key_prefix, saga_id)
    }

    fn ttl_for(&self, instance: &SagaInstance) -> u64 {
        if instance.status().is_terminal() {
            self.terminal_ttl.as_secs()
        } else {
            0
        }
    }
}

#[async_trait]
impl SagaStore for RedisSagaStore {
    async fn insert(&self, instance: &SagaInstance) -> Result<()> {
        let json = serde_json::to_string(instance)?;
        let mut conn = self.conn.clone();

        let created: Option<String> = redis::cmd("SET")
            .arg(self.key(instance.saga_id()))
            .arg(json)
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if created.is_none() {
            return Err(SagaError::AlreadyExists(instance.saga_id()));
        }
        Ok(())
    }

    async fn update(&self, instance: &mut SagaInstance) -> Result<()> {
        let expected_version = instance.version;
        let mut next = instance.clone();
        next.version += 1;
        let json = serde_json::to_string(&next)?;

        let mut conn = self.conn.clone();
        let result: i64 = self
            .cas_update
            .key(self.key(instance.saga_id()))
            .arg(expected_version)
            .arg(json)
            .arg(self.ttl_for(&next))
            .invoke_async(&mut conn)
            .await?;

        match result {
            0 => {
                *instance = next;
                Ok(())
            }
            -1 => Err(SagaError::NotFound(instance.saga_id())),
            _ => Err(SagaError::VersionConflict(instance.saga_id())),
        }
    }

    async fn get(&self, saga_id: SagaId) -> Result<Option<SagaInstance>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.key(saga_id)).await?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn find_stale(&self, cutoff: DateTime<Utc>) -> Result<Vec<SagaInstance>> {
        let mut conn = self.conn.clone();

        let mut keys = Vec::new();
        {
            let mut iter = conn
                .scan_match::<String, String>(format!("{}:*", self.key_prefix))
                .await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }

        let mut stale = Vec::new();
        for key in keys {
            // The record may have expired between SCAN and GET.
            let json: Option<String> = conn.get(&key).await?;
            let Some(json) = json else { continue };
            let instance: SagaInstance = serde_json::from_str(&json)?;
            if !instance.status().is_terminal() && instance.updated_at() < cutoff {
                stale.push(instance);
            }
        }
        stale.sort_by_key(|s| s.updated_at());
        Ok(stale)
    }
}
