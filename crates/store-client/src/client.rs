//! Redis-backed store client.

use redis::{aio::MultiplexedConnection, AsyncCommands, Client, Script};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::{LockLease, StoreOps};
use async_trait::async_trait;

/// Deletes the lock key only while the caller's token still owns it.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Store client over a single multiplexed Redis connection.
///
/// The connection handle is cloned per call; clones share the one underlying
/// pipeline, so every workload task multiplexes onto the same connection.
pub struct RedisStore {
    conn: MultiplexedConnection,
    release: Script,
}

impl RedisStore {
    /// Connect to Redis. A failure here is fatal to startup.
    pub async fn connect(redis_url: &str) -> StoreResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Connection(format!("invalid store url: {}", e)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(format!("store connection failed: {}", e)))?;

        Ok(Self {
            conn,
            release: Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl StoreOps for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, expire: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        match expire {
            Some(ttl) => {
                let _: () = conn.pset_ex(key, value, ttl.as_millis() as u64).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = conn.mget(keys).await?;
        Ok(values)
    }

    async fn add_to_set(&self, collection: &str, members: &[String]) -> StoreResult<()> {
        if members.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let _: i64 = conn.sadd(collection, members).await?;
        Ok(())
    }

    async fn set_members(&self, collection: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(collection).await?;
        Ok(members)
    }

    async fn acquire_lock(&self, name: &str, lease: Duration) -> StoreResult<Option<LockLease>> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();

        // SET NX PX: one round trip that both claims the lock and arms the
        // server-side lease expiry.
        let reply: Option<String> = redis::cmd("SET")
            .arg(name)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(lease.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| LockLease {
            name: name.to_string(),
            token,
        }))
    }

    async fn release_lock(&self, lease: &LockLease) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let released: i64 = self
            .release
            .key(&lease.name)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await?;

        if released == 0 {
            // Lease expired before release; the store already reclaimed it.
            debug!(lock = %lease.name, "release found no matching lease");
        }
        Ok(())
    }
}
