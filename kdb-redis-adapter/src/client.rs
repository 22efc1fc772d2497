use crate::wrapper::to_kdb_error;
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use parking_lot::Mutex;
use redis::{Connection, RedisResult};

/// The raw cache primitives the redis store is built on.
///
/// Keys are the already encoded (hex) strings and values are the stored
/// payloads, compressed or not. [`RedisClient`] talks to a server;
/// [`InMemoryCacheClient`](crate::InMemoryCacheClient) keeps everything in
/// process.
pub trait CacheClient: Send + Sync {
    fn get(&self, key: &str) -> KdbResult<Option<Vec<u8>>>;

    /// Values of `keys` in order, `None` for the missing ones.
    fn mget(&self, keys: &[String]) -> KdbResult<Vec<Option<Vec<u8>>>>;

    /// Writes every entry in one transaction.
    fn set_all(&self, entries: &[(String, Vec<u8>)]) -> KdbResult<()>;

    fn del(&self, keys: &[String]) -> KdbResult<()>;

    /// One `SCAN` round: the next cursor (0 when done) and the matching keys
    /// of this round.
    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KdbResult<(u64, Vec<String>)>;

    fn close(&self) -> KdbResult<()>;
}

/// Synchronous redis connection. Commands are serialized on the single
/// connection.
pub struct RedisClient {
    connection: Mutex<Option<Connection>>,
}

impl RedisClient {
    /// Connects and pings the server.
    pub fn connect(url: &str) -> KdbResult<RedisClient> {
        let client = redis::Client::open(url).map_err(|err| {
            log::error!("Invalid redis url: {}", err);
            to_kdb_error("open", err)
        })?;
        let mut connection = client.get_connection().map_err(|err| {
            log::error!("Failed to connect to redis: {}", err);
            to_kdb_error("connect", err)
        })?;
        redis::cmd("PING")
            .query::<String>(&mut connection)
            .map_err(|err| {
                log::error!("Redis did not answer ping: {}", err);
                to_kdb_error("ping", err)
            })?;
        Ok(RedisClient {
            connection: Mutex::new(Some(connection)),
        })
    }

    fn with_connection<T, F>(&self, operation: &str, command: F) -> KdbResult<T>
    where
        F: FnOnce(&mut Connection) -> RedisResult<T>,
    {
        let mut guard = self.connection.lock();
        let connection = guard.as_mut().ok_or_else(|| {
            KdbError::new("redis connection is closed", ErrorKind::StoreClosed)
        })?;
        command(connection).map_err(|err| {
            log::error!("Redis {} failed: {}", operation, err);
            to_kdb_error(operation, err)
        })
    }
}

impl CacheClient for RedisClient {
    fn get(&self, key: &str) -> KdbResult<Option<Vec<u8>>> {
        self.with_connection("get", |connection| {
            redis::cmd("GET").arg(key).query(connection)
        })
    }

    fn mget(&self, keys: &[String]) -> KdbResult<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.with_connection("mget", |connection| {
            redis::cmd("MGET").arg(keys).query(connection)
        })
    }

    fn set_all(&self, entries: &[(String, Vec<u8>)]) -> KdbResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.with_connection("exec batch", |connection| {
            let mut pipe = redis::pipe();
            pipe.atomic();
            for (key, value) in entries {
                pipe.set(key, value.as_slice()).ignore();
            }
            pipe.query::<()>(connection)
        })
    }

    fn del(&self, keys: &[String]) -> KdbResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.with_connection("del", |connection| {
            redis::cmd("DEL").arg(keys).query::<i64>(connection)
        })
        .map(|_| ())
    }

    fn scan(&self, cursor: u64, pattern: &str, count: usize) -> KdbResult<(u64, Vec<String>)> {
        self.with_connection("scan", |connection| {
            redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query(connection)
        })
    }

    fn close(&self) -> KdbResult<()> {
        // dropping the connection closes the socket
        self.connection.lock().take();
        Ok(())
    }
}
