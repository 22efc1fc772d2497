use crate::client::{CoordinationClient, RangeRequest};
use crate::config::EtcdConfig;
use crate::wrapper::to_kdb_error;
use etcd_client::{Client, ConnectOptions, GetOptions, KvClient, Txn, TxnOp};
use kdb::errors::{ErrorKind, KdbError, KdbResult};
use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};

/// etcd operations allowed in one transaction by a default server.
const MAX_TXN_OPS: usize = 128;

/// Blocking etcd v3 client.
///
/// Requests run on a private single-worker tokio runtime; callers on any
/// thread block until their request completes.
pub struct EtcdClient {
    runtime: Runtime,
    client: Mutex<Option<Client>>,
}

impl EtcdClient {
    pub fn connect(config: &EtcdConfig) -> KdbResult<EtcdClient> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("kdb-etcd")
            .enable_all()
            .build()
            .map_err(|err| {
                log::error!("Failed to start etcd runtime: {}", err);
                KdbError::new_with_cause("failed to start etcd runtime", ErrorKind::Internal, err)
            })?;

        let options = config.username().map(|username| {
            ConnectOptions::new().with_user(username, config.password().unwrap_or_default())
        });
        let client = runtime
            .block_on(Client::connect(config.endpoints(), options))
            .map_err(|err| {
                log::error!("Failed to connect to etcd {:?}: {}", config.endpoints(), err);
                to_kdb_error("connect", err)
            })?;
        log::debug!("connected to etcd {:?}", config.endpoints());

        Ok(EtcdClient {
            runtime,
            client: Mutex::new(Some(client)),
        })
    }

    fn kv(&self) -> KdbResult<KvClient> {
        match self.client.lock().as_ref() {
            Some(client) => Ok(client.kv_client()),
            None => Err(KdbError::new("etcd client is closed", ErrorKind::StoreClosed)),
        }
    }
}

impl CoordinationClient for EtcdClient {
    fn get(&self, key: &str) -> KdbResult<Option<Vec<u8>>> {
        let mut kv = self.kv()?;
        let response = self
            .runtime
            .block_on(kv.get(key, None))
            .map_err(|err| to_kdb_error("get", err))?;
        Ok(response.kvs().first().map(|pair| pair.value().to_vec()))
    }

    fn put(&self, key: &str, value: &[u8]) -> KdbResult<()> {
        let mut kv = self.kv()?;
        self.runtime
            .block_on(kv.put(key, value, None))
            .map_err(|err| to_kdb_error("put", err))?;
        Ok(())
    }

    fn delete(&self, keys: &[String]) -> KdbResult<()> {
        let mut kv = self.kv()?;
        for chunk in keys.chunks(MAX_TXN_OPS) {
            let ops: Vec<TxnOp> = chunk
                .iter()
                .map(|key| TxnOp::delete(key.as_str(), None))
                .collect();
            self.runtime
                .block_on(kv.txn(Txn::new().and_then(ops)))
                .map_err(|err| to_kdb_error("delete", err))?;
        }
        Ok(())
    }

    fn range(&self, request: &RangeRequest) -> KdbResult<Vec<(String, Vec<u8>)>> {
        let mut kv = self.kv()?;
        // etcd rejects an empty key; "\0" is the smallest key
        let start = if request.start.is_empty() {
            "\0"
        } else {
            request.start.as_str()
        };
        let mut options = GetOptions::new().with_limit(request.limit);
        options = match &request.end {
            Some(end) => options.with_range(end.as_str()),
            None => options.with_from_key(),
        };
        if request.keys_only {
            options = options.with_keys_only();
        }

        let response = self
            .runtime
            .block_on(kv.get(start, Some(options)))
            .map_err(|err| to_kdb_error("range", err))?;
        response
            .kvs()
            .iter()
            .map(|pair| {
                let key = pair.key_str().map_err(|err| to_kdb_error("range", err))?;
                Ok((key.to_string(), pair.value().to_vec()))
            })
            .collect()
    }

    fn close(&self) -> KdbResult<()> {
        self.client.lock().take();
        Ok(())
    }
}
