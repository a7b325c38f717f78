use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use super::locator::{RemoteLocation, ServerKey};
use crate::error::TransferError;

pub const DEFAULT_CONNECT_ATTEMPTS: usize = 2;

/// Moves whole files between the local disk and remote locations.
pub trait RemoteTransport: Send + Sync {
    /// Copies `local` to `location.full_path`.
    fn upload(&self, local: &Path, location: &RemoteLocation) -> Result<(), TransferError>;

    /// Copies `location.full_path` into `local_dir`, returning the local path.
    fn download(&self, location: &RemoteLocation, local_dir: &Path)
        -> Result<PathBuf, TransferError>;
}

/// An authenticated session with one server.
pub trait Connection: Send + Sync {
    fn upload(&self, local: &Path, remote_path: &str) -> Result<(), TransferError>;
    fn download(&self, remote_path: &str, local: &Path) -> Result<(), TransferError>;
}

/// Opens new sessions.
pub trait Connector: Send + Sync {
    fn connect(&self, location: &RemoteLocation) -> Result<Arc<dyn Connection>, TransferError>;
}

type SessionSlot = Arc<OnceCell<Arc<dyn Connection>>>;

/// Keeps at most one open session per server.
///
/// Each server has its own slot, so a slow connect only blocks callers that
/// want the same server.
pub struct ConnectionPool {
    connector: Box<dyn Connector>,
    attempts: usize,
    sessions: Mutex<HashMap<ServerKey, SessionSlot>>,
}

impl ConnectionPool {
    pub fn new(connector: impl Connector + 'static) -> Self {
        ConnectionPool {
            connector: Box::new(connector),
            attempts: DEFAULT_CONNECT_ATTEMPTS,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_attempts(mut self, attempts: usize) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Returns the cached session for the location's server, connecting when
    /// there is none. Concurrent callers for the same server wait for a
    /// single connect instead of opening sessions of their own.
    pub fn session(&self, location: &RemoteLocation) -> Result<Arc<dyn Connection>, TransferError> {
        let key = location.server();
        let slot = Arc::clone(self.lock().entry(key.clone()).or_default());
        slot.get_or_try_init(|| self.connect(location, &key))
            .map(Arc::clone)
    }

    fn connect(
        &self,
        location: &RemoteLocation,
        key: &ServerKey,
    ) -> Result<Arc<dyn Connection>, TransferError> {
        let mut last_error = None;
        for attempt in 1..=self.attempts {
            match self.connector.connect(location) {
                Ok(session) => {
                    info!(server = %key, attempt, "connected");
                    return Ok(session);
                }
                Err(e) => {
                    warn!(server = %key, attempt, error = %e, "connection attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| TransferError::Connection {
            host: location.host.clone(),
            port: location.port,
            message: "no connection attempt was made".to_string(),
        }))
    }

    /// Drops the cached session for `server`, if any. A connect still in
    /// progress is left alone.
    pub fn evict(&self, server: &ServerKey) {
        let mut sessions = self.lock();
        if sessions.get(server).is_some_and(|slot| slot.get().is_some()) {
            sessions.remove(server);
            debug!(%server, "evicted session");
        }
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ServerKey, SessionSlot>> {
        match self.sessions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// [`RemoteTransport`] on top of a [`ConnectionPool`]. A session whose
/// transfer fails is evicted so the next call reconnects.
pub struct PooledTransport {
    pool: ConnectionPool,
}

impl PooledTransport {
    pub fn new(pool: ConnectionPool) -> Self {
        PooledTransport { pool }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn with_session<T>(
        &self,
        location: &RemoteLocation,
        transfer: impl FnOnce(&dyn Connection) -> Result<T, TransferError>,
    ) -> Result<T, TransferError> {
        let session = self.pool.session(location)?;
        let result = transfer(session.as_ref());
        if result.is_err() {
            self.pool.evict(&location.server());
        }
        result
    }
}

impl RemoteTransport for PooledTransport {
    fn upload(&self, local: &Path, location: &RemoteLocation) -> Result<(), TransferError> {
        debug!(local = %local.display(), remote = %location.full_path, "uploading");
        self.with_session(location, |session| {
            session.upload(local, &location.full_path)
        })
    }

    fn download(
        &self,
        location: &RemoteLocation,
        local_dir: &Path,
    ) -> Result<PathBuf, TransferError> {
        std::fs::create_dir_all(local_dir)?;
        let local = local_dir.join(&location.remote_file);
        debug!(remote = %location.full_path, local = %local.display(), "downloading");
        self.with_session(location, |session| {
            session.download(&location.full_path, &local)
        })?;
        Ok(local)
    }
}
