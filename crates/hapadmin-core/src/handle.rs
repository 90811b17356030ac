//! Per-process references to frontends, backends and servers.
//!
//! A handle is identified by its endpoint and name. The numeric id it
//! carries is only a hint: HAProxy renumbers proxies and servers on reload,
//! so every access first tries the cached id, falls back to an unfiltered
//! lookup by name when the id no longer points at this object, and refreshes
//! the hint. An object missing from the unfiltered answer has left the
//! running configuration and surfaces as [`HapError::NotFound`].

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::aggregate::ProcessBound;
use crate::endpoint::Endpoint;
use crate::error::{EntityKind, HapError};
use crate::wire::Record;

async fn revalidate<F, Fut>(
    cached: &AtomicU32,
    id_field: &str,
    lookup: F,
    not_found: impl FnOnce() -> HapError,
) -> Result<Record, HapError>
where
    F: Fn(Option<u32>) -> Fut,
    Fut: Future<Output = Result<Option<Record>, HapError>>,
{
    let hint = cached.load(Ordering::Relaxed);
    let record = match lookup(Some(hint)).await? {
        Some(record) => record,
        None => {
            debug!(hint, "cached id is stale, looking up by name");
            lookup(None).await?.ok_or_else(not_found)?
        }
    };
    cached.store(record.id(id_field)?, Ordering::Relaxed);
    Ok(record)
}

/// A frontend on one process.
#[derive(Debug, Clone)]
pub struct FrontendHandle {
    endpoint: Arc<Endpoint>,
    name: String,
    iid: Arc<AtomicU32>,
}

impl FrontendHandle {
    pub fn new(endpoint: Arc<Endpoint>, name: &str, iid: u32) -> Self {
        Self {
            endpoint,
            name: name.to_string(),
            iid: Arc::new(AtomicU32::new(iid)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    async fn lookup(&self, iid: Option<u32>) -> Result<Option<Record>, HapError> {
        Ok(self.endpoint.frontend_table(iid).await?.remove(&self.name))
    }

    /// Current stats row, revalidating the cached id.
    pub async fn record(&self) -> Result<Record, HapError> {
        revalidate(
            &self.iid,
            "iid",
            |iid| self.lookup(iid),
            || HapError::NotFound {
                kind: EntityKind::Frontend,
                name: self.name.clone(),
                endpoint: self.endpoint.address(),
            },
        )
        .await
    }

    /// Proxy id, revalidated.
    pub async fn id(&self) -> Result<u32, HapError> {
        Ok(self.record().await?.id("iid")?)
    }

    pub async fn stats(&self) -> Result<BTreeMap<String, String>, HapError> {
        Ok(self.record().await?.to_map())
    }

    pub async fn metric(&self, field: &str) -> Result<String, HapError> {
        Ok(self.record().await?.get(field)?.to_string())
    }

    pub async fn command(&self, command: &str) -> Result<String, HapError> {
        self.endpoint.command(command).await
    }
}

impl ProcessBound for FrontendHandle {
    fn process_num(&self) -> u32 {
        self.endpoint.process_num()
    }
}

/// A backend on one process.
#[derive(Debug, Clone)]
pub struct BackendHandle {
    endpoint: Arc<Endpoint>,
    name: String,
    iid: Arc<AtomicU32>,
}

impl BackendHandle {
    pub fn new(endpoint: Arc<Endpoint>, name: &str, iid: u32) -> Self {
        Self {
            endpoint,
            name: name.to_string(),
            iid: Arc::new(AtomicU32::new(iid)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }

    async fn lookup(&self, iid: Option<u32>) -> Result<Option<Record>, HapError> {
        let mut table = self.endpoint.backend_table(iid).await?;
        Ok(table.remove(&self.name).and_then(|entry| entry.stats))
    }

    pub async fn record(&self) -> Result<Record, HapError> {
        revalidate(
            &self.iid,
            "iid",
            |iid| self.lookup(iid),
            || HapError::NotFound {
                kind: EntityKind::Backend,
                name: self.name.clone(),
                endpoint: self.endpoint.address(),
            },
        )
        .await
    }

    pub async fn id(&self) -> Result<u32, HapError> {
        Ok(self.record().await?.id("iid")?)
    }

    pub async fn stats(&self) -> Result<BTreeMap<String, String>, HapError> {
        Ok(self.record().await?.to_map())
    }

    pub async fn metric(&self, field: &str) -> Result<String, HapError> {
        Ok(self.record().await?.get(field)?.to_string())
    }

    pub async fn command(&self, command: &str) -> Result<String, HapError> {
        self.endpoint.command(command).await
    }

    /// Handles for this backend's servers, or just the named one.
    pub async fn servers(&self, name: Option<&str>) -> Result<Vec<ServerHandle>, HapError> {
        let iid = self.id().await?;
        let table = self.endpoint.server_table(&self.name, Some(iid), None).await?;
        let mut handles = Vec::new();
        for (server, record) in &table {
            if name.is_some_and(|n| n != server) {
                continue;
            }
            handles.push(ServerHandle::new(self.clone(), server, record.id("sid")?));
        }
        Ok(handles)
    }
}

impl ProcessBound for BackendHandle {
    fn process_num(&self) -> u32 {
        self.endpoint.process_num()
    }
}

/// A server of a backend on one process.
///
/// Revalidation filters by the backend's revalidated id and the server's
/// cached id, falling back to an unfiltered lookup by name.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    backend: BackendHandle,
    name: String,
    sid: Arc<AtomicU32>,
}

impl ServerHandle {
    pub fn new(backend: BackendHandle, name: &str, sid: u32) -> Self {
        Self {
            backend,
            name: name.to_string(),
            sid: Arc::new(AtomicU32::new(sid)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &BackendHandle {
        &self.backend
    }

    pub fn endpoint(&self) -> &Arc<Endpoint> {
        self.backend.endpoint()
    }

    async fn lookup(&self, ids: Option<(u32, u32)>) -> Result<Option<Record>, HapError> {
        let (iid, sid) = ids.unzip();
        let mut table = self
            .endpoint()
            .server_table(self.backend.name(), iid, sid)
            .await?;
        Ok(table.remove(&self.name))
    }

    pub async fn record(&self) -> Result<Record, HapError> {
        let backend_iid = self.backend.id().await?;
        revalidate(
            &self.sid,
            "sid",
            |sid| self.lookup(sid.map(|sid| (backend_iid, sid))),
            || HapError::NotFound {
                kind: EntityKind::Server,
                name: format!("{}/{}", self.backend.name(), self.name),
                endpoint: self.endpoint().address(),
            },
        )
        .await
    }

    /// Server id, revalidated.
    pub async fn id(&self) -> Result<u32, HapError> {
        Ok(self.record().await?.id("sid")?)
    }

    pub async fn stats(&self) -> Result<BTreeMap<String, String>, HapError> {
        Ok(self.record().await?.to_map())
    }

    pub async fn metric(&self, field: &str) -> Result<String, HapError> {
        Ok(self.record().await?.get(field)?.to_string())
    }

    pub async fn command(&self, command: &str) -> Result<String, HapError> {
        self.endpoint().command(command).await
    }
}

impl ProcessBound for ServerHandle {
    fn process_num(&self) -> u32 {
        self.endpoint().process_num()
    }
}
