//! One HAProxy worker process behind one stats socket.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{EntityKind, HapError};
use crate::handle::{BackendHandle, FrontendHandle};
use crate::transport::{Channel, SocketAddress, SocketTransport, TransportOptions};
use crate::wire::{self, BackendEntry, InfoBlock, Record, StatTable, StatType};

/// Values of the info `Name` key that identify a HAProxy process.
pub const KNOWN_PRODUCT_NAMES: &[&str] = &["HAProxy", "hapee-lb"];

/// A connected HAProxy process.
///
/// The process ordinal is read from `show info` once, at construction, and
/// trusted for the endpoint's lifetime.
pub struct Endpoint {
    channel: Box<dyn Channel>,
    process_num: u32,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.channel.address())
            .field("process_num", &self.process_num)
            .finish()
    }
}

impl Endpoint {
    /// Connect to a stats socket and verify a HAProxy process owns it.
    pub async fn connect(address: SocketAddress, options: TransportOptions) -> Result<Self, HapError> {
        Self::from_channel(Box::new(SocketTransport::new(address, options))).await
    }

    /// Build an endpoint over an arbitrary channel.
    ///
    /// Fails with [`HapError::ApplicationMismatch`] when the info block does
    /// not name a known product.
    pub async fn from_channel(channel: Box<dyn Channel>) -> Result<Self, HapError> {
        let info = wire::parse_info(&channel.send("show info").await?);
        let address = channel.address();

        let name = info.get("Name");
        if !name.is_some_and(|n| KNOWN_PRODUCT_NAMES.contains(&n.as_str())) {
            return Err(HapError::ApplicationMismatch {
                endpoint: address,
                found: name.cloned(),
            });
        }

        let process_num = parse_info_number(&info, "Process_num", &address)?;
        info!(endpoint = %address, process_num, "connected to HAProxy process");
        Ok(Self {
            channel,
            process_num,
        })
    }

    pub fn address(&self) -> String {
        self.channel.address()
    }

    pub fn process_num(&self) -> u32 {
        self.process_num
    }

    /// Run a command and return every response line.
    pub async fn command_lines(&self, command: &str) -> Result<Vec<String>, HapError> {
        debug!(endpoint = %self.address(), command, "running command");
        Ok(self.channel.send(command).await?)
    }

    /// Run a command and return the first response line.
    pub async fn command(&self, command: &str) -> Result<String, HapError> {
        let lines = self.command_lines(command).await?;
        Ok(lines.into_iter().next().unwrap_or_default())
    }

    /// Fetch and decode `show info`.
    pub async fn info(&self) -> Result<InfoBlock, HapError> {
        Ok(wire::parse_info(&self.command_lines("show info").await?))
    }

    /// One key of `show info`.
    pub async fn info_value(&self, key: &str) -> Result<String, HapError> {
        let mut info = self.info().await?;
        info.remove(key).ok_or_else(|| HapError::NotFound {
            kind: EntityKind::InfoKey,
            name: key.to_string(),
            endpoint: self.address(),
        })
    }

    /// OS process id of the worker.
    pub async fn pid(&self) -> Result<u32, HapError> {
        let info = self.info().await?;
        parse_info_number(&info, "Pid", &self.address())
    }

    /// Fetch `show stat <iid> <kind> <sid>`; `None` ids mean no filter.
    pub async fn metric_table(
        &self,
        iid: Option<u32>,
        kind: StatType,
        sid: Option<u32>,
    ) -> Result<StatTable, HapError> {
        let command = format!("show stat {} {} {}", filter(iid), kind, filter(sid));
        let lines = self.command_lines(&command).await?;
        Ok(wire::parse_table(&lines)?)
    }

    pub async fn frontend_table(&self, iid: Option<u32>) -> Result<BTreeMap<String, Record>, HapError> {
        Ok(self.metric_table(iid, StatType::FRONTEND, None).await?.frontends)
    }

    pub async fn backend_table(
        &self,
        iid: Option<u32>,
    ) -> Result<BTreeMap<String, BackendEntry>, HapError> {
        Ok(self.metric_table(iid, StatType::BACKEND, None).await?.backends)
    }

    /// Servers of `backend`; empty when the backend is absent from the answer.
    pub async fn server_table(
        &self,
        backend: &str,
        iid: Option<u32>,
        sid: Option<u32>,
    ) -> Result<BTreeMap<String, Record>, HapError> {
        let mut table = self
            .metric_table(iid, StatType::BACKEND | StatType::SERVER, sid)
            .await?;
        Ok(table
            .backends
            .remove(backend)
            .map(|entry| entry.servers)
            .unwrap_or_default())
    }

    /// Handles for this process's frontends, or just the named one.
    pub async fn frontends(self: &Arc<Self>, name: Option<&str>) -> Result<Vec<FrontendHandle>, HapError> {
        let table = self.frontend_table(None).await?;
        let mut handles = Vec::new();
        for (frontend, record) in &table {
            if name.is_some_and(|n| n != frontend) {
                continue;
            }
            handles.push(FrontendHandle::new(Arc::clone(self), frontend, record.id("iid")?));
        }
        Ok(handles)
    }

    /// Handles for this process's backends, or just the named one.
    pub async fn backends(self: &Arc<Self>, name: Option<&str>) -> Result<Vec<BackendHandle>, HapError> {
        let table = self.backend_table(None).await?;
        let mut handles = Vec::new();
        for (backend, entry) in &table {
            if name.is_some_and(|n| n != backend) {
                continue;
            }
            let Some(stats) = &entry.stats else {
                debug!(backend, "backend listed without its own stats line");
                continue;
            };
            handles.push(BackendHandle::new(Arc::clone(self), backend, stats.id("iid")?));
        }
        Ok(handles)
    }
}

fn filter(id: Option<u32>) -> String {
    id.map_or_else(|| "-1".to_string(), |id| id.to_string())
}

fn parse_info_number(info: &InfoBlock, key: &str, endpoint: &str) -> Result<u32, HapError> {
    let value = info.get(key).ok_or_else(|| HapError::NotFound {
        kind: EntityKind::InfoKey,
        name: key.to_string(),
        endpoint: endpoint.to_string(),
    })?;
    value.trim().parse().map_err(|_| {
        HapError::Wire(wire::WireError::InvalidNumber {
            field: key.to_string(),
            value: value.clone(),
        })
    })
}
