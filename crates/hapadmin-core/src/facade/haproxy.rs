use std::sync::Arc;

use hapadmin_config::ConnectionConfig;

use crate::aggregate::{self, ResultSet};
use crate::discovery::EndpointSource;
use crate::endpoint::Endpoint;
use crate::error::{EntityKind, HapError};
use crate::handle::{BackendHandle, FrontendHandle};
use crate::tables::PROCESS_METRICS;
use crate::transport::TransportOptions;
use crate::wire::InfoBlock;

use super::{Backend, Frontend, Server, TableId, as_integer, entry_key, fold_metric, group_by_name};

/// Every HAProxy process of one installation, driven as a whole.
///
/// Lookups group per-process handles by name; reads fold per-process
/// answers; writes run on every process and succeed only when they all
/// report success.
#[derive(Debug, Clone)]
pub struct HaProxy {
    endpoints: Vec<Arc<Endpoint>>,
}

impl HaProxy {
    /// Discover and connect to the processes named by `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, HapError> {
        let source = EndpointSource::from_config(config)?;
        Self::from_source(&source, TransportOptions::from(config)).await
    }

    pub async fn from_source(source: &EndpointSource, options: TransportOptions) -> Result<Self, HapError> {
        Self::from_endpoints(source.connect(options).await?)
    }

    pub fn from_endpoints(endpoints: Vec<Arc<Endpoint>>) -> Result<Self, HapError> {
        if endpoints.is_empty() {
            return Err(HapError::NoEndpoints);
        }
        Ok(Self { endpoints })
    }

    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    fn first(&self) -> Result<&Arc<Endpoint>, HapError> {
        self.endpoints.first().ok_or(HapError::NoEndpoints)
    }

    pub async fn frontends(&self, name: Option<&str>) -> Result<Vec<Frontend>, HapError> {
        let mut handles: Vec<FrontendHandle> = Vec::new();
        for endpoint in &self.endpoints {
            handles.extend(endpoint.frontends(name).await?);
        }
        Ok(group_by_name(handles, |h| h.name())
            .into_iter()
            .map(|(name, handles)| Frontend::new(name, handles))
            .collect())
    }

    pub async fn frontend(&self, name: &str) -> Result<Frontend, HapError> {
        self.frontends(Some(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(EntityKind::Frontend, name))
    }

    pub async fn backends(&self, name: Option<&str>) -> Result<Vec<Backend>, HapError> {
        let mut handles: Vec<BackendHandle> = Vec::new();
        for endpoint in &self.endpoints {
            handles.extend(endpoint.backends(name).await?);
        }
        Ok(group_by_name(handles, |h| h.name())
            .into_iter()
            .map(|(name, handles)| Backend::new(name, handles))
            .collect())
    }

    pub async fn backend(&self, name: &str) -> Result<Backend, HapError> {
        self.backends(Some(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(EntityKind::Backend, name))
    }

    /// Every server, optionally limited to one backend.
    pub async fn servers(&self, backend: Option<&str>) -> Result<Vec<Server>, HapError> {
        let mut servers = Vec::new();
        for backend in self.backends(backend).await? {
            servers.extend(backend.servers(None).await?);
        }
        Ok(servers)
    }

    /// Servers called `name`, one per backend that has such a member.
    pub async fn server(&self, name: &str, backend: Option<&str>) -> Result<Vec<Server>, HapError> {
        let mut servers = Vec::new();
        for backend in self.backends(backend).await? {
            servers.extend(backend.servers(Some(name)).await?);
        }
        if servers.is_empty() {
            return Err(not_found(EntityKind::Server, name));
        }
        Ok(servers)
    }

    /// Process-level metric from `show info`, folded across processes.
    pub async fn metric(&self, name: &str) -> Result<i128, HapError> {
        fold_metric(&self.endpoints, name, PROCESS_METRICS, async |e: &Arc<Endpoint>| {
            e.info_value(name).await
        })
        .await
    }

    pub async fn info(&self) -> Result<ResultSet<InfoBlock>, HapError> {
        aggregate::run_across(&self.endpoints, async |e: &Arc<Endpoint>| e.info().await).await
    }

    /// OS process ids, per process.
    pub async fn process_ids(&self) -> Result<ResultSet<u32>, HapError> {
        aggregate::run_across(&self.endpoints, async |e: &Arc<Endpoint>| e.pid().await).await
    }

    async fn consistent_info(&self, key: &str) -> Result<String, HapError> {
        let results =
            aggregate::run_across(&self.endpoints, async |e: &Arc<Endpoint>| e.info_value(key).await)
                .await?;
        aggregate::reduce_consistent(results)
    }

    pub async fn version(&self) -> Result<String, HapError> {
        self.consistent_info("Version").await
    }

    pub async fn release_date(&self) -> Result<String, HapError> {
        self.consistent_info("Release_date").await
    }

    pub async fn node_name(&self) -> Result<String, HapError> {
        self.consistent_info("node").await
    }

    pub async fn description(&self) -> Result<String, HapError> {
        self.consistent_info("description").await
    }

    /// Uptime of the first process, as HAProxy formats it (`0d 1h02m03s`).
    pub async fn uptime(&self) -> Result<String, HapError> {
        self.first()?.info_value("Uptime").await
    }

    pub async fn uptime_sec(&self) -> Result<i128, HapError> {
        as_integer("Uptime_sec", self.first()?.info_value("Uptime_sec").await?)
    }

    pub async fn max_conn(&self) -> Result<i128, HapError> {
        self.metric("Maxconn").await
    }

    pub async fn total_requests(&self) -> Result<i128, HapError> {
        self.metric("CumReq").await
    }

    pub async fn rate_limit_conn(&self) -> Result<i128, HapError> {
        self.metric("ConnRateLimit").await
    }

    pub async fn rate_limit_sess(&self) -> Result<i128, HapError> {
        self.metric("SessRateLimit").await
    }

    pub async fn rate_limit_ssl_sess(&self) -> Result<i128, HapError> {
        self.metric("SslRateLimit").await
    }

    /// Total requests over every frontend.
    pub async fn requests(&self) -> Result<i128, HapError> {
        let mut totals = Vec::new();
        for frontend in self.frontends(None).await? {
            totals.push(frontend.requests().await?);
        }
        aggregate::checked_sum("req_tot", totals)
    }

    /// Send `command` verbatim to every process and return the raw lines.
    pub async fn command(&self, command: &str) -> Result<ResultSet<Vec<String>>, HapError> {
        aggregate::run_across(&self.endpoints, async |e: &Arc<Endpoint>| {
            e.command_lines(command).await
        })
        .await
    }

    /// Last captured request and response errors, optionally for one proxy id.
    pub async fn errors(&self, iid: Option<u32>) -> Result<ResultSet<Vec<String>>, HapError> {
        match iid {
            Some(iid) => self.command(&format!("show errors {iid}")).await,
            None => self.command("show errors").await,
        }
    }

    pub async fn clear_counters(&self, all: bool) -> Result<bool, HapError> {
        if all {
            self.run("clear counters all").await
        } else {
            self.run("clear counters").await
        }
    }

    pub async fn set_max_conn(&self, value: u32) -> Result<bool, HapError> {
        self.run(&format!("set maxconn global {value}")).await
    }

    pub async fn set_rate_limit_conn(&self, value: u32) -> Result<bool, HapError> {
        self.run(&format!("set rate-limit connections global {value}"))
            .await
    }

    pub async fn set_rate_limit_sess(&self, value: u32) -> Result<bool, HapError> {
        self.run(&format!("set rate-limit sessions global {value}"))
            .await
    }

    pub async fn set_rate_limit_ssl_sess(&self, value: u32) -> Result<bool, HapError> {
        self.run(&format!("set rate-limit ssl-sessions global {value}"))
            .await
    }

    /// List the ACLs, or the entries of one ACL.
    pub async fn show_acl(&self, acl: Option<&TableId>) -> Result<Vec<String>, HapError> {
        match acl {
            Some(acl) => self.first_lines(&format!("show acl {acl}")).await,
            None => self.first_lines("show acl").await,
        }
    }

    pub async fn add_acl(&self, acl: &TableId, pattern: &str) -> Result<bool, HapError> {
        self.run(&format!("add acl {acl} {pattern}")).await
    }

    /// Delete an ACL entry by value or by `0x...` reference.
    pub async fn del_acl(&self, acl: &TableId, key: &str) -> Result<bool, HapError> {
        self.run(&format!("del acl {acl} {}", entry_key(key))).await
    }

    pub async fn clear_acl(&self, acl: &TableId) -> Result<bool, HapError> {
        self.run(&format!("clear acl {acl}")).await
    }

    /// Match `value` against an ACL, as the first process sees it.
    pub async fn get_acl(&self, acl: &TableId, value: &str) -> Result<String, HapError> {
        self.first_line(&format!("get acl {acl} {value}")).await
    }

    /// List the maps, or the entries of one map.
    pub async fn show_map(&self, map: Option<&TableId>) -> Result<Vec<String>, HapError> {
        match map {
            Some(map) => self.first_lines(&format!("show map {map}")).await,
            None => self.first_lines("show map").await,
        }
    }

    pub async fn add_map(&self, map: &TableId, key: &str, value: &str) -> Result<bool, HapError> {
        self.run(&format!("add map {map} {key} {value}")).await
    }

    pub async fn del_map(&self, map: &TableId, key: &str) -> Result<bool, HapError> {
        self.run(&format!("del map {map} {}", entry_key(key))).await
    }

    pub async fn clear_map(&self, map: &TableId) -> Result<bool, HapError> {
        self.run(&format!("clear map {map}")).await
    }

    pub async fn set_map(&self, map: &TableId, key: &str, value: &str) -> Result<bool, HapError> {
        self.run(&format!("set map {map} {} {value}", entry_key(key)))
            .await
    }

    pub async fn get_map(&self, map: &TableId, value: &str) -> Result<String, HapError> {
        self.first_line(&format!("get map {map} {value}")).await
    }

    async fn run(&self, command: &str) -> Result<bool, HapError> {
        let results =
            aggregate::run_across(&self.endpoints, async |e: &Arc<Endpoint>| e.command(command).await)
                .await?;
        aggregate::reduce_command(results)
    }

    /// Lines of `command` as the first process answers it, after running it
    /// everywhere. A lone blank line means an empty listing.
    async fn first_lines(&self, command: &str) -> Result<Vec<String>, HapError> {
        let (_, lines) = self
            .command(command)
            .await?
            .into_iter()
            .next()
            .ok_or(HapError::NoEndpoints)?;
        let lines = aggregate::check_output(lines)?;
        if lines.len() == 1 && lines[0].is_empty() {
            return Ok(Vec::new());
        }
        Ok(lines)
    }

    async fn first_line(&self, command: &str) -> Result<String, HapError> {
        let (_, lines) = self
            .command(command)
            .await?
            .into_iter()
            .next()
            .ok_or(HapError::NoEndpoints)?;
        let lines = aggregate::check_output(lines)?;
        Ok(lines.into_iter().next().unwrap_or_default())
    }
}

fn not_found(kind: EntityKind, name: &str) -> HapError {
    HapError::NotFound {
        kind,
        name: name.to_string(),
        endpoint: "any process".to_string(),
    }
}
