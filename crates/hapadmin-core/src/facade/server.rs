use std::collections::BTreeMap;

use crate::aggregate::{self, ProcessBound, ResultSet};
use crate::error::HapError;
use crate::handle::ServerHandle;
use crate::tables::{AddressChange, SERVER_METRICS};

use super::{ServerState, Weight, as_integer, fold_metric};

/// A server of one backend across every process that runs it.
#[derive(Debug, Clone)]
pub struct Server {
    name: String,
    backend_name: String,
    handles: Vec<ServerHandle>,
}

impl Server {
    pub(crate) fn new(name: String, backend_name: String, handles: Vec<ServerHandle>) -> Self {
        Self {
            name,
            backend_name,
            handles,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    pub fn handles(&self) -> &[ServerHandle] {
        &self.handles
    }

    pub fn process_nums(&self) -> Vec<u32> {
        self.handles.iter().map(ProcessBound::process_num).collect()
    }

    /// Server id as reported by the first process.
    pub async fn id(&self) -> Result<u32, HapError> {
        let first = self.handles.first().ok_or(HapError::NoEndpoints)?;
        first.id().await
    }

    pub async fn metric(&self, name: &str) -> Result<i128, HapError> {
        fold_metric(&self.handles, name, SERVER_METRICS, async |h: &ServerHandle| {
            h.metric(name).await
        })
        .await
    }

    pub async fn requests(&self) -> Result<i128, HapError> {
        self.metric("stot").await
    }

    pub async fn requests_per_process(&self) -> Result<ResultSet<String>, HapError> {
        aggregate::run_across(&self.handles, async |h: &ServerHandle| h.metric("stot").await).await
    }

    pub async fn stats_per_process(&self) -> Result<ResultSet<BTreeMap<String, String>>, HapError> {
        aggregate::run_across(&self.handles, async |h: &ServerHandle| h.stats().await).await
    }

    async fn consistent(&self, field: &str) -> Result<String, HapError> {
        let results =
            aggregate::run_across(&self.handles, async |h: &ServerHandle| h.metric(field).await)
                .await?;
        aggregate::reduce_consistent(results)
    }

    /// Status (`UP`, `DOWN`, `MAINT`, ...).
    pub async fn status(&self) -> Result<String, HapError> {
        self.consistent("status").await
    }

    /// Effective weight, which every process must agree on.
    pub async fn weight(&self) -> Result<i128, HapError> {
        as_integer("weight", self.consistent("weight").await?)
    }

    pub async fn check_status(&self) -> Result<String, HapError> {
        self.consistent("check_status").await
    }

    pub async fn check_code(&self) -> Result<String, HapError> {
        self.consistent("check_code").await
    }

    /// Last health check contents or textual error.
    pub async fn last_status(&self) -> Result<String, HapError> {
        self.consistent("last_chk").await
    }

    /// Last agent check contents or textual error.
    pub async fn last_agent_check(&self) -> Result<String, HapError> {
        self.consistent("last_agt").await
    }

    pub async fn set_weight(&self, weight: Weight) -> Result<bool, HapError> {
        self.run(&format!(
            "set weight {}/{} {weight}",
            self.backend_name, self.name
        ))
        .await
    }

    pub async fn set_state(&self, state: ServerState) -> Result<bool, HapError> {
        self.run(&state.command(&self.backend_name, &self.name))
            .await
    }

    /// Kill every session on this server.
    pub async fn shutdown(&self) -> Result<bool, HapError> {
        self.run(&format!(
            "shutdown sessions server {}/{}",
            self.backend_name, self.name
        ))
        .await
    }

    /// Change the server address and optionally its port.
    ///
    /// HAProxy reports success in prose; every success message for a port
    /// change also starts with an address-change success prefix.
    pub async fn set_address(&self, address: &str, port: Option<u16>) -> Result<bool, HapError> {
        let mut command = format!(
            "set server {}/{} addr {address}",
            self.backend_name, self.name
        );
        if let Some(port) = port {
            command.push_str(&format!(" port {port}"));
        }
        let results = self.outputs(&command).await?;
        aggregate::reduce_address_change(AddressChange::Address, results)
    }

    async fn outputs(&self, command: &str) -> Result<ResultSet<String>, HapError> {
        aggregate::run_across(&self.handles, async |h: &ServerHandle| h.command(command).await).await
    }

    async fn run(&self, command: &str) -> Result<bool, HapError> {
        aggregate::reduce_command(self.outputs(command).await?)
    }
}
