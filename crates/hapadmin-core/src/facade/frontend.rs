use std::collections::BTreeMap;

use crate::aggregate::{self, ProcessBound, ResultSet};
use crate::error::HapError;
use crate::handle::FrontendHandle;
use crate::tables::FRONTEND_METRICS;

use super::fold_metric;

/// A frontend across every process that runs it.
#[derive(Debug, Clone)]
pub struct Frontend {
    name: String,
    handles: Vec<FrontendHandle>,
}

impl Frontend {
    pub(crate) fn new(name: String, handles: Vec<FrontendHandle>) -> Self {
        Self { name, handles }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self) -> &[FrontendHandle] {
        &self.handles
    }

    pub fn process_nums(&self) -> Vec<u32> {
        self.handles.iter().map(ProcessBound::process_num).collect()
    }

    /// Proxy id as reported by the first process.
    pub async fn id(&self) -> Result<u32, HapError> {
        let first = self.handles.first().ok_or(HapError::NoEndpoints)?;
        first.id().await
    }

    /// Metric folded across processes; `name` must be a frontend metric.
    pub async fn metric(&self, name: &str) -> Result<i128, HapError> {
        fold_metric(&self.handles, name, FRONTEND_METRICS, async |h: &FrontendHandle| {
            h.metric(name).await
        })
        .await
    }

    pub async fn requests(&self) -> Result<i128, HapError> {
        self.metric("req_tot").await
    }

    pub async fn requests_per_process(&self) -> Result<ResultSet<String>, HapError> {
        aggregate::run_across(&self.handles, async |h: &FrontendHandle| h.metric("req_tot").await).await
    }

    pub async fn stats_per_process(&self) -> Result<ResultSet<BTreeMap<String, String>>, HapError> {
        aggregate::run_across(&self.handles, async |h: &FrontendHandle| h.stats().await).await
    }

    /// Status (`OPEN`, `STOP`, ...), which every process must agree on.
    pub async fn status(&self) -> Result<String, HapError> {
        let results =
            aggregate::run_across(&self.handles, async |h: &FrontendHandle| h.metric("status").await)
                .await?;
        aggregate::reduce_consistent(results)
    }

    /// Session limit (`slim`), summed over processes.
    pub async fn max_conn(&self) -> Result<i128, HapError> {
        self.metric("slim").await
    }

    pub async fn enable(&self) -> Result<bool, HapError> {
        self.run(&format!("enable frontend {}", self.name)).await
    }

    pub async fn disable(&self) -> Result<bool, HapError> {
        self.run(&format!("disable frontend {}", self.name)).await
    }

    pub async fn shutdown(&self) -> Result<bool, HapError> {
        self.run(&format!("shutdown frontend {}", self.name)).await
    }

    pub async fn set_max_conn(&self, value: u32) -> Result<bool, HapError> {
        self.run(&format!("set maxconn frontend {} {value}", self.name))
            .await
    }

    async fn run(&self, command: &str) -> Result<bool, HapError> {
        let results =
            aggregate::run_across(&self.handles, async |h: &FrontendHandle| h.command(command).await)
                .await?;
        aggregate::reduce_command(results)
    }
}
