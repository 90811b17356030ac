use std::collections::BTreeMap;

use crate::aggregate::{self, ProcessBound, ResultSet};
use crate::error::{EntityKind, HapError};
use crate::handle::BackendHandle;
use crate::tables::BACKEND_METRICS;

use super::{Server, fold_metric, group_by_name};

/// A backend across every process that runs it.
#[derive(Debug, Clone)]
pub struct Backend {
    name: String,
    handles: Vec<BackendHandle>,
}

impl Backend {
    pub(crate) fn new(name: String, handles: Vec<BackendHandle>) -> Self {
        Self { name, handles }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handles(&self) -> &[BackendHandle] {
        &self.handles
    }

    pub fn process_nums(&self) -> Vec<u32> {
        self.handles.iter().map(ProcessBound::process_num).collect()
    }

    pub async fn id(&self) -> Result<u32, HapError> {
        let first = self.handles.first().ok_or(HapError::NoEndpoints)?;
        first.id().await
    }

    pub async fn metric(&self, name: &str) -> Result<i128, HapError> {
        fold_metric(&self.handles, name, BACKEND_METRICS, async |h: &BackendHandle| {
            h.metric(name).await
        })
        .await
    }

    /// Total sessions (`stot`).
    pub async fn requests(&self) -> Result<i128, HapError> {
        self.metric("stot").await
    }

    pub async fn requests_per_process(&self) -> Result<ResultSet<String>, HapError> {
        aggregate::run_across(&self.handles, async |h: &BackendHandle| h.metric("stot").await).await
    }

    pub async fn stats_per_process(&self) -> Result<ResultSet<BTreeMap<String, String>>, HapError> {
        aggregate::run_across(&self.handles, async |h: &BackendHandle| h.stats().await).await
    }

    pub async fn status(&self) -> Result<String, HapError> {
        let results =
            aggregate::run_across(&self.handles, async |h: &BackendHandle| h.metric("status").await)
                .await?;
        aggregate::reduce_consistent(results)
    }

    /// Servers of this backend, or just the named one, across processes.
    pub async fn servers(&self, name: Option<&str>) -> Result<Vec<Server>, HapError> {
        let mut per_process = Vec::new();
        for handle in &self.handles {
            per_process.extend(handle.servers(name).await?);
        }
        Ok(group_by_name(per_process, |s| s.name())
            .into_iter()
            .map(|(server, handles)| Server::new(server, self.name.clone(), handles))
            .collect())
    }

    pub async fn server(&self, name: &str) -> Result<Server, HapError> {
        self.servers(Some(name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| HapError::NotFound {
                kind: EntityKind::Server,
                name: format!("{}/{name}", self.name),
                endpoint: "any process".to_string(),
            })
    }
}
