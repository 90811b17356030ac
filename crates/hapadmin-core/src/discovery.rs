//! Locating the stats sockets of every HAProxy process.

use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hapadmin_config::ConnectionConfig;
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::HapError;
use crate::transport::{RetryPolicy, SocketAddress, TransportOptions};

/// Where to find stats sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    /// Every UNIX socket in this directory that answers as HAProxy.
    Directory(PathBuf),
    /// One UNIX socket.
    File(PathBuf),
    /// TCP stats sockets.
    Addresses(Vec<SocketAddress>),
}

impl EndpointSource {
    /// Pick the source named by `config`, preferring directory, then file,
    /// then TCP addresses.
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, HapError> {
        if let Some(dir) = &config.socket_dir {
            return Ok(Self::Directory(PathBuf::from(dir)));
        }
        if let Some(file) = &config.socket_file {
            return Ok(Self::File(PathBuf::from(file)));
        }
        if !config.addresses.is_empty() {
            return Ok(Self::Addresses(
                config.addresses.iter().map(|a| SocketAddress::parse(a)).collect(),
            ));
        }
        Err(HapError::Discovery(
            "no socket_dir, socket_file or addresses configured".to_string(),
        ))
    }

    /// Connect to every process this source names, sorted by process ordinal.
    pub async fn connect(&self, options: TransportOptions) -> Result<Vec<Arc<Endpoint>>, HapError> {
        let mut endpoints = match self {
            Self::Directory(dir) => scan_directory(dir, options).await?,
            Self::File(path) => {
                let path = checked_socket(path).await?;
                vec![Endpoint::connect(SocketAddress::Unix(path), options).await?]
            }
            Self::Addresses(addresses) => {
                let mut endpoints = Vec::with_capacity(addresses.len());
                for address in addresses {
                    endpoints.push(Endpoint::connect(address.clone(), options).await?);
                }
                endpoints
            }
        };
        endpoints.sort_by_key(Endpoint::process_num);
        info!(count = endpoints.len(), "discovered HAProxy processes");
        Ok(endpoints.into_iter().map(Arc::new).collect())
    }
}

async fn checked_socket(path: &Path) -> Result<PathBuf, HapError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| HapError::Discovery(format!("{}: {e}", path.display())))?;
    if !metadata.file_type().is_socket() {
        return Err(HapError::Discovery(format!(
            "{} is not a UNIX socket",
            path.display()
        )));
    }
    tokio::fs::canonicalize(path)
        .await
        .map_err(|e| HapError::Discovery(format!("{}: {e}", path.display())))
}

async fn scan_directory(dir: &Path, options: TransportOptions) -> Result<Vec<Endpoint>, HapError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| HapError::Discovery(format!("{}: {e}", dir.display())))?;

    let probe = TransportOptions {
        retry: RetryPolicy::Never,
        ..options
    };
    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| HapError::Discovery(format!("{}: {e}", dir.display())))?
    {
        let is_socket = entry.file_type().await.is_ok_and(|t| t.is_socket());
        if !is_socket {
            continue;
        }
        let path = entry.path();
        match Endpoint::connect(SocketAddress::Unix(path.clone()), probe).await {
            Ok(_) => candidates.push(path),
            Err(e) => debug!(path = %path.display(), error = %e, "skipping socket"),
        }
    }
    candidates.sort();

    if candidates.is_empty() {
        return Err(HapError::Discovery(format!(
            "no HAProxy stats socket found in {}",
            dir.display()
        )));
    }

    let mut endpoints = Vec::with_capacity(candidates.len());
    for path in candidates {
        endpoints.push(Endpoint::connect(SocketAddress::Unix(path), options).await?);
    }
    Ok(endpoints)
}
