//! Cross-process objects.
//!
//! Each facade object owns one handle per process on which the object
//! exists, all sharing the same name. They are only built by discovery
//! (grouping per-process handles by name), never from arbitrary lists.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::aggregate::{self, ProcessBound};
use crate::error::HapError;

mod backend;
mod frontend;
mod haproxy;
mod server;

pub use backend::Backend;
pub use frontend::Frontend;
pub use haproxy::HaProxy;
pub use server::Server;

/// ACL or map identifier: a numeric id (`#<n>` on the wire) or the file
/// name it was loaded from. Any integer, negative ones included, is an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableId {
    Id(i64),
    File(String),
}

impl From<&str> for TableId {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::File(s.to_string()),
        }
    }
}

impl From<u32> for TableId {
    fn from(id: u32) -> Self {
        Self::Id(id.into())
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "#{id}"),
            Self::File(file) => f.write_str(file),
        }
    }
}

/// Entry keys given as `0x...` are entry references and need a `#` prefix.
pub(crate) fn entry_key(key: &str) -> String {
    if key.starts_with("0x") {
        format!("#{key}")
    } else {
        key.to_string()
    }
}

/// Server weight: absolute (0 to 256) or relative to the configured weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weight {
    Absolute(u16),
    Relative(u16),
}

impl Weight {
    pub const MAX: u16 = 256;

    pub fn absolute(weight: u16) -> Result<Self, HapError> {
        if weight > Self::MAX {
            return Err(HapError::InvalidArgument(format!(
                "absolute weight must be between 0 and {}, got {weight}",
                Self::MAX
            )));
        }
        Ok(Self::Absolute(weight))
    }
}

impl FromStr for Weight {
    type Err = HapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            HapError::InvalidArgument(format!(
                "weight must be an integer between 0 and {} or a percentage like 20%, got {s:?}",
                Self::MAX
            ))
        };
        match s.strip_suffix('%') {
            Some(percent) => Ok(Self::Relative(percent.parse().map_err(|_| invalid())?)),
            None => Self::absolute(s.parse().map_err(|_| invalid())?),
        }
    }
}

impl fmt::Display for Weight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(w) => write!(f, "{w}"),
            Self::Relative(p) => write!(f, "{p}%"),
        }
    }
}

/// Administrative state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Enable,
    Disable,
    Ready,
    Drain,
    Maint,
}

impl ServerState {
    pub const ALL: [Self; 5] = [
        Self::Enable,
        Self::Disable,
        Self::Ready,
        Self::Drain,
        Self::Maint,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Ready => "ready",
            Self::Drain => "drain",
            Self::Maint => "maint",
        }
    }

    /// The command that puts `backend/server` into this state.
    pub fn command(self, backend: &str, server: &str) -> String {
        match self {
            Self::Enable | Self::Disable => format!("{self} server {backend}/{server}"),
            Self::Ready | Self::Drain | Self::Maint => {
                format!("set server {backend}/{server} state {self}")
            }
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerState {
    type Err = HapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| {
                HapError::InvalidArgument(format!(
                    "state must be one of enable, disable, ready, drain, maint; got {s:?}"
                ))
            })
    }
}

/// Group per-process handles by object name.
pub(crate) fn group_by_name<H>(handles: Vec<H>, name: impl Fn(&H) -> &str) -> BTreeMap<String, Vec<H>> {
    let mut groups: BTreeMap<String, Vec<H>> = BTreeMap::new();
    for handle in handles {
        groups.entry(name(&handle).to_string()).or_default().push(handle);
    }
    groups
}

/// Fetch metric `name` from every handle and fold it, after checking it
/// against the metrics valid for this kind of object.
pub(crate) async fn fold_metric<H, F>(
    handles: &[H],
    name: &str,
    valid: &[&str],
    fetch: F,
) -> Result<i128, HapError>
where
    H: ProcessBound,
    F: AsyncFn(&H) -> Result<String, HapError>,
{
    if !valid.contains(&name) {
        return Err(HapError::UnknownMetric {
            name: name.to_string(),
        });
    }
    let results = aggregate::run_across(handles, fetch).await?;
    aggregate::reduce_metric(name, &results)
}

/// Parse an agreed-upon value as an integer.
pub(crate) fn as_integer(field: &str, value: String) -> Result<i128, HapError> {
    crate::wire::MetricValue::convert(&value)
        .and_then(|v| v.as_int())
        .ok_or_else(|| {
            HapError::Wire(crate::wire::WireError::InvalidNumber {
                field: field.to_string(),
                value,
            })
        })
}
