//! Decoders for the two response formats of the stats socket.
//!
//! `show info` answers with a flat `key: value` block. `show stat` answers
//! with a CSV table whose first line is a `# `-prefixed header; every row
//! shares that header.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use serde::Serialize;

/// Errors raised while decoding a response.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("stat response has no header line")]
    MissingHeader,

    #[error("malformed stat line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    #[error("unknown field {0:?}")]
    UnknownField(String),

    #[error("field {field} is not a number: {value:?}")]
    InvalidNumber { field: String, value: String },
}

/// Flat mapping decoded from `show info`.
pub type InfoBlock = BTreeMap<String, String>;

/// Decode a `show info` response.
///
/// Lines are left-trimmed and split once on `": "`; lines without the
/// separator are ignored and later duplicates win.
pub fn parse_info<S: AsRef<str>>(lines: &[S]) -> InfoBlock {
    let mut info = InfoBlock::new();
    for line in lines {
        if let Some((key, value)) = line.as_ref().trim_start().split_once(": ") {
            info.insert(key.to_string(), value.to_string());
        }
    }
    info
}

/// Field names of one `show stat` response, shared by all its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    /// Parse the header line, dropping the two-character `# ` prefix.
    pub fn parse(line: &str) -> Self {
        let body = line.get(2..).unwrap_or_default().trim();
        let names: Vec<String> = body.split(',').map(str::to_string).collect();
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

/// One row of a `show stat` table.
#[derive(Debug, Clone)]
pub struct Record {
    header: Arc<Header>,
    fields: Vec<String>,
}

impl Record {
    pub fn new(header: Arc<Header>, fields: Vec<String>) -> Self {
        Self { header, fields }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Value of the named field. Rows shorter than the header read as
    /// empty for the missing trailing fields.
    pub fn get(&self, name: &str) -> Result<&str, WireError> {
        let i = self
            .header
            .position(name)
            .ok_or_else(|| WireError::UnknownField(name.to_string()))?;
        Ok(self.fields.get(i).map(String::as_str).unwrap_or_default())
    }

    /// Numeric id stored in `field` (`iid` for proxies, `sid` for servers).
    pub fn id(&self, field: &str) -> Result<u32, WireError> {
        let value = self.get(field)?;
        value.trim().parse().map_err(|_| WireError::InvalidNumber {
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    /// Proxy name (`pxname`, always the first column).
    pub fn proxy_name(&self) -> &str {
        self.fields.first().map(String::as_str).unwrap_or_default()
    }

    /// Service name (`svname`, always the second column).
    pub fn service_name(&self) -> &str {
        self.fields.get(1).map(String::as_str).unwrap_or_default()
    }

    /// Every header field paired with its value.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        self.header
            .names()
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), self.fields.get(i).cloned().unwrap_or_default()))
            .collect()
    }
}

/// A backend's own stats row and its servers.
#[derive(Debug, Clone, Default)]
pub struct BackendEntry {
    /// `None` until the `BACKEND` row is seen.
    pub stats: Option<Record>,
    pub servers: BTreeMap<String, Record>,
}

/// Decoded `show stat` response.
#[derive(Debug, Clone, Default)]
pub struct StatTable {
    pub frontends: BTreeMap<String, Record>,
    pub backends: BTreeMap<String, BackendEntry>,
}

/// Decode a `show stat` response in one pass.
///
/// Rows are classified by their second column: `FRONTEND` rows are
/// standalone, `BACKEND` rows set their group's stats (overwriting an
/// earlier one), anything else is a server filed under its group. Groups
/// and servers may arrive in any order.
pub fn parse_table<S: AsRef<str>>(lines: &[S]) -> Result<StatTable, WireError> {
    let (first, rows) = lines.split_first().ok_or(WireError::MissingHeader)?;
    let header = Arc::new(Header::parse(first.as_ref()));
    let mut table = StatTable::default();

    for (n, line) in rows.iter().enumerate() {
        let line = line.as_ref().trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<String> = line.split(',').map(str::to_string).collect();
        if fields.len() < 2 {
            return Err(WireError::Malformed {
                line: n + 2,
                content: line.to_string(),
            });
        }
        let record = Record::new(Arc::clone(&header), fields);
        let proxy = record.proxy_name().to_string();
        match record.service_name() {
            "FRONTEND" => {
                table.frontends.insert(proxy, record);
            }
            "BACKEND" => {
                table.backends.entry(proxy).or_default().stats = Some(record);
            }
            server => {
                let server = server.to_string();
                table
                    .backends
                    .entry(proxy)
                    .or_default()
                    .servers
                    .insert(server, record);
            }
        }
    }
    Ok(table)
}

/// Object-type mask of `show stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatType(pub i32);

impl StatType {
    pub const FRONTEND: Self = Self(1);
    pub const BACKEND: Self = Self(2);
    pub const SERVER: Self = Self(4);
    pub const ALL: Self = Self(-1);
}

impl BitOr for StatType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        if self == Self::ALL || rhs == Self::ALL {
            return Self::ALL;
        }
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for StatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A typed stats value. Serializes as a bare number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Wide enough for HAProxy's unsigned 64-bit counters.
    Int(i128),
    Text(String),
}

impl MetricValue {
    /// Numbers become `Int` (floats truncated toward zero), other
    /// non-blank text becomes `Text`, blanks become `None`.
    pub fn convert(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if let Ok(n) = trimmed.parse::<i128>() {
            return Some(Self::Int(n));
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            let f = f.trunc();
            // Out-of-range floats stay text rather than saturate.
            if f.is_finite() && f.abs() < i128::MAX as f64 {
                return Some(Self::Int(f as i128));
            }
        }
        if trimmed.is_empty() {
            None
        } else {
            Some(Self::Text(trimmed.to_string()))
        }
    }

    pub fn as_int(&self) -> Option<i128> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HEADER: &str = "# pxname,svname,qcur,scur,stot,status,weight,iid,sid,";

    #[test]
    fn test_parse_info() {
        let info = parse_info(&["Name: HAProxy", "Process_num: 2"]);
        let expected: InfoBlock = [("Name", "HAProxy"), ("Process_num", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(info, expected);
    }

    #[test]
    fn test_parse_info_ignores_noise_and_keeps_last_duplicate() {
        let info = parse_info(&[
            "  Version: 2.8.3",
            "garbage without separator",
            "node: a",
            "node: b",
            "description: ",
        ]);
        assert_eq!(info.get("Version").map(String::as_str), Some("2.8.3"));
        assert_eq!(info.get("node").map(String::as_str), Some("b"));
        assert_eq!(info.get("description").map(String::as_str), Some(""));
        assert_eq!(info.len(), 3);
    }

    #[test]
    fn test_parse_table_groups_and_members() {
        let lines = [
            HEADER,
            "fe,FRONTEND,,3,5,OPEN,,1,0,",
            "empty,BACKEND,0,0,0,UP,0,2,0,",
            "app,web1,0,1,7,UP,100,3,1,",
            "app,web2,0,2,8,UP,100,3,2,",
            "app,BACKEND,0,3,15,UP,200,3,0,",
        ];
        let table = parse_table(&lines).unwrap();

        assert_eq!(table.frontends.keys().collect::<Vec<_>>(), vec!["fe"]);
        assert_eq!(
            table.backends.keys().collect::<Vec<_>>(),
            vec!["app", "empty"]
        );
        assert!(table.backends["empty"].servers.is_empty());
        assert_eq!(
            table.backends["app"].servers.keys().collect::<Vec<_>>(),
            vec!["web1", "web2"]
        );

        let web2 = &table.backends["app"].servers["web2"];
        assert_eq!(web2.get("stot").unwrap(), "8");
        assert_eq!(web2.get("weight").unwrap(), "100");
        assert_eq!(web2.id("sid").unwrap(), 2);
        let app = table.backends["app"].stats.as_ref().unwrap();
        assert_eq!(app.get("stot").unwrap(), "15");
        assert_eq!(app.id("iid").unwrap(), 3);
    }

    #[test]
    fn test_later_backend_row_overwrites_stats() {
        let lines = [
            HEADER,
            "app,BACKEND,0,0,1,UP,0,3,0,",
            "app,BACKEND,0,0,2,UP,0,3,0,",
        ];
        let table = parse_table(&lines).unwrap();
        let stats = table.backends["app"].stats.as_ref().unwrap();
        assert_eq!(stats.get("stot").unwrap(), "2");
    }

    #[test]
    fn test_unknown_field_is_an_error() {
        let table = parse_table(&[HEADER, "fe,FRONTEND,,3,5,OPEN,,1,0,"]).unwrap();
        let err = table.frontends["fe"].get("nonexistent").unwrap_err();
        assert!(matches!(err, WireError::UnknownField(name) if name == "nonexistent"));
    }

    #[test]
    fn test_short_row_reads_empty() {
        let table = parse_table(&[HEADER, "fe,FRONTEND"]).unwrap();
        assert_eq!(table.frontends["fe"].get("weight").unwrap(), "");
    }

    #[test]
    fn test_parse_table_errors() {
        let empty: [&str; 0] = [];
        assert!(matches!(parse_table(&empty), Err(WireError::MissingHeader)));
        assert!(matches!(
            parse_table(&[HEADER, "lonely"]),
            Err(WireError::Malformed { line: 2, .. })
        ));
    }

    #[test]
    fn test_row_whitespace_is_trimmed() {
        let table = parse_table(&[HEADER, "  app,web1,0,1,7,UP,100,3,1\r\n"]).unwrap();
        let web1 = &table.backends["app"].servers["web1"];
        assert_eq!(web1.proxy_name(), "app");
        assert_eq!(web1.to_map().get("sid").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_record_to_map_pairs_every_field() {
        let table = parse_table(&[HEADER, "fe,FRONTEND,,,5"]).unwrap();
        let map = table.frontends["fe"].to_map();
        assert_eq!(map.get("pxname").map(String::as_str), Some("fe"));
        assert_eq!(map.get("stot").map(String::as_str), Some("5"));
        assert_eq!(map.get("status").map(String::as_str), Some(""));
    }

    #[test]
    fn test_metric_value_convert() {
        assert_eq!(MetricValue::convert("0"), Some(MetricValue::Int(0)));
        assert_eq!(MetricValue::convert("13.5"), Some(MetricValue::Int(13)));
        assert_eq!(MetricValue::convert("-2.7"), Some(MetricValue::Int(-2)));
        assert_eq!(
            MetricValue::convert("13.5f"),
            Some(MetricValue::Text("13.5f".to_string()))
        );
        assert_eq!(
            MetricValue::convert("UP 1/2"),
            Some(MetricValue::Text("UP 1/2".to_string()))
        );
        assert_eq!(MetricValue::convert(""), None);
        assert_eq!(MetricValue::convert(" "), None);
    }

    #[test]
    fn test_metric_value_serializes_bare() {
        let values = vec![MetricValue::Int(12), MetricValue::Text("UP".to_string())];
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[12,"UP"]"#);
    }

    #[test]
    fn test_stat_type_mask() {
        assert_eq!(StatType::BACKEND | StatType::SERVER, StatType(6));
        assert_eq!(StatType::ALL | StatType::SERVER, StatType::ALL);
        assert_eq!(StatType::ALL.to_string(), "-1");
    }
}
