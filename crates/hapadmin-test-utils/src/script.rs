//! In-memory model of one HAProxy process as seen through its stats socket.
//!
//! A [`DaemonScript`] answers `show info` from its info block, `show stat`
//! from its stat rows (honouring the id and type filters), and anything else
//! from a table of canned responses.

use std::collections::{BTreeMap, HashMap};

/// First line HAProxy prints for a command it does not know.
pub const UNKNOWN_COMMAND: &str = "Unknown command. Please enter one of the following commands only :";

/// Columns of the `show stat` CSV, in wire order.
pub const STAT_FIELDS: &[&str] = &[
    "pxname",
    "svname",
    "qcur",
    "qmax",
    "scur",
    "smax",
    "slim",
    "stot",
    "bin",
    "bout",
    "dreq",
    "dresp",
    "ereq",
    "econ",
    "eresp",
    "wretr",
    "wredis",
    "status",
    "weight",
    "act",
    "bck",
    "chkfail",
    "chkdown",
    "lastchg",
    "downtime",
    "qlimit",
    "pid",
    "iid",
    "sid",
    "throttle",
    "lbtot",
    "tracked",
    "type",
    "rate",
    "rate_lim",
    "rate_max",
    "check_status",
    "check_code",
    "check_duration",
    "hrsp_1xx",
    "hrsp_2xx",
    "hrsp_3xx",
    "hrsp_4xx",
    "hrsp_5xx",
    "hrsp_other",
    "hanafail",
    "req_rate",
    "req_rate_max",
    "req_tot",
    "cli_abrt",
    "srv_abrt",
    "comp_in",
    "comp_out",
    "comp_byp",
    "comp_rsp",
    "lastsess",
    "last_chk",
    "last_agt",
    "qtime",
    "ctime",
    "rtime",
    "ttime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Frontend,
    Backend,
    Server,
}

impl RowKind {
    fn mask(self) -> i64 {
        match self {
            Self::Frontend => 1,
            Self::Backend => 2,
            Self::Server => 4,
        }
    }
}

/// One row of `show stat` output.
#[derive(Debug, Clone)]
pub struct StatRow {
    kind: RowKind,
    values: BTreeMap<String, String>,
}

impl StatRow {
    fn base(kind: RowKind, pxname: &str, svname: &str, iid: u32, sid: u32) -> Self {
        let mut values = BTreeMap::new();
        values.insert("pxname".to_string(), pxname.to_string());
        values.insert("svname".to_string(), svname.to_string());
        values.insert("iid".to_string(), iid.to_string());
        values.insert("sid".to_string(), sid.to_string());
        values.insert("pid".to_string(), "1".to_string());
        Self { kind, values }
    }

    pub fn frontend(name: &str, iid: u32) -> Self {
        Self::base(RowKind::Frontend, name, "FRONTEND", iid, 0)
            .with("status", "OPEN")
            .with("type", "0")
    }

    pub fn backend(name: &str, iid: u32) -> Self {
        Self::base(RowKind::Backend, name, "BACKEND", iid, 0)
            .with("status", "UP")
            .with("type", "1")
    }

    pub fn server(backend: &str, name: &str, iid: u32, sid: u32) -> Self {
        Self::base(RowKind::Server, backend, name, iid, sid)
            .with("status", "UP")
            .with("type", "2")
            .with("weight", "1")
            .with("act", "1")
            .with("bck", "0")
            .with("check_status", "L4OK")
    }

    /// Set a column. Unknown column names are ignored by [`render`](Self::render).
    pub fn with(mut self, field: &str, value: impl ToString) -> Self {
        self.values.insert(field.to_string(), value.to_string());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    fn numeric(&self, field: &str) -> i64 {
        self.get(field).and_then(|v| v.parse().ok()).unwrap_or(-1)
    }

    fn selected(&self, iid: i64, kind: i64, sid: i64) -> bool {
        if kind != -1 && kind & self.kind.mask() == 0 {
            return false;
        }
        if iid != -1 && self.numeric("iid") != iid {
            return false;
        }
        if sid != -1 && self.kind == RowKind::Server && self.numeric("sid") != sid {
            return false;
        }
        true
    }

    /// Render as a CSV line (with HAProxy's trailing comma).
    pub fn render(&self) -> String {
        let mut line = STAT_FIELDS
            .iter()
            .map(|field| self.get(field).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",");
        line.push(',');
        line
    }
}

/// Header line of the `show stat` CSV.
pub fn stat_header() -> String {
    format!("# {},", STAT_FIELDS.join(","))
}

/// Render `rows` as a complete `show stat` response.
pub fn stat_response(rows: &[StatRow]) -> String {
    let mut out = stat_header();
    out.push('\n');
    for row in rows {
        out.push_str(&row.render());
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Scripted behaviour of one HAProxy process.
#[derive(Debug, Clone)]
pub struct DaemonScript {
    info: Vec<(String, String)>,
    rows: Vec<StatRow>,
    responses: HashMap<String, String>,
}

impl DaemonScript {
    /// A HAProxy process with a typical info block and no proxies.
    pub fn haproxy(process_num: u32) -> Self {
        let info = [
            ("Name", "HAProxy".to_string()),
            ("Version", "2.8.3".to_string()),
            ("Release_date", "2023/09/08".to_string()),
            ("Nbthread", "4".to_string()),
            ("Nbproc", "1".to_string()),
            ("Process_num", process_num.to_string()),
            ("Pid", (1000 + process_num).to_string()),
            ("Uptime", "0d 1h02m03s".to_string()),
            ("Uptime_sec", "3723".to_string()),
            ("Maxconn", "4000".to_string()),
            ("CurrConns", "3".to_string()),
            ("CumReq", "120".to_string()),
            ("ConnRateLimit", "0".to_string()),
            ("SessRateLimit", "0".to_string()),
            ("SslRateLimit", "0".to_string()),
            ("node", "lb-1".to_string()),
            ("description", String::new()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            info,
            rows: Vec::new(),
            responses: HashMap::new(),
        }
    }

    /// Set (or add) an info key.
    pub fn with_info(mut self, key: &str, value: &str) -> Self {
        self.set_info(key, value);
        self
    }

    pub fn set_info(&mut self, key: &str, value: &str) {
        match self.info.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.info.push((key.to_string(), value.to_string())),
        }
    }

    pub fn with_row(mut self, row: StatRow) -> Self {
        self.rows.push(row);
        self
    }

    pub fn with_rows(mut self, rows: impl IntoIterator<Item = StatRow>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Replace every stat row, as a configuration reload would.
    pub fn set_rows(&mut self, rows: Vec<StatRow>) {
        self.rows = rows;
    }

    /// Answer `command` with `response` verbatim.
    pub fn respond_to(mut self, command: &str, response: &str) -> Self {
        self.set_response(command, response);
        self
    }

    /// Answer `command` with HAProxy's silent success (a single blank line).
    pub fn accept(self, command: &str) -> Self {
        self.respond_to(command, "\n")
    }

    pub fn set_response(&mut self, command: &str, response: &str) {
        self.responses
            .insert(command.to_string(), response.to_string());
    }

    /// Full raw response to `command`.
    pub fn answer(&self, command: &str) -> String {
        let command = command.trim();
        if let Some(response) = self.responses.get(command) {
            return response.clone();
        }
        if command == "show info" {
            let mut out: String = self
                .info
                .iter()
                .map(|(k, v)| format!("{k}: {v}\n"))
                .collect();
            out.push('\n');
            return out;
        }
        if let Some(args) = command.strip_prefix("show stat") {
            let filters: Vec<i64> = args
                .split_whitespace()
                .map(|a| a.parse().unwrap_or(-1))
                .collect();
            let filter = |i: usize| filters.get(i).copied().unwrap_or(-1);
            let rows: Vec<StatRow> = self
                .rows
                .iter()
                .filter(|row| row.selected(filter(0), filter(1), filter(2)))
                .cloned()
                .collect();
            return stat_response(&rows);
        }
        format!("{UNKNOWN_COMMAND}\n  help           : this message\n\n")
    }
}
