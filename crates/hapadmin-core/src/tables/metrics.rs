//! Metric names and how each one folds across processes.

use std::collections::HashMap;
use std::sync::LazyLock;

/// How per-process values of one metric combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    /// Integer mean: sum divided by count, truncated.
    Average,
}

const SUMMED: &[&str] = &[
    "CompressBpsIn",
    "CompressBpsOut",
    "CompressBpsRateLim",
    "ConnRate",
    "ConnRateLimit",
    "CumConns",
    "CumReq",
    "CumSslConns",
    "CurrConns",
    "CurrSslConns",
    "Hard_maxconn",
    "Idle_pct",
    "MaxConnRate",
    "MaxSessRate",
    "MaxSslConns",
    "MaxSslRate",
    "MaxZlibMemUsage",
    "Maxconn",
    "Maxpipes",
    "Maxsock",
    "Memmax_MB",
    "PipesFree",
    "PipesUsed",
    "Process_num",
    "Run_queue",
    "SessRate",
    "SessRateLimit",
    "SslBackendKeyRate",
    "SslBackendMaxKeyRate",
    "SslCacheLookups",
    "SslCacheMisses",
    "SslFrontendKeyRate",
    "SslFrontendMaxKeyRate",
    "SslFrontendSessionReuse_pct",
    "SslRate",
    "SslRateLimit",
    "Tasks",
    "Ulimit-n",
    "ZlibMemUsage",
    "bin",
    "bout",
    "chkdown",
    "chkfail",
    "comp_byp",
    "comp_in",
    "comp_out",
    "comp_rsp",
    "cli_abrt",
    "dreq",
    "dresp",
    "ereq",
    "eresp",
    "econ",
    "hrsp_1xx",
    "hrsp_2xx",
    "hrsp_3xx",
    "hrsp_4xx",
    "hrsp_5xx",
    "hrsp_other",
    "lbtot",
    "qcur",
    "qmax",
    "rate",
    "rate_lim",
    "rate_max",
    "req_rate",
    "req_rate_max",
    "req_tot",
    "scur",
    "slim",
    "srv_abrt",
    "smax",
    "stot",
    "wretr",
    "wredis",
];

const AVERAGED: &[&str] = &[
    "act",
    "bck",
    "check_duration",
    "ctime",
    "downtime",
    "lastchg",
    "lastsess",
    "qlimit",
    "qtime",
    "rtime",
    "throttle",
    "ttime",
    "weight",
];

static REDUCTIONS: LazyLock<HashMap<&'static str, Reduction>> = LazyLock::new(|| {
    SUMMED
        .iter()
        .map(|name| (*name, Reduction::Sum))
        .chain(AVERAGED.iter().map(|name| (*name, Reduction::Average)))
        .collect()
});

/// Reduction for `name`, `None` when the metric is unclassified.
pub fn reduction_for(name: &str) -> Option<Reduction> {
    REDUCTIONS.get(name).copied()
}

/// Process-level metrics from `show info`.
pub const PROCESS_METRICS: &[&str] = &[
    "SslFrontendMaxKeyRate",
    "Hard_maxconn",
    "SessRateLimit",
    "Process_num",
    "Memmax_MB",
    "CompressBpsRateLim",
    "MaxSslConns",
    "ConnRateLimit",
    "SslRateLimit",
    "MaxConnRate",
    "CumConns",
    "SslBackendKeyRate",
    "SslCacheLookups",
    "CurrSslConns",
    "Run_queue",
    "Maxpipes",
    "Idle_pct",
    "SslFrontendKeyRate",
    "Tasks",
    "MaxZlibMemUsage",
    "SslFrontendSessionReuse_pct",
    "CurrConns",
    "SslCacheMisses",
    "SslRate",
    "CumSslConns",
    "PipesUsed",
    "Maxconn",
    "CompressBpsIn",
    "ConnRate",
    "Ulimit-n",
    "SessRate",
    "SslBackendMaxKeyRate",
    "CumReq",
    "PipesFree",
    "ZlibMemUsage",
    "CompressBpsOut",
    "Maxsock",
    "MaxSslRate",
    "MaxSessRate",
];

pub const FRONTEND_METRICS: &[&str] = &[
    "bin",
    "bout",
    "comp_byp",
    "comp_in",
    "comp_out",
    "comp_rsp",
    "dreq",
    "dresp",
    "ereq",
    "hrsp_1xx",
    "hrsp_2xx",
    "hrsp_3xx",
    "hrsp_4xx",
    "hrsp_5xx",
    "hrsp_other",
    "rate",
    "rate_lim",
    "rate_max",
    "req_rate",
    "req_rate_max",
    "req_tot",
    "scur",
    "slim",
    "smax",
    "stot",
];

pub const BACKEND_METRICS: &[&str] = &[
    "act",
    "bck",
    "bin",
    "bout",
    "chkdown",
    "cli_abrt",
    "comp_byp",
    "comp_in",
    "comp_out",
    "comp_rsp",
    "ctime",
    "downtime",
    "dreq",
    "dresp",
    "econ",
    "eresp",
    "hrsp_1xx",
    "hrsp_2xx",
    "hrsp_3xx",
    "hrsp_4xx",
    "hrsp_5xx",
    "hrsp_other",
    "lastchg",
    "lastsess",
    "lbtot",
    "qcur",
    "qmax",
    "qtime",
    "rate",
    "rate_max",
    "rtime",
    "scur",
    "slim",
    "smax",
    "srv_abrt",
    "stot",
    "ttime",
    "weight",
    "wredis",
    "wretr",
];

pub const SERVER_METRICS: &[&str] = &[
    "qcur",
    "qmax",
    "scur",
    "smax",
    "stot",
    "bin",
    "bout",
    "dresp",
    "econ",
    "eresp",
    "wretr",
    "wredis",
    "weight",
    "act",
    "bck",
    "chkfail",
    "chkdown",
    "lastchg",
    "downtime",
    "qlimit",
    "throttle",
    "lbtot",
    "rate",
    "rate_max",
    "check_duration",
    "hrsp_1xx",
    "hrsp_2xx",
    "hrsp_3xx",
    "hrsp_4xx",
    "hrsp_5xx",
    "hrsp_other",
    "cli_abrt",
    "srv_abrt",
    "lastsess",
    "qtime",
    "ctime",
    "rtime",
    "ttime",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(reduction_for("stot"), Some(Reduction::Sum));
        assert_eq!(reduction_for("weight"), Some(Reduction::Average));
        assert_eq!(reduction_for("status"), None);
        assert_eq!(reduction_for(""), None);
    }

    #[test]
    fn test_no_metric_is_both_summed_and_averaged() {
        for name in AVERAGED {
            assert!(!SUMMED.contains(name), "{name} classified twice");
        }
    }

    #[test]
    fn test_every_published_metric_is_classified() {
        let lists = [PROCESS_METRICS, FRONTEND_METRICS, BACKEND_METRICS, SERVER_METRICS];
        for name in lists.iter().flat_map(|list| list.iter()) {
            assert!(reduction_for(name).is_some(), "{name} has no reduction");
        }
    }
}
