//! Transport to one stats socket.
//!
//! Every command opens a fresh connection, writes `command\n` and reads
//! until the daemon closes its side. Failed attempts are retried per
//! [`RetryPolicy`], sleeping a fixed interval between attempts.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use hapadmin_config::{ConnectionConfig, RetryKeyword, RetrySetting, split_host_port};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, UnixStream};
use tracing::{debug, warn};

use crate::BoxFuture;

/// Errors raised while exchanging one command with a stats socket.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("timed out talking to {endpoint}")]
    Timeout { endpoint: String },

    #[error("connection refused by {endpoint}")]
    ConnectionRefused { endpoint: String },

    /// The daemon reported the transport endpoint as already connected.
    /// Seen under heavy load; transient.
    #[error("{endpoint} is already connected")]
    AlreadyConnected { endpoint: String },

    #[error("I/O error on {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("no data returned by {endpoint}")]
    NoData { endpoint: String },
}

impl TransportError {
    fn classify(endpoint: &SocketAddress, source: io::Error) -> Self {
        let endpoint = endpoint.to_string();
        match source.kind() {
            io::ErrorKind::TimedOut => Self::Timeout { endpoint },
            io::ErrorKind::ConnectionRefused => Self::ConnectionRefused { endpoint },
            _ if source.raw_os_error() == Some(libc::EISCONN) => {
                Self::AlreadyConnected { endpoint }
            }
            _ => Self::Io { endpoint, source },
        }
    }

    /// The address of the endpoint the fault occurred on.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Timeout { endpoint }
            | Self::ConnectionRefused { endpoint }
            | Self::AlreadyConnected { endpoint }
            | Self::Io { endpoint, .. }
            | Self::NoData { endpoint } => endpoint,
        }
    }
}

/// Where a stats socket lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SocketAddress {
    Unix(PathBuf),
    Tcp { host: String, port: u16 },
}

impl SocketAddress {
    /// Interpret `s` as `host:port` when it has that shape and no path
    /// separator, otherwise as a UNIX socket path.
    pub fn parse(s: &str) -> Self {
        if !s.contains('/') {
            if let Some((host, port)) = split_host_port(s) {
                return Self::Tcp { host, port };
            }
        }
        Self::Unix(PathBuf::from(s))
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "{}", path.display()),
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

impl From<PathBuf> for SocketAddress {
    fn from(path: PathBuf) -> Self {
        Self::Unix(path)
    }
}

/// How many attempts one command gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// A single attempt.
    Never,
    /// Retry until the daemon answers.
    Forever,
    /// Retry up to `n` times after the first attempt.
    Times(u32),
}

impl RetryPolicy {
    /// Total attempts allowed, `None` when unbounded.
    pub fn attempts(self) -> Option<u32> {
        match self {
            Self::Never => Some(1),
            Self::Forever => None,
            Self::Times(n) => Some(n.saturating_add(1)),
        }
    }
}

impl From<RetrySetting> for RetryPolicy {
    fn from(setting: RetrySetting) -> Self {
        match setting {
            RetrySetting::Count(0) | RetrySetting::Keyword(RetryKeyword::Forever) => Self::Forever,
            RetrySetting::Count(n) => Self::Times(n),
            RetrySetting::Keyword(RetryKeyword::Never) => Self::Never,
        }
    }
}

/// Retry and timeout settings for a [`SocketTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportOptions {
    pub retry: RetryPolicy,
    pub retry_interval: Duration,
    /// Bound on one attempt: connect, send and read together.
    pub timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::Times(2),
            retry_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(1),
        }
    }
}

impl From<&ConnectionConfig> for TransportOptions {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            retry: config.retry.into(),
            retry_interval: Duration::from_millis(config.retry_interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

/// A request/response pipe to one daemon process.
///
/// Object-safe so endpoints can hold a `Box<dyn Channel>`; the production
/// implementation is [`SocketTransport`].
pub trait Channel: Send + Sync {
    /// Human-readable address, used in errors and logs.
    fn address(&self) -> String;

    /// Send one command and return the response lines.
    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Vec<String>, TransportError>>;
}

/// [`Channel`] over a UNIX or TCP stats socket.
#[derive(Debug, Clone)]
pub struct SocketTransport {
    address: SocketAddress,
    options: TransportOptions,
}

impl SocketTransport {
    pub fn new(address: SocketAddress, options: TransportOptions) -> Self {
        Self { address, options }
    }

    pub fn socket_address(&self) -> &SocketAddress {
        &self.address
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Send `command`, retrying failed attempts per the configured policy.
    pub async fn execute(&self, command: &str) -> Result<Vec<String>, TransportError> {
        let max_attempts = self.options.retry.attempts();
        let mut attempt: u32 = 0;
        let raw = loop {
            attempt = attempt.saturating_add(1);
            debug!(endpoint = %self.address, command, attempt, "sending command");
            match self.attempt(command).await {
                Ok(raw) => break raw,
                Err(err) => {
                    if max_attempts.is_some_and(|max| attempt >= max) {
                        return Err(err);
                    }
                    warn!(
                        endpoint = %self.address,
                        attempt,
                        error = %err,
                        "command attempt failed, retrying in {:?}",
                        self.options.retry_interval
                    );
                    tokio::time::sleep(self.options.retry_interval).await;
                }
            }
        };

        let lines = split_response(&raw);
        if lines.is_empty() {
            return Err(TransportError::NoData {
                endpoint: self.address.to_string(),
            });
        }
        Ok(lines)
    }

    async fn attempt(&self, command: &str) -> Result<String, TransportError> {
        match tokio::time::timeout(self.options.timeout, self.exchange(command)).await {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(source)) => Err(TransportError::classify(&self.address, source)),
            Err(_elapsed) => Err(TransportError::Timeout {
                endpoint: self.address.to_string(),
            }),
        }
    }

    async fn exchange(&self, command: &str) -> io::Result<String> {
        match &self.address {
            SocketAddress::Unix(path) => {
                let stream = UnixStream::connect(path).await?;
                round_trip(stream, command).await
            }
            SocketAddress::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port)).await?;
                round_trip(stream, command).await
            }
        }
    }
}

impl Channel for SocketTransport {
    fn address(&self) -> String {
        self.address.to_string()
    }

    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Vec<String>, TransportError>> {
        Box::pin(self.execute(command))
    }
}

async fn round_trip<S>(mut stream: S, command: &str) -> io::Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(format!("{command}\n").as_bytes()).await?;
    stream.flush().await?;
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Split a raw response into lines. The daemon terminates multi-line
/// responses with an extra blank line, which is dropped.
pub fn split_response(raw: &str) -> Vec<String> {
    let mut lines: Vec<String> = raw.lines().map(str::to_string).collect();
    if lines.len() > 1 && lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::net::UnixListener;

    #[test]
    fn test_split_response_drops_trailing_blank() {
        assert_eq!(split_response("a\nb\n\n"), vec!["a", "b"]);
        assert_eq!(split_response("\n"), vec![""]);
        assert!(split_response("").is_empty());
        assert_eq!(split_response("Done.\n"), vec!["Done."]);
    }

    #[test]
    fn test_retry_policy_attempts() {
        assert_eq!(RetryPolicy::Never.attempts(), Some(1));
        assert_eq!(RetryPolicy::Forever.attempts(), None);
        assert_eq!(RetryPolicy::Times(2).attempts(), Some(3));
    }

    #[test]
    fn test_retry_policy_from_setting() {
        assert_eq!(RetryPolicy::from(RetrySetting::Count(0)), RetryPolicy::Forever);
        assert_eq!(RetryPolicy::from(RetrySetting::Count(4)), RetryPolicy::Times(4));
        assert_eq!(
            RetryPolicy::from(RetrySetting::Keyword(RetryKeyword::Never)),
            RetryPolicy::Never
        );
    }

    #[test]
    fn test_socket_address_parse() {
        assert_eq!(
            SocketAddress::parse("127.0.0.1:9999"),
            SocketAddress::Tcp {
                host: "127.0.0.1".to_string(),
                port: 9999
            }
        );
        assert_eq!(
            SocketAddress::parse("/run/haproxy/admin.sock"),
            SocketAddress::Unix(PathBuf::from("/run/haproxy/admin.sock"))
        );
        assert_eq!(SocketAddress::parse("[::1]:80").to_string(), "[::1]:80");
    }

    #[test]
    fn test_classify_os_errors() {
        let addr = SocketAddress::parse("/tmp/x.sock");
        let refused = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert!(matches!(
            TransportError::classify(&addr, refused),
            TransportError::ConnectionRefused { .. }
        ));
        let busy = io::Error::from_raw_os_error(libc::EISCONN);
        assert!(matches!(
            TransportError::classify(&addr, busy),
            TransportError::AlreadyConnected { .. }
        ));
        let other = io::Error::from(io::ErrorKind::PermissionDenied);
        let err = TransportError::classify(&addr, other);
        assert!(matches!(err, TransportError::Io { .. }));
        assert_eq!(err.endpoint(), "/tmp/x.sock");
    }

    fn fast_options(retry: RetryPolicy) -> TransportOptions {
        TransportOptions {
            retry,
            retry_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_execute_reads_until_close() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stats.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"show acl\n");
            stream.write_all(b"0 one\n1 two\n\n").await.unwrap();
        });

        let transport = SocketTransport::new(path.into(), fast_options(RetryPolicy::Never));
        let lines = transport.execute("show acl").await.unwrap();
        assert_eq!(lines, vec!["0 one", "1 two"]);
    }

    #[tokio::test]
    async fn test_empty_response_is_no_data() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stats.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf).await.unwrap();
        });

        let transport = SocketTransport::new(path.into(), fast_options(RetryPolicy::Never));
        let err = transport.execute("show info").await.unwrap_err();
        assert!(matches!(err, TransportError::NoData { .. }));
    }

    #[tokio::test]
    async fn test_missing_socket_exhausts_retries() {
        let tmp = TempDir::new().unwrap();
        let transport = SocketTransport::new(
            tmp.path().join("absent.sock").into(),
            fast_options(RetryPolicy::Times(2)),
        );
        let started = std::time::Instant::now();
        let err = transport.execute("show info").await.unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));
        // two sleeps between three attempts
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_failed_attempt() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stats.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let daemon = tokio::spawn(async move {
            // First connection never answers, so that attempt times out.
            let (silent, _) = listener.accept().await.unwrap();
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = stream.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"show info\n");
            stream.write_all(b"Name: HAProxy\nProcess_num: 1\n").await.unwrap();
            drop(stream);
            drop(silent);
            let extra = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
            extra.is_ok()
        });

        let transport = SocketTransport::new(path.into(), fast_options(RetryPolicy::Times(2)));
        let lines = transport.execute("show info").await.unwrap();
        assert_eq!(lines, vec!["Name: HAProxy", "Process_num: 1"]);
        // success ends the loop; no third connection is made
        assert!(!daemon.await.unwrap());
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("stats.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let transport = SocketTransport::new(path.into(), fast_options(RetryPolicy::Never));
        let err = transport.execute("show info").await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
    }
}
