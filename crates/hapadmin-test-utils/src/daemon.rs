//! Fake HAProxy stats sockets.
//!
//! [`FakeDaemon`] listens on a UNIX socket inside a temp directory and answers
//! every connection from its [`DaemonScript`]: one command line in, one
//! response out, then the connection is closed, exactly like HAProxy in
//! non-interactive mode. [`FakeCluster`] runs several of them side by side in
//! one directory, one per process.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

use crate::script::DaemonScript;

/// A scripted HAProxy process behind a UNIX socket.
///
/// The accept loop is aborted when this value is dropped.
pub struct FakeDaemon {
    path: PathBuf,
    script: Arc<Mutex<DaemonScript>>,
    received: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
    _temp_dir: Option<TempDir>,
}

impl FakeDaemon {
    /// Spawn a daemon on `haproxy.sock` in a fresh temp directory.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(script: DaemonScript) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let mut daemon = Self::spawn_in(temp_dir.path(), "haproxy.sock", script);
        daemon._temp_dir = Some(temp_dir);
        daemon
    }

    /// Spawn a daemon on `dir/file_name`. The caller owns the directory.
    pub fn spawn_in(dir: &Path, file_name: &str, script: DaemonScript) -> Self {
        let path = dir.join(file_name);
        let listener = UnixListener::bind(&path).expect("failed to bind fake stats socket");
        let script = Arc::new(Mutex::new(script));
        let received = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&script),
            Arc::clone(&received),
        ));

        Self {
            path,
            script,
            received,
            handle,
            _temp_dir: None,
        }
    }

    /// Path of the listening socket.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every command received so far, in arrival order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().expect("received lock poisoned").clone()
    }

    /// Mutate the script, e.g. to simulate a configuration reload.
    pub fn update(&self, f: impl FnOnce(&mut DaemonScript)) {
        let mut script = self.script.lock().expect("script lock poisoned");
        f(&mut script);
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn accept_loop(
    listener: UnixListener,
    script: Arc<Mutex<DaemonScript>>,
    received: Arc<Mutex<Vec<String>>>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let script = Arc::clone(&script);
        let received = Arc::clone(&received);
        tokio::spawn(async move {
            if let Err(e) = serve(stream, &script, &received).await {
                tracing::debug!(error = %e, "fake daemon connection failed");
            }
        });
    }
}

async fn serve(
    stream: UnixStream,
    script: &Mutex<DaemonScript>,
    received: &Mutex<Vec<String>>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut line = String::new();
    BufReader::new(reader).read_line(&mut line).await?;
    let command = line.trim_end().to_string();

    let response = {
        let script = script.lock().expect("script lock poisoned");
        script.answer(&command)
    };
    received
        .lock()
        .expect("received lock poisoned")
        .push(command);

    writer.write_all(response.as_bytes()).await?;
    writer.shutdown().await
}

/// Several fake processes sharing one socket directory.
pub struct FakeCluster {
    daemons: Vec<FakeDaemon>,
    temp_dir: TempDir,
}

impl FakeCluster {
    /// Spawn one daemon per script, on `haproxy-<n>.sock` with `n` from 1.
    pub fn spawn(scripts: Vec<DaemonScript>) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let daemons = scripts
            .into_iter()
            .enumerate()
            .map(|(i, script)| {
                FakeDaemon::spawn_in(temp_dir.path(), &format!("haproxy-{}.sock", i + 1), script)
            })
            .collect();
        Self { daemons, temp_dir }
    }

    /// The directory holding every socket.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn daemon(&self, index: usize) -> &FakeDaemon {
        &self.daemons[index]
    }

    pub fn daemons(&self) -> &[FakeDaemon] {
        &self.daemons
    }

    /// Apply the same mutation to every process.
    pub fn update_all(&self, f: impl Fn(&mut DaemonScript)) {
        for daemon in &self.daemons {
            daemon.update(&f);
        }
    }
}
