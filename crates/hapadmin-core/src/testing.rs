//! In-memory [`Channel`] for unit tests.

use std::sync::{Arc, Mutex};

use hapadmin_test_utils::DaemonScript;

use crate::BoxFuture;
use crate::endpoint::Endpoint;
use crate::transport::{Channel, TransportError, split_response};

/// A channel answered by a [`DaemonScript`] without touching a socket.
///
/// Clones share the script and the command log, so a test can keep one
/// clone to re-script the daemon after handing the other to an endpoint.
#[derive(Clone)]
pub(crate) struct ScriptedChannel {
    address: String,
    script: Arc<Mutex<DaemonScript>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChannel {
    pub(crate) fn new(address: &str, script: DaemonScript) -> Self {
        Self {
            address: address.to_string(),
            script: Arc::new(Mutex::new(script)),
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn update(&self, f: impl FnOnce(&mut DaemonScript)) {
        f(&mut self.script.lock().unwrap());
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Channel for ScriptedChannel {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn send<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<Vec<String>, TransportError>> {
        Box::pin(async move {
            self.log.lock().unwrap().push(command.to_string());
            let raw = self.script.lock().unwrap().answer(command);
            let lines = split_response(&raw);
            if lines.is_empty() {
                return Err(TransportError::NoData {
                    endpoint: self.address.clone(),
                });
            }
            Ok(lines)
        })
    }
}

/// Connect an endpoint over a fresh [`ScriptedChannel`], returning both.
pub(crate) async fn scripted_endpoint(script: DaemonScript) -> (Arc<Endpoint>, ScriptedChannel) {
    let channel = ScriptedChannel::new("scripted.sock", script);
    let endpoint = Endpoint::from_channel(Box::new(channel.clone()))
        .await
        .unwrap();
    (Arc::new(endpoint), channel)
}
