//! Replicating a loaded input graph across a cluster.
//!
//! In a multi-process deployment only the master reads the binding file.
//! It broadcasts a header message and, if the header is empty, the
//! serialised configuration. A non-empty header is an error string: every
//! follower aborts the load and keeps its current graph untouched.
//!
//! Individual graph edits are never replicated; every node runs the same
//! deterministic replay of the same configuration.

use crate::manager::ToolManager;
use crate::persist::{self, CURRENT_VERSION, GraphConfiguration, LoadError, LoadReport};
use anyhow::Result;
use log::{debug, info, warn};
use std::path::Path;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("cluster pipe disconnected")]
    Disconnected,

    #[error("master failed to load the input graph: {0}")]
    Remote(String),

    #[error("received configuration is not valid UTF-8")]
    Encoding,

    #[error("failed to decode received configuration: {0}")]
    Decode(#[from] toml::de::Error),

    #[error("failed to encode configuration: {0}")]
    Encode(#[from] toml::ser::Error),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Ordered, reliable message channel between the master and its followers.
///
/// `send` broadcasts from the master; `receive` blocks on a follower until
/// the next message arrives.
pub trait ClusterPipe {
    fn is_master(&self) -> bool;

    fn send(&mut self, message: &[u8]) -> Result<(), ClusterError>;

    fn receive(&mut self) -> Result<Vec<u8>, ClusterError>;
}

/// In-process cluster pipe built on unbounded tokio channels.
///
/// `receive` uses a blocking receive and must not be called from inside an
/// async runtime.
#[derive(Debug)]
pub struct ChannelPipe {
    followers: Vec<mpsc::UnboundedSender<Vec<u8>>>,
    master: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl ChannelPipe {
    /// Creates a master pipe connected to `followers` follower pipes.
    pub fn cluster(followers: usize) -> (ChannelPipe, Vec<ChannelPipe>) {
        let mut senders = Vec::with_capacity(followers);
        let mut pipes = Vec::with_capacity(followers);
        for _ in 0..followers {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            pipes.push(ChannelPipe {
                followers: Vec::new(),
                master: Some(rx),
            });
        }
        let master = ChannelPipe {
            followers: senders,
            master: None,
        };
        (master, pipes)
    }
}

impl ClusterPipe for ChannelPipe {
    fn is_master(&self) -> bool {
        self.master.is_none()
    }

    fn send(&mut self, message: &[u8]) -> Result<(), ClusterError> {
        for follower in &self.followers {
            follower
                .send(message.to_vec())
                .map_err(|_| ClusterError::Disconnected)?;
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<Vec<u8>, ClusterError> {
        let receiver = self.master.as_mut().ok_or(ClusterError::Disconnected)?;
        receiver.blocking_recv().ok_or(ClusterError::Disconnected)
    }
}

/// Sends `config` to every follower, or the error that prevented loading it.
pub fn broadcast_configuration(
    pipe: &mut dyn ClusterPipe,
    config: Result<&GraphConfiguration, &str>,
) -> Result<(), ClusterError> {
    match config {
        Ok(config) => {
            let text = config.to_toml()?;
            pipe.send(&[])?;
            pipe.send(text.as_bytes())?;
            debug!("Broadcast input graph ({} bytes)", text.len());
        }
        Err(message) => {
            // An empty message would read as success.
            let message = if message.is_empty() {
                "unknown error"
            } else {
                message
            };
            pipe.send(message.as_bytes())?;
            debug!("Broadcast input graph failure: {}", message);
        }
    }
    Ok(())
}

/// Receives the configuration broadcast by the master.
pub fn receive_configuration(
    pipe: &mut dyn ClusterPipe,
) -> Result<GraphConfiguration, ClusterError> {
    let header = pipe.receive()?;
    if !header.is_empty() {
        return Err(ClusterError::Remote(
            String::from_utf8_lossy(&header).into_owned(),
        ));
    }
    let body = pipe.receive()?;
    let text = String::from_utf8(body).map_err(|_| ClusterError::Encoding)?;
    Ok(GraphConfiguration::from_toml(&text)?)
}

/// Replaces the graph of `manager` with `config`.
///
/// The current graph is only cleared once the configuration is known to be
/// replayable.
pub fn install_configuration(
    manager: &mut ToolManager,
    config: &GraphConfiguration,
) -> Result<LoadReport, LoadError> {
    if config.version > CURRENT_VERSION {
        return Err(LoadError::UnsupportedVersion(config.version));
    }
    manager.clear();
    persist::apply_configuration(manager, config)
}

/// Loads an input graph on every node of the cluster.
///
/// The master reads `path` and broadcasts the outcome before applying it
/// locally; followers ignore `path` and apply what the master sent. A
/// failure on the master aborts the load everywhere.
pub fn load_clustered(
    manager: &mut ToolManager,
    pipe: &mut dyn ClusterPipe,
    path: &Path,
) -> Result<LoadReport> {
    if !pipe.is_master() {
        let config = receive_configuration(pipe).inspect_err(|err| {
            warn!("Aborting clustered input graph load: {}", err);
        })?;
        let report = install_configuration(manager, &config)?;
        info!(
            "Applied replicated input graph: {} devices, {} tools",
            report.devices.len(),
            report.tools.len()
        );
        return Ok(report);
    }

    let config = match persist::load_configuration(path) {
        Ok(config) => config,
        Err(err) => {
            broadcast_configuration(pipe, Err(&format!("{err:#}")))?;
            return Err(err);
        }
    };
    broadcast_configuration(pipe, Ok(&config))?;
    let report = install_configuration(manager, &config)?;
    info!(
        "Loaded input graph {} on master: {} devices, {} tools",
        path.display(),
        report.devices.len(),
        report.tools.len()
    );
    Ok(report)
}
