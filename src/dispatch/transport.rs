//! Pluggable wire seam between the dispatcher and remote agents.
//!
//! The concrete protocol (TCP/TLS framing, message bus) is an external
//! collaborator; this crate only needs a request/response byte exchange.
//! [`LocalTransport`] routes envelopes to in-process agents and is what the
//! test suites and embedded deployments use.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::agent::Agent;
use crate::error::{FleetError, Result};
use crate::target::Target;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver an encoded request envelope to a target and return its
    /// encoded result envelope. Errors are per-target: connection refusal,
    /// protocol failures, and the like.
    async fn send(&self, target: &Target, payload: Vec<u8>) -> Result<Vec<u8>>;
}

/// In-process transport routing by target address.
#[derive(Default)]
pub struct LocalTransport {
    agents: RwLock<HashMap<String, Arc<Agent>>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, addr: impl Into<String>, agent: Arc<Agent>) {
        self.agents.write().await.insert(addr.into(), agent);
    }

    pub async fn deregister(&self, addr: &str) -> bool {
        self.agents.write().await.remove(addr).is_some()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, target: &Target, payload: Vec<u8>) -> Result<Vec<u8>> {
        let agent = {
            let agents = self.agents.read().await;
            agents.get(&target.addr).cloned()
        };
        match agent {
            Some(agent) => agent.handle(&payload),
            None => Err(FleetError::Transport(format!(
                "connection refused: {}",
                target.addr
            ))),
        }
    }
}
