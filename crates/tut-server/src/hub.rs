//! Live-reload hub.
//!
//! One coordinator task owns the client registry. Every other task talks to
//! it through [`Hub`] handles, which only enqueue commands.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Event sent to connected browsers when a tutorial was rebuilt.
#[derive(Clone, Debug, Serialize)]
pub struct ReloadEvent {
    /// Event type (always "reload").
    #[serde(rename = "type")]
    event_type: String,
    /// Public URL of the rebuilt tutorial.
    path: String,
}

impl ReloadEvent {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            event_type: "reload".to_owned(),
            path: path.into(),
        }
    }

    /// JSON wire form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Identifier of a registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

/// The coordinator is gone.
#[derive(Debug, thiserror::Error)]
#[error("live-reload hub is stopped")]
pub struct HubStopped;

enum Command {
    Register(ClientId, mpsc::Sender<String>),
    Unregister(ClientId),
    Broadcast(String),
    Count(oneshot::Sender<usize>),
    Stop,
}

/// Handle to the hub coordinator.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
}

/// A registered client: the receiving end of its outbound buffer.
///
/// Dropping it deregisters the client.
pub struct HubClient {
    id: ClientId,
    messages: mpsc::Receiver<String>,
    hub: Hub,
}

impl HubClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Next queued message, or `None` once the hub dropped this client.
    pub async fn recv(&mut self) -> Option<String> {
        self.messages.recv().await
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        let _ = self.hub.disconnect(self.id);
    }
}

impl Hub {
    /// Spawn the coordinator. Each client buffers up to `buffer` messages.
    pub fn start(buffer: usize) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let coordinator = Coordinator {
            clients: HashMap::new(),
            commands: commands.downgrade(),
        };
        let handle = tokio::spawn(coordinator.run(receiver));
        let hub = Self {
            commands,
            next_id: Arc::new(AtomicU64::new(0)),
            buffer: buffer.max(1),
        };
        (hub, handle)
    }

    /// Register a new client.
    pub fn connect(&self) -> Result<HubClient, HubStopped> {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, messages) = mpsc::channel(self.buffer);
        self.commands
            .send(Command::Register(id, sender))
            .map_err(|_| HubStopped)?;
        Ok(HubClient {
            id,
            messages,
            hub: self.clone(),
        })
    }

    /// Broadcast `message` to every registered client. Never waits on clients.
    pub fn send(&self, message: impl Into<String>) -> Result<(), HubStopped> {
        self.commands
            .send(Command::Broadcast(message.into()))
            .map_err(|_| HubStopped)
    }

    pub fn disconnect(&self, id: ClientId) -> Result<(), HubStopped> {
        self.commands
            .send(Command::Unregister(id))
            .map_err(|_| HubStopped)
    }

    /// Disconnect every client and halt the coordinator.
    pub fn stop(&self) -> Result<(), HubStopped> {
        self.commands.send(Command::Stop).map_err(|_| HubStopped)
    }

    /// Number of registered clients, as seen by the coordinator.
    pub async fn client_count(&self) -> Result<usize, HubStopped> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Count(tx))
            .map_err(|_| HubStopped)?;
        rx.await.map_err(|_| HubStopped)
    }
}

struct Coordinator {
    clients: HashMap<ClientId, mpsc::Sender<String>>,
    commands: mpsc::WeakUnboundedSender<Command>,
}

impl Coordinator {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Register(id, sender) => {
                    self.clients.insert(id, sender);
                    debug!(client = id.0, clients = self.clients.len(), "Client connected");
                }
                Command::Unregister(id) => {
                    if self.clients.remove(&id).is_some() {
                        debug!(client = id.0, clients = self.clients.len(), "Client disconnected");
                    }
                }
                Command::Broadcast(message) => self.broadcast(&message),
                Command::Count(reply) => {
                    let _ = reply.send(self.clients.len());
                }
                Command::Stop => break,
            }
        }
        info!(clients = self.clients.len(), "Live-reload hub stopped");
        self.clients.clear();
    }

    fn broadcast(&self, message: &str) {
        for (id, sender) in &self.clients {
            match sender.try_send(message.to_owned()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(client = id.0, "Client buffer full, dropping client");
                    self.request_unregister(*id);
                }
                Err(TrySendError::Closed(_)) => self.request_unregister(*id),
            }
        }
    }

    /// Queue removal behind the commands already pending.
    fn request_unregister(&self, id: ClientId) {
        if let Some(commands) = self.commands.upgrade() {
            let _ = commands.send(Command::Unregister(id));
        }
    }
}
