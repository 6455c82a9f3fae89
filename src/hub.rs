//! Hub actor: connection registry and broadcast coordination.
//!
//! The hub task is the only owner of the client table, so the table needs
//! no locking. All mutation happens through three control channels
//! (`register`, `unregister`, `broadcast`), processed one event at a time
//! in arrival order with no priority among the channels.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::client::Client;
use crate::error::HubError;
use crate::message::Message;

const REGISTER_BUFFER: usize = 32;
const UNREGISTER_BUFFER: usize = 32;
const BROADCAST_BUFFER: usize = 64;

/// Unregister request carrying enough identity to detect staleness.
#[derive(Debug)]
struct Unregister {
    nickname: String,
    id: Uuid,
}

/// The hub actor. Constructed once at startup; `run` consumes it and
/// loops for the lifetime of the process.
pub struct Hub {
    clients: HashMap<String, Client>,
    register_rx: mpsc::Receiver<Client>,
    unregister_rx: mpsc::Receiver<Unregister>,
    broadcast_rx: mpsc::Receiver<Message>,
}

/// Cloneable handle to the hub's control channels, shared by the
/// connection boundary and every pump.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<Client>,
    unregister_tx: mpsc::Sender<Unregister>,
    broadcast_tx: mpsc::Sender<Message>,
}

impl Hub {
    /// Create a hub together with the handle used to reach it.
    pub fn new() -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REGISTER_BUFFER);
        let (unregister_tx, unregister_rx) = mpsc::channel(UNREGISTER_BUFFER);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_BUFFER);

        let hub = Hub {
            clients: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
        };

        (hub, handle)
    }

    /// Run the control loop until every handle has been dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(client) = self.register_rx.recv() => self.handle_register(client),
                Some(request) = self.unregister_rx.recv() => self.handle_unregister(request),
                Some(message) = self.broadcast_rx.recv() => self.handle_broadcast(message),
                else => break,
            }
        }

        tracing::debug!("hub control loop stopped");
    }

    fn handle_register(&mut self, client: Client) {
        tracing::info!("client '{}' registered", client.nickname);

        // Last connect wins on duplicate nicknames. Dropping the shadowed
        // entry closes its mailbox, so the prior connection's writer pump
        // exits instead of lingering until its keepalive deadline.
        if let Some(shadowed) = self.clients.insert(client.nickname.clone(), client) {
            tracing::warn!(
                "nickname '{}' reconnected, shadowing a live connection",
                shadowed.nickname
            );
        }
    }

    fn handle_unregister(&mut self, request: Unregister) {
        // Only remove the entry if it is the same connection instance;
        // a stale reader from a shadowed connection must not unregister
        // its replacement. Idempotent by design: the reader pump and the
        // hub's own eviction may both try to remove the same client.
        let registered = self
            .clients
            .get(&request.nickname)
            .is_some_and(|client| client.id == request.id);

        if registered {
            self.clients.remove(&request.nickname);
            tracing::info!("client '{}' unregistered", request.nickname);
        }
    }

    fn handle_broadcast(&mut self, message: Message) {
        let mut evicted = Vec::new();

        for (nickname, client) in &self.clients {
            if message.nickname.as_deref() == Some(nickname.as_str()) {
                // No echo back to the sender.
                continue;
            }

            if let Err(err) = client.mailbox.try_send(message.clone()) {
                match err {
                    TrySendError::Full(_) => tracing::warn!(
                        "mailbox full for client '{}', evicting slow consumer",
                        nickname
                    ),
                    TrySendError::Closed(_) => {
                        tracing::debug!("mailbox for client '{}' already closed", nickname)
                    }
                }
                evicted.push(nickname.clone());
            }
        }

        // A full mailbox means the writer pump is not draining; the hub
        // never waits for it. Removing the entry drops the mailbox sender,
        // which signals the writer pump to exit.
        for nickname in evicted {
            self.clients.remove(&nickname);
        }
    }
}

impl HubHandle {
    /// Register a client, taking ownership of its mailbox sender.
    pub async fn register(&self, client: Client) -> Result<(), HubError> {
        self.register_tx
            .send(client)
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Request removal of the client registered under `nickname`, but
    /// only if it is still the instance identified by `id`.
    pub async fn unregister(&self, nickname: String, id: Uuid) -> Result<(), HubError> {
        self.unregister_tx
            .send(Unregister { nickname, id })
            .await
            .map_err(|_| HubError::Closed)
    }

    /// Hand a message to the hub for broadcast. This is a blocking
    /// handoff: the caller waits while the hub's broadcast buffer is full.
    pub async fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.broadcast_tx
            .send(message)
            .await
            .map_err(|_| HubError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn empty_hub() -> (Hub, HubHandle) {
        Hub::new()
    }

    fn chat(sender: &str, content: &str) -> Message {
        Message {
            nickname: Some(sender.to_string()),
            content: Some(content.to_string()),
        }
    }

    #[test]
    fn test_register_inserts_client() {
        // given: an empty hub
        let (mut hub, _handle) = empty_hub();
        let (alice, _alice_rx) = Client::new("alice".to_string());

        // when: alice registers
        hub.handle_register(alice);

        // then: the table contains exactly alice
        assert_eq!(hub.clients.len(), 1);
        assert!(hub.clients.contains_key("alice"));
    }

    #[test]
    fn test_register_duplicate_nickname_shadows_and_closes_prior_mailbox() {
        // given: alice is already registered
        let (mut hub, _handle) = empty_hub();
        let (first, mut first_rx) = Client::new("alice".to_string());
        hub.handle_register(first);

        // when: a second connection registers the same nickname
        let (second, _second_rx) = Client::new("alice".to_string());
        let second_id = second.id;
        hub.handle_register(second);

        // then: last connect wins and the shadowed mailbox is closed.
        // (The observed original left the shadowed mailbox open until its
        // keepalive deadline; closing it on overwrite is a deliberate
        // deviation so the orphaned writer pump exits promptly.)
        assert_eq!(hub.clients.len(), 1);
        assert_eq!(hub.clients["alice"].id, second_id);
        assert_eq!(first_rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_unregister_removes_matching_instance() {
        // given: alice is registered
        let (mut hub, _handle) = empty_hub();
        let (alice, mut alice_rx) = Client::new("alice".to_string());
        let alice_id = alice.id;
        hub.handle_register(alice);

        // when: alice unregisters with her own connection id
        hub.handle_unregister(Unregister {
            nickname: "alice".to_string(),
            id: alice_id,
        });

        // then: the table is empty and her mailbox is closed
        assert!(hub.clients.is_empty());
        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_unregister_absent_client_is_noop() {
        // given: an empty hub
        let (mut hub, _handle) = empty_hub();

        // when: an unknown client unregisters
        hub.handle_unregister(Unregister {
            nickname: "ghost".to_string(),
            id: Uuid::new_v4(),
        });

        // then: nothing happens
        assert!(hub.clients.is_empty());
    }

    #[test]
    fn test_unregister_stale_instance_keeps_replacement() {
        // given: alice reconnected, shadowing her first connection
        let (mut hub, _handle) = empty_hub();
        let (first, _first_rx) = Client::new("alice".to_string());
        let first_id = first.id;
        hub.handle_register(first);
        let (second, mut second_rx) = Client::new("alice".to_string());
        hub.handle_register(second);

        // when: the stale first connection's reader unregisters
        hub.handle_unregister(Unregister {
            nickname: "alice".to_string(),
            id: first_id,
        });

        // then: the replacement stays registered and reachable
        assert!(hub.clients.contains_key("alice"));
        assert_eq!(second_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_broadcast_skips_sender_and_reaches_everyone_else() {
        // given: alice, bob and charlie are registered
        let (mut hub, _handle) = empty_hub();
        let (alice, mut alice_rx) = Client::new("alice".to_string());
        let (bob, mut bob_rx) = Client::new("bob".to_string());
        let (charlie, mut charlie_rx) = Client::new("charlie".to_string());
        hub.handle_register(alice);
        hub.handle_register(bob);
        hub.handle_register(charlie);

        // when: alice's message is broadcast
        hub.handle_broadcast(chat("alice", "hi"));

        // then: bob and charlie receive it, alice does not
        assert_eq!(bob_rx.try_recv().unwrap(), chat("alice", "hi"));
        assert_eq!(charlie_rx.try_recv().unwrap(), chat("alice", "hi"));
        assert_eq!(alice_rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn test_broadcast_without_sender_nickname_reaches_everyone() {
        // given: alice is registered
        let (mut hub, _handle) = empty_hub();
        let (alice, mut alice_rx) = Client::new("alice".to_string());
        hub.handle_register(alice);

        // when: a message with no sender nickname is broadcast
        hub.handle_broadcast(Message {
            nickname: None,
            content: Some("hi".to_string()),
        });

        // then: no nickname matches, so even alice receives it
        assert!(alice_rx.try_recv().is_ok());
    }

    #[test]
    fn test_broadcast_evicts_slow_consumer_at_mailbox_capacity() {
        // given: bob's writer pump is paused (mailbox never drained)
        let (mut hub, _handle) = empty_hub();
        let (alice, _alice_rx) = Client::new("alice".to_string());
        let (bob, mut bob_rx) = Client::new("bob".to_string());
        hub.handle_register(alice);
        hub.handle_register(bob);

        // when: three broadcasts target bob without him draining
        hub.handle_broadcast(chat("alice", "one"));
        hub.handle_broadcast(chat("alice", "two"));
        hub.handle_broadcast(chat("alice", "three"));

        // then: the third broadcast found his mailbox full and evicted him
        assert!(!hub.clients.contains_key("bob"));
        assert!(hub.clients.contains_key("alice"));

        // and: a later broadcast is not delivered to bob
        hub.handle_broadcast(chat("alice", "four"));
        assert_eq!(bob_rx.try_recv().unwrap(), chat("alice", "one"));
        assert_eq!(bob_rx.try_recv().unwrap(), chat("alice", "two"));
        assert_eq!(bob_rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_run_loop_delivers_broadcasts_to_registered_clients() {
        // given: a running hub
        let (hub, handle) = Hub::new();
        let hub_task = tokio::spawn(hub.run());

        // when: registrations and a broadcast flow through the loop
        // (register and broadcast travel on different channels, so give
        // the loop a moment to drain the registrations first)
        let (alice, _alice_rx) = Client::new("alice".to_string());
        let (bob, mut bob_rx) = Client::new("bob".to_string());
        handle.register(alice).await.unwrap();
        handle.register(bob).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.broadcast(chat("alice", "hi")).await.unwrap();

        // then: bob sees the broadcast
        let received = bob_rx.recv().await.unwrap();
        assert_eq!(received, chat("alice", "hi"));

        // and: dropping the handle stops the loop
        drop(handle);
        hub_task.await.unwrap();
    }
}
