//! Connection registry and authenticated-identity bookkeeping.
//!
//! Connections live in an arena keyed by id; operations carry the id, not
//! a reference. The authenticated-identity registry (DN to connection
//! ids) has its own lock, independent of entry locks, and is mutated only
//! by bind, unbind, disconnect, and deletion of a bound identity's entry.

use chrono::{DateTime, Utc};
use dirserv_core::control::OID_NOTICE_OF_DISCONNECTION;
use dirserv_core::Dn;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// How a connection authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthType {
    /// Simple DN + password bind.
    Simple,
    /// SASL bind with the named mechanism.
    Sasl(String),
}

/// The identity a connection is bound as.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    /// Entry DN of the authenticated user.
    pub dn: Dn,
    /// Authentication type that established the identity.
    pub auth_type: AuthType,
}

/// An unsolicited notice of disconnection.
#[derive(Debug, Clone)]
pub struct DisconnectNotice {
    /// Always [`OID_NOTICE_OF_DISCONNECTION`].
    pub oid: &'static str,
    /// Reason text sent to the client.
    pub message: String,
}

impl DisconnectNotice {
    fn new(message: impl Into<String>) -> Self {
        Self {
            oid: OID_NOTICE_OF_DISCONNECTION,
            message: message.into(),
        }
    }
}

/// State tracked per client connection.
#[derive(Debug)]
pub struct ConnectionContext {
    /// Arena id.
    pub id: u64,
    /// Stable identifier for logs.
    pub uuid: Uuid,
    identity: Option<AuthenticatedIdentity>,
    /// Transport-level credential (e.g. client certificate subject DN),
    /// consumed by SASL EXTERNAL.
    pub transport_credential: Option<String>,
    last_activity: DateTime<Utc>,
    next_operation_id: i64,
}

impl ConnectionContext {
    /// The bound identity, if any.
    #[must_use]
    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        self.identity.as_ref()
    }

    /// Last request activity.
    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }
}

/// Arena of client connections plus the authenticated-identity registry.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<u64, ConnectionContext>>,
    identities: Mutex<HashMap<Dn, HashSet<u64>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection, returning its arena id.
    pub async fn open(&self, transport_credential: Option<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let context = ConnectionContext {
            id,
            uuid: Uuid::new_v4(),
            identity: None,
            transport_credential,
            last_activity: Utc::now(),
            next_operation_id: 0,
        };
        debug!(connection_id = id, uuid = %context.uuid, "connection opened");
        self.connections.lock().await.insert(id, context);
        id
    }

    /// Whether the connection is registered.
    pub async fn is_open(&self, id: u64) -> bool {
        self.connections.lock().await.contains_key(&id)
    }

    /// Allocate the next per-connection operation id.
    pub async fn next_operation_id(&self, id: u64) -> Option<i64> {
        let mut connections = self.connections.lock().await;
        let context = connections.get_mut(&id)?;
        context.next_operation_id += 1;
        Some(context.next_operation_id)
    }

    /// Record request activity on the connection.
    pub async fn touch(&self, id: u64) {
        if let Some(context) = self.connections.lock().await.get_mut(&id) {
            context.last_activity = Utc::now();
        }
    }

    /// The transport credential presented by the connection.
    pub async fn transport_credential(&self, id: u64) -> Option<String> {
        self.connections
            .lock()
            .await
            .get(&id)
            .and_then(|c| c.transport_credential.clone())
    }

    /// The connection's bound identity.
    pub async fn identity(&self, id: u64) -> Option<AuthenticatedIdentity> {
        self.connections
            .lock()
            .await
            .get(&id)
            .and_then(|c| c.identity.clone())
    }

    /// Bind the connection to `identity`, replacing any prior one.
    ///
    /// The previous identity leaves the registry as part of completing
    /// the new bind; a rebind strictly supersedes, never aliases.
    pub async fn bind_identity(&self, id: u64, identity: AuthenticatedIdentity) {
        let mut connections = self.connections.lock().await;
        let Some(context) = connections.get_mut(&id) else {
            return;
        };
        let previous = context.identity.replace(identity.clone());

        let mut identities = self.identities.lock().await;
        if let Some(prior) = previous {
            if let Some(holders) = identities.get_mut(&prior.dn) {
                holders.remove(&id);
                if holders.is_empty() {
                    identities.remove(&prior.dn);
                }
            }
        }
        identities.entry(identity.dn.clone()).or_default().insert(id);
        info!(connection_id = id, dn = %identity.dn, "authenticated identity updated");
    }

    /// Drop the connection's identity (anonymous rebind, unbind).
    pub async fn clear_identity(&self, id: u64) {
        let mut connections = self.connections.lock().await;
        let Some(context) = connections.get_mut(&id) else {
            return;
        };
        if let Some(prior) = context.identity.take() {
            let mut identities = self.identities.lock().await;
            if let Some(holders) = identities.get_mut(&prior.dn) {
                holders.remove(&id);
                if holders.is_empty() {
                    identities.remove(&prior.dn);
                }
            }
        }
    }

    /// Connections currently bound as `dn`.
    pub async fn connections_bound_as(&self, dn: &Dn) -> Vec<u64> {
        self.identities
            .lock()
            .await
            .get(dn)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Strip the identity from every connection bound as `dn`. Called
    /// when the bound entry itself is deleted.
    pub async fn deregister_identity(&self, dn: &Dn) {
        let holders: Vec<u64> = {
            let mut identities = self.identities.lock().await;
            identities
                .remove(dn)
                .map(|set| set.into_iter().collect())
                .unwrap_or_default()
        };
        if holders.is_empty() {
            return;
        }
        let mut connections = self.connections.lock().await;
        for id in holders {
            if let Some(context) = connections.get_mut(&id) {
                context.identity = None;
            }
        }
        info!(dn = %dn, "identity deregistered after entry removal");
    }

    /// Close a connection without notifying the client.
    pub async fn close(&self, id: u64) {
        self.clear_identity(id).await;
        self.connections.lock().await.remove(&id);
        debug!(connection_id = id, "connection closed");
    }

    /// Unilaterally disconnect a connection. When `notify` is set, the
    /// returned notice is sent before the close; no further requests are
    /// read either way.
    pub async fn disconnect(
        &self,
        id: u64,
        notify: bool,
        message: impl Into<String>,
    ) -> Option<DisconnectNotice> {
        let message = message.into();
        info!(connection_id = id, %message, "disconnecting client");
        self.close(id).await;
        notify.then(|| DisconnectNotice::new(message))
    }

    /// Per-connection activity: id, bound identity DN, last activity.
    pub async fn activity_snapshot(&self) -> Vec<(u64, Option<Dn>, DateTime<Utc>)> {
        self.connections
            .lock()
            .await
            .values()
            .map(|c| {
                (
                    c.id,
                    c.identity.as_ref().map(|identity| identity.dn.clone()),
                    c.last_activity,
                )
            })
            .collect()
    }

}
