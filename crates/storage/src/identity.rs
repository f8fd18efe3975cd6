use std::sync::OnceLock;

use super::KeyValueStore;
use super::ids::SessionId;

/// Store key holding the anonymous session identifier.
pub const SESSION_ID_KEY: &str = "userId";

/// How the cached identifier was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityOrigin {
    /// Read back from the store.
    Loaded,
    /// Generated on this run and persisted.
    Generated,
    /// Generated on this run but the store was unavailable; lives in memory only.
    Ephemeral,
}

#[derive(Debug, Clone, Copy)]
struct ResolvedIdentity {
    id: SessionId,
    origin: IdentityOrigin,
}

/// Produces the durable anonymous identifier for this client installation.
///
/// The store is consulted at most once per process. Persistence failures never surface:
/// the identifier falls back to an in-memory value and persistence is not retried.
pub struct SessionIdentity<S> {
    store: S,
    resolved: OnceLock<ResolvedIdentity>,
}

impl<S: KeyValueStore> SessionIdentity<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            resolved: OnceLock::new(),
        }
    }

    pub fn get_or_create_session_id(&self) -> SessionId {
        self.resolved.get_or_init(|| self.resolve()).id
    }

    /// Returns how the identifier was obtained, resolving it first if needed.
    pub fn origin(&self) -> IdentityOrigin {
        self.resolved.get_or_init(|| self.resolve()).origin
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn resolve(&self) -> ResolvedIdentity {
        match self.store.get(SESSION_ID_KEY) {
            Ok(Some(raw)) => match SessionId::parse(&raw) {
                Ok(id) => {
                    tracing::debug!(session_id = %id, "loaded persisted session id");
                    return ResolvedIdentity {
                        id,
                        origin: IdentityOrigin::Loaded,
                    };
                }
                Err(error) => {
                    tracing::warn!(%error, "stored session id is invalid; generating a new one");
                }
            },
            Ok(None) => {}
            Err(error) => {
                let id = SessionId::new_v4();
                tracing::warn!(
                    %error,
                    session_id = %id,
                    "session store unavailable; using in-memory session id"
                );
                return ResolvedIdentity {
                    id,
                    origin: IdentityOrigin::Ephemeral,
                };
            }
        }

        let id = SessionId::new_v4();
        match self.store.set(SESSION_ID_KEY, &id.to_string()) {
            Ok(()) => {
                tracing::info!(session_id = %id, "generated and persisted new session id");
                ResolvedIdentity {
                    id,
                    origin: IdentityOrigin::Generated,
                }
            }
            Err(error) => {
                tracing::warn!(
                    %error,
                    session_id = %id,
                    "failed to persist session id; using in-memory session id"
                );
                ResolvedIdentity {
                    id,
                    origin: IdentityOrigin::Ephemeral,
                }
            }
        }
    }
}
