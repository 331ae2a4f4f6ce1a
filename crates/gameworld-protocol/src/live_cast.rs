//! Process-wide registry of casting sessions.
//!
//! The registry maps a casting player to a weak reference of its session and
//! enforces the server-wide cast limit. Lock order is always registry first,
//! then the session's [`LiveCast`](crate::spectators::LiveCast); nothing here
//! sends to a spectator while holding either lock.
//!
//! Metadata rows are written by a [`StoreWriter`] thread. Every store update
//! is enqueued while the registry lock is held, so the writer applies them in
//! the same order the registry changed.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, Weak};

use crate::cast_store::{CastInfo, CastInfoStore, StoreWriter};
use crate::error::CastError;
use crate::lock;
use crate::session::{ProtocolSession, SessionState};
use crate::settings::CAST_CEILING;
use crate::types::PlayerId;

/// A running cast as listed to players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastSummary {
    pub player_id: PlayerId,
    pub name: String,
    pub password_protected: bool,
    pub viewers: u8,
}

/// Registry of casting sessions plus their persisted metadata.
pub struct LiveCastRegistry {
    max_casts: u8,
    casts: Mutex<HashMap<PlayerId, Weak<ProtocolSession>>>,
    store: StoreWriter,
}

impl LiveCastRegistry {
    /// `max_casts` is clamped to the signed-byte ceiling. Fails only if the
    /// store writer thread cannot be spawned.
    pub fn new(max_casts: u8, store: Arc<dyn CastInfoStore>) -> io::Result<Self> {
        Ok(Self {
            max_casts: max_casts.min(CAST_CEILING),
            casts: Mutex::new(HashMap::new()),
            store: StoreWriter::spawn(store)?,
        })
    }

    pub fn max_casts(&self) -> u8 {
        self.max_casts
    }

    /// Wait until every queued metadata write has reached the store.
    pub fn flush_store(&self) -> bool {
        self.store.flush()
    }

    /// Start a cast for the session's player.
    ///
    /// Fails with [`CastError::CastLimitExceeded`] when the server is full or
    /// the player is already casting. The ceiling check and the insert happen
    /// under one lock, so concurrent starts can never overshoot it.
    pub fn register(&self, session: &Arc<ProtocolSession>, password: &str) -> Result<(), CastError> {
        let player = session.player_id().ok_or(CastError::NoPlayer)?;
        let name = session.player_name().ok_or(CastError::NoPlayer)?;
        {
            let mut casts = lock(&self.casts);
            // Checked under the lock: a session that began closing has
            // already passed its own unregister.
            if session.state() != SessionState::Active {
                return Err(CastError::NoPlayer);
            }
            casts.retain(|_, weak| weak.strong_count() > 0);
            if casts.contains_key(&player) || casts.len() >= self.max_casts as usize {
                return Err(CastError::CastLimitExceeded);
            }
            if !session.live_cast().begin(name, password) {
                return Err(CastError::CastLimitExceeded);
            }
            casts.insert(player, Arc::downgrade(session));
        }

        tracing::info!(player = %player, cast = name, "Live cast started");
        self.publish(session);
        Ok(())
    }

    /// Stop the session's cast and close its audience.
    pub fn unregister(&self, session: &ProtocolSession) -> Result<(), CastError> {
        let player = session.player_id().ok_or(CastError::NoPlayer)?;
        let audience = {
            let mut casts = lock(&self.casts);
            match casts.get(&player) {
                Some(weak) if std::ptr::eq(weak.as_ptr(), session) => {
                    casts.remove(&player);
                }
                _ => return Err(CastError::NotCasting),
            }
            self.store.remove(player);
            session.live_cast().end()
        };

        for spectator in &audience {
            spectator.close();
        }
        tracing::info!(player = %player, spectators = audience.len(), "Live cast stopped");
        Ok(())
    }

    /// Live session casting for `player`.
    pub fn lookup(&self, player: PlayerId) -> Option<Arc<ProtocolSession>> {
        lock(&self.casts).get(&player).and_then(Weak::upgrade)
    }

    /// Live session casting under `name`, compared case-insensitively.
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<ProtocolSession>> {
        lock(&self.casts)
            .values()
            .filter_map(Weak::upgrade)
            .find(|session| {
                session
                    .player_name()
                    .is_some_and(|cast| cast.eq_ignore_ascii_case(name))
            })
    }

    /// Every running cast, ordered by player id.
    pub fn casts(&self) -> Vec<CastSummary> {
        let sessions: Vec<_> = lock(&self.casts).values().filter_map(Weak::upgrade).collect();
        let mut summaries: Vec<_> = sessions
            .iter()
            .filter_map(|session| {
                let player_id = session.player_id()?;
                let snapshot = session.live_cast().snapshot()?;
                Some(CastSummary {
                    player_id,
                    name: snapshot.name,
                    password_protected: snapshot.password_protected,
                    viewers: snapshot.viewers,
                })
            })
            .collect();
        summaries.sort_by_key(|summary| summary.player_id);
        summaries
    }

    pub fn len(&self) -> usize {
        lock(&self.casts).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.casts).is_empty()
    }

    /// Queue the session's current cast metadata for the store.
    ///
    /// Does nothing unless the session is the registered caster for its
    /// player, so a publish racing [`unregister`](Self::unregister) cannot
    /// resurrect the row. The snapshot is taken under the registry lock,
    /// which keeps viewer counts in the store in the order they changed.
    pub fn publish(&self, session: &ProtocolSession) {
        let Some(player_id) = session.player_id() else {
            return;
        };
        let casts = lock(&self.casts);
        let registered = casts
            .get(&player_id)
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), session));
        if !registered {
            return;
        }
        let Some(snapshot) = session.live_cast().snapshot() else {
            return;
        };
        self.store.upsert(CastInfo {
            player_id,
            cast_name: snapshot.name,
            password_protected: snapshot.password_protected,
            viewers: snapshot.viewers,
        });
    }

    /// End every cast and wipe the persisted metadata.
    ///
    /// Run at startup to drop rows left by a crash and at shutdown. Idempotent.
    pub fn clear_all(&self) {
        let drained: Vec<_> = {
            let mut casts = lock(&self.casts);
            self.store.clear_all();
            casts.drain().map(|(_, weak)| weak).collect()
        };
        let mut ended = 0;
        for session in drained.iter().filter_map(Weak::upgrade) {
            for spectator in session.live_cast().end() {
                spectator.close();
            }
            ended += 1;
        }
        tracing::info!(casts = ended, "Cleared live cast registry");
    }
}
