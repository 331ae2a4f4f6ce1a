//! A caster's live audience.
//!
//! [`LiveCast`] holds the casting flag and the spectator list together. The
//! flag is an atomic so hot send paths can skip the lock when nobody casts;
//! it only ever changes while the list lock is held, so a reader that takes
//! the lock always sees the two agree.
//!
//! Each spectator carries its own known-creature cache. A spectator that
//! joins late has never been described the creatures the caster already
//! knows, so creature frames are rendered per spectator.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use gameworld_net::ConnectionId;

use crate::error::{CastError, SendError};
use crate::known_creatures::{KnownCreatures, Remembered};
use crate::lock;
use crate::outbox::Frame;
use crate::settings::CAST_CEILING;
use crate::types::CreatureId;

/// A connection watching a cast.
pub trait SpectatorEndpoint: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Name shown in the cast chat.
    fn name(&self) -> &str;

    /// Queue a frame. An error means the spectator is gone for good.
    fn send(&self, frame: Frame) -> Result<(), SendError>;

    /// Close the connection after pending frames.
    fn close(&self);
}

/// Result of a [`LiveCast::broadcast`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Spectators whose send failed. They have been removed.
    pub dropped: Vec<ConnectionId>,
}

/// Public description of a running cast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastSnapshot {
    pub name: String,
    pub password_protected: bool,
    pub viewers: u8,
}

struct Viewer {
    endpoint: Arc<dyn SpectatorEndpoint>,
    known: KnownCreatures,
}

#[derive(Default)]
struct CastState {
    name: String,
    password: String,
    spectators: Vec<Viewer>,
}

impl CastState {
    fn endpoints(&self) -> Vec<Arc<dyn SpectatorEndpoint>> {
        self.spectators
            .iter()
            .map(|viewer| Arc::clone(&viewer.endpoint))
            .collect()
    }

    fn prune(&mut self, dropped: &[ConnectionId]) {
        self.spectators
            .retain(|viewer| !dropped.contains(&viewer.endpoint.id()));
    }
}

/// Casting flag plus spectator list of one session.
pub struct LiveCast {
    casting: AtomicBool,
    max_spectators: u8,
    known_creature_capacity: usize,
    state: Mutex<CastState>,
}

impl LiveCast {
    /// `max_spectators` is clamped to the signed-byte ceiling. Every
    /// spectator gets a known-creature cache of `known_creature_capacity`.
    pub fn new(max_spectators: u8, known_creature_capacity: usize) -> Self {
        Self {
            casting: AtomicBool::new(false),
            max_spectators: max_spectators.min(CAST_CEILING),
            known_creature_capacity,
            state: Mutex::new(CastState::default()),
        }
    }

    pub fn is_casting(&self) -> bool {
        self.casting.load(Ordering::Acquire)
    }

    pub fn max_spectators(&self) -> u8 {
        self.max_spectators
    }

    /// Start casting under `name`. Returns `false` if already casting.
    pub(crate) fn begin(&self, name: &str, password: &str) -> bool {
        let mut state = lock(&self.state);
        if self.casting.load(Ordering::Acquire) {
            return false;
        }
        state.name = name.to_string();
        state.password = password.to_string();
        state.spectators.clear();
        self.casting.store(true, Ordering::Release);
        true
    }

    /// Stop casting and hand back the audience so the caller can close it
    /// outside the lock.
    pub(crate) fn end(&self) -> Vec<Arc<dyn SpectatorEndpoint>> {
        let mut state = lock(&self.state);
        self.casting.store(false, Ordering::Release);
        state.password.clear();
        std::mem::take(&mut state.spectators)
            .into_iter()
            .map(|viewer| viewer.endpoint)
            .collect()
    }

    /// Admit a spectator. Returns the new audience size.
    ///
    /// `greeting` is queued to the newcomer before it becomes visible to
    /// [`broadcast`](Self::broadcast), so it always precedes mirrored traffic.
    /// Queuing never blocks.
    pub fn add(
        &self,
        spectator: Arc<dyn SpectatorEndpoint>,
        password: &str,
        greeting: &[Frame],
    ) -> Result<u8, CastError> {
        let mut state = lock(&self.state);
        if !self.casting.load(Ordering::Acquire) {
            return Err(CastError::NotCasting);
        }
        if state.password != password {
            return Err(CastError::AuthenticationFailed);
        }
        if state.spectators.len() >= self.max_spectators as usize {
            return Err(CastError::SpectatorLimitExceeded);
        }
        if !state
            .spectators
            .iter()
            .any(|viewer| viewer.endpoint.id() == spectator.id())
        {
            for frame in greeting {
                // A dead newcomer is dropped by the next broadcast.
                let _ = spectator.send(Arc::clone(frame));
            }
            state.spectators.push(Viewer {
                endpoint: spectator,
                known: KnownCreatures::new(self.known_creature_capacity),
            });
        }
        Ok(state.spectators.len() as u8)
    }

    /// Remove a spectator by connection. Returns whether it was present.
    pub fn remove(&self, id: ConnectionId) -> bool {
        let mut state = lock(&self.state);
        let before = state.spectators.len();
        state.spectators.retain(|viewer| viewer.endpoint.id() != id);
        state.spectators.len() != before
    }

    /// Send `frame` to every spectator.
    ///
    /// The list is snapshotted under the lock and sent to outside it, so slow
    /// spectators never hold up joins or leaves. Spectators whose send fails
    /// are removed afterwards.
    pub fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        if !self.is_casting() {
            return BroadcastReport::default();
        }
        let targets = {
            let state = lock(&self.state);
            if !self.casting.load(Ordering::Acquire) {
                return BroadcastReport::default();
            }
            state.endpoints()
        };

        let mut report = BroadcastReport::default();
        for spectator in &targets {
            match spectator.send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(SendError::Closed) => report.dropped.push(spectator.id()),
            }
        }

        if !report.dropped.is_empty() {
            lock(&self.state).prune(&report.dropped);
        }
        report
    }

    /// Send a creature frame rendered against each spectator's own cache.
    ///
    /// `render` is called at most once per distinct [`Remembered`] outcome.
    /// Cache updates and sends happen under the list lock, so every spectator
    /// receives descriptions in the order its cache recorded them. Queuing
    /// never blocks.
    pub fn broadcast_creature(
        &self,
        creature: CreatureId,
        render: impl Fn(Remembered) -> Frame,
    ) -> BroadcastReport {
        if !self.is_casting() {
            return BroadcastReport::default();
        }
        let mut state = lock(&self.state);
        if !self.casting.load(Ordering::Acquire) {
            return BroadcastReport::default();
        }

        let mut rendered: Vec<(Remembered, Frame)> = Vec::new();
        let mut report = BroadcastReport::default();
        for viewer in state.spectators.iter_mut() {
            let outcome = viewer.known.remember(creature);
            let frame = match rendered.iter().find(|(seen, _)| *seen == outcome) {
                Some((_, frame)) => Arc::clone(frame),
                None => {
                    let frame = render(outcome);
                    rendered.push((outcome, Arc::clone(&frame)));
                    frame
                }
            };
            match viewer.endpoint.send(frame) {
                Ok(()) => report.delivered += 1,
                Err(SendError::Closed) => report.dropped.push(viewer.endpoint.id()),
            }
        }
        if !report.dropped.is_empty() {
            state.prune(&report.dropped);
        }
        report
    }

    /// The creature is gone for good; drop it from every spectator's cache.
    pub fn forget_creature(&self, creature: CreatureId) {
        for viewer in lock(&self.state).spectators.iter_mut() {
            viewer.known.forget(creature);
        }
    }

    /// Current audience size.
    pub fn viewers(&self) -> u8 {
        lock(&self.state).spectators.len() as u8
    }

    /// `None` unless casting.
    pub fn snapshot(&self) -> Option<CastSnapshot> {
        let state = lock(&self.state);
        if !self.casting.load(Ordering::Acquire) {
            return None;
        }
        Some(CastSnapshot {
            name: state.name.clone(),
            password_protected: !state.password.is_empty(),
            viewers: state.spectators.len() as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeSpectator;
    use std::sync::atomic::AtomicUsize;

    fn frame(bytes: &[u8]) -> Frame {
        Arc::from(bytes)
    }

    #[test]
    fn test_add_requires_active_cast_and_password() {
        let cast = LiveCast::new(10, 250);
        let viewer = FakeSpectator::new(1);
        assert_eq!(cast.add(viewer.clone(), "", &[]), Err(CastError::NotCasting));

        assert!(cast.begin("Knight", "pw"));
        assert_eq!(
            cast.add(viewer.clone(), "nope", &[]),
            Err(CastError::AuthenticationFailed)
        );
        assert_eq!(cast.add(viewer, "pw", &[]), Ok(1));
        assert_eq!(cast.viewers(), 1);
    }

    #[test]
    fn test_greeting_precedes_broadcast_traffic() {
        let cast = LiveCast::new(4, 250);
        cast.begin("Knight", "");
        let viewer = FakeSpectator::new(1);
        cast.add(viewer.clone(), "", &[frame(b"hello")]).unwrap();
        cast.broadcast(&frame(b"world"));
        assert_eq!(viewer.frames(), vec![b"hello".to_vec(), b"world".to_vec()]);

        let refused = FakeSpectator::new(2);
        cast.end();
        assert!(cast.add(refused.clone(), "", &[frame(b"hello")]).is_err());
        assert!(refused.frames().is_empty());
    }

    #[test]
    fn test_capacity_rejects_without_counting() {
        let cast = LiveCast::new(2, 250);
        cast.begin("Knight", "");
        assert_eq!(cast.add(FakeSpectator::new(1), "", &[]), Ok(1));
        assert_eq!(cast.add(FakeSpectator::new(2), "", &[]), Ok(2));
        assert_eq!(
            cast.add(FakeSpectator::new(3), "", &[]),
            Err(CastError::SpectatorLimitExceeded)
        );
        assert_eq!(cast.viewers(), 2);
    }

    #[test]
    fn test_ceiling_clamps_configured_limit() {
        assert_eq!(LiveCast::new(u8::MAX, 250).max_spectators(), 127);
    }

    #[test]
    fn test_readding_same_connection_is_idempotent() {
        let cast = LiveCast::new(4, 250);
        cast.begin("Knight", "");
        let viewer = FakeSpectator::new(1);
        cast.add(viewer.clone(), "", &[]).unwrap();
        assert_eq!(cast.add(viewer, "", &[]), Ok(1));
    }

    #[test]
    fn test_broadcast_drops_failed_spectators() {
        let cast = LiveCast::new(4, 250);
        cast.begin("Knight", "");
        let healthy = FakeSpectator::new(1);
        let broken = FakeSpectator::new(2);
        cast.add(healthy.clone(), "", &[]).unwrap();
        cast.add(broken.clone(), "", &[]).unwrap();
        broken.fail_sends();

        let report = cast.broadcast(&frame(b"\x8c"));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![ConnectionId(2)]);
        assert_eq!(cast.viewers(), 1);
        assert_eq!(healthy.frames(), vec![b"\x8c".to_vec()]);
    }

    #[test]
    fn test_end_returns_audience_and_blocks_broadcast() {
        let cast = LiveCast::new(4, 250);
        cast.begin("Knight", "pw");
        let viewer = FakeSpectator::new(1);
        cast.add(viewer.clone(), "pw", &[]).unwrap();

        let audience = cast.end();
        assert_eq!(audience.len(), 1);
        assert!(!cast.is_casting());
        assert_eq!(cast.broadcast(&frame(b"x")), BroadcastReport::default());
        assert!(viewer.frames().is_empty());
        assert!(cast.snapshot().is_none());
    }

    #[test]
    fn test_snapshot_reports_protection() {
        let cast = LiveCast::new(4, 250);
        cast.begin("Knight", "pw");
        let snap = cast.snapshot().unwrap();
        assert_eq!(snap.name, "Knight");
        assert!(snap.password_protected);
        assert_eq!(snap.viewers, 0);
    }

    #[test]
    fn test_concurrent_joins_leaves_and_broadcasts() {
        let cast = Arc::new(LiveCast::new(127, 250));
        cast.begin("Knight", "");
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let cast = Arc::clone(&cast);
                let added = Arc::clone(&added);
                let removed = Arc::clone(&removed);
                std::thread::spawn(move || {
                    for i in 0..200u64 {
                        let id = t * 1000 + i;
                        if cast.add(FakeSpectator::new(id), "", &[]).is_ok() {
                            added.fetch_add(1, Ordering::SeqCst);
                        }
                        cast.broadcast(&frame(b"tick"));
                        if i % 2 == 0 && cast.remove(ConnectionId(id)) {
                            removed.fetch_add(1, Ordering::SeqCst);
                        }
                        assert!(cast.viewers() <= 127);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let expected = added.load(Ordering::SeqCst) - removed.load(Ordering::SeqCst);
        assert_eq!(cast.viewers() as usize, expected);
        assert!(cast.viewers() <= 127);
    }

    fn creature_frame(outcome: Remembered) -> Frame {
        let tag: &[u8] = match outcome {
            Remembered::AlreadyKnown => b"known",
            Remembered::Added => b"full",
            Remembered::Replaced { .. } => b"evict",
        };
        frame(tag)
    }

    #[test]
    fn test_late_spectator_gets_full_description() {
        let cast = LiveCast::new(4, 250);
        cast.begin("Knight", "");
        let early = FakeSpectator::new(1);
        cast.add(early.clone(), "", &[]).unwrap();
        cast.broadcast_creature(CreatureId(9), creature_frame);

        let late = FakeSpectator::new(2);
        cast.add(late.clone(), "", &[]).unwrap();
        let report = cast.broadcast_creature(CreatureId(9), creature_frame);
        assert_eq!(report.delivered, 2);
        assert_eq!(early.frames(), vec![b"full".to_vec(), b"known".to_vec()]);
        assert_eq!(late.frames(), vec![b"full".to_vec()]);
    }

    #[test]
    fn test_spectator_caches_evict_independently() {
        let cast = LiveCast::new(4, 1);
        cast.begin("Knight", "");
        let viewer = FakeSpectator::new(1);
        cast.add(viewer.clone(), "", &[]).unwrap();
        cast.broadcast_creature(CreatureId(1), creature_frame);
        cast.broadcast_creature(CreatureId(2), creature_frame);
        assert_eq!(viewer.frames(), vec![b"full".to_vec(), b"evict".to_vec()]);

        cast.forget_creature(CreatureId(2));
        cast.broadcast_creature(CreatureId(2), creature_frame);
        assert_eq!(viewer.frames().last().unwrap(), b"full");
    }

    #[test]
    fn test_creature_broadcast_drops_failed_spectators() {
        let cast = LiveCast::new(4, 250);
        cast.begin("Knight", "");
        let broken = FakeSpectator::new(1);
        cast.add(broken.clone(), "", &[]).unwrap();
        broken.fail_sends();

        let report = cast.broadcast_creature(CreatureId(9), creature_frame);
        assert_eq!(report.dropped, vec![ConnectionId(1)]);
        assert_eq!(cast.viewers(), 0);

        cast.end();
        assert_eq!(
            cast.broadcast_creature(CreatureId(9), creature_frame),
            BroadcastReport::default()
        );
    }
}
