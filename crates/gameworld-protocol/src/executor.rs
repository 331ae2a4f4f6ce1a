//! Single-threaded game executor.
//!
//! All game mutation runs on one OS thread that owns the [`GameWorld`].
//! Network tasks hand work over as boxed closures through a crossbeam channel
//! and never wait for the result.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::JoinHandle;

use crate::game::GameWorld;

/// Deferred unit of game work.
pub type GameTask = Box<dyn FnOnce(&mut dyn GameWorld) + Send>;

enum Job {
    Run(GameTask),
    Stop,
}

/// Cloneable handle for queuing work on the executor.
#[derive(Clone)]
pub struct Dispatcher {
    sender: crossbeam_channel::Sender<Job>,
}

/// Owner of the executor thread. Dropping it stops the thread after the
/// tasks already queued.
pub struct DispatcherThread {
    sender: crossbeam_channel::Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the executor thread, moving `world` onto it.
    pub fn spawn<W: GameWorld>(world: W) -> std::io::Result<(Dispatcher, DispatcherThread)> {
        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();

        let handle = std::thread::Builder::new()
            .name("game-dispatcher".into())
            .spawn(move || {
                let mut world = world;
                while let Ok(job) = receiver.recv() {
                    match job {
                        Job::Run(task) => {
                            let result = catch_unwind(AssertUnwindSafe(|| task(&mut world)));
                            if result.is_err() {
                                tracing::error!("Game task panicked, executor keeps running");
                            }
                        }
                        Job::Stop => break,
                    }
                }
                tracing::debug!("Game dispatcher stopped");
            })?;

        Ok((
            Dispatcher {
                sender: sender.clone(),
            },
            DispatcherThread {
                sender,
                handle: Some(handle),
            },
        ))
    }

    /// Queue `task` behind everything already submitted. Returns `false` once
    /// the executor has stopped.
    pub fn add_task<F>(&self, task: F) -> bool
    where
        F: FnOnce(&mut dyn GameWorld) + Send + 'static,
    {
        self.sender.send(Job::Run(Box::new(task))).is_ok()
    }

    /// Block until every task queued before this call has run.
    ///
    /// Must not be called from the executor thread itself.
    pub fn barrier(&self) -> bool {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        if !self.add_task(move |_| {
            let _ = done_tx.send(());
        }) {
            return false;
        }
        done_rx.recv().is_ok()
    }
}

impl DispatcherThread {
    /// Run the remaining queue, then join the thread.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.sender.send(Job::Stop);
            if handle.join().is_err() {
                tracing::error!("Game dispatcher thread panicked");
            }
        }
    }
}

impl Drop for DispatcherThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crate::game::LoginRequest;
    use crate::session::ProtocolSession;
    use crate::types::PlayerId;

    #[derive(Default)]
    struct CountingWorld {
        log: Arc<Mutex<Vec<u32>>>,
    }

    impl GameWorld for CountingWorld {
        fn player_login(&mut self, _request: LoginRequest, _session: Arc<ProtocolSession>) {}

        fn player_logout(&mut self, player: PlayerId, _forced: bool) {
            self.log.lock().unwrap().push(player.0);
        }
    }

    #[test]
    fn test_tasks_run_in_submission_order() {
        let world = CountingWorld::default();
        let log = Arc::clone(&world.log);
        let (dispatcher, _thread) = Dispatcher::spawn(world).unwrap();

        for id in 0..100 {
            assert!(dispatcher.add_task(move |game| game.player_logout(PlayerId(id), false)));
        }
        assert!(dispatcher.barrier());
        assert_eq!(*log.lock().unwrap(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_task_does_not_stop_executor() {
        let world = CountingWorld::default();
        let log = Arc::clone(&world.log);
        let (dispatcher, _thread) = Dispatcher::spawn(world).unwrap();

        dispatcher.add_task(|_| panic!("boom"));
        dispatcher.add_task(|game| game.player_logout(PlayerId(7), true));
        assert!(dispatcher.barrier());
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    #[test]
    fn test_shutdown_drains_queue_then_rejects() {
        let world = CountingWorld::default();
        let log = Arc::clone(&world.log);
        let (dispatcher, mut thread) = Dispatcher::spawn(world).unwrap();

        dispatcher.add_task(|game| game.player_logout(PlayerId(1), false));
        thread.shutdown();
        assert_eq!(*log.lock().unwrap(), vec![1]);
        assert!(!dispatcher.add_task(|_| {}));
        assert!(!dispatcher.barrier());
    }
}
