//! Headless conversation core for the campus community hub.
//!
//! The core runs as a single-threaded actor owning all app state. Hosts hold
//! an [`App`] handle: `dispatch` sends actions in without blocking, `state`
//! reads the latest snapshot, and `listen_for_updates` streams diffs with
//! strictly increasing revision numbers so a renderer can detect gaps and
//! resync from the snapshot.

mod actions;
mod core;
mod logging;
mod state;
mod timeline;
mod updates;

pub mod backend;
pub mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;

use flume::{Receiver, Sender};

use crate::backend::Backend;

pub use actions::AppAction;
pub use state::*;
pub use updates::*;

/// Host-side callback receiving each state diff, in order, on a dedicated
/// thread.
pub trait Reconciler: Send + Sync + 'static {
    fn reconcile(&self, update: AppUpdate);
}

pub struct App {
    core_tx: Sender<CoreMsg>,
    update_rx: Receiver<AppUpdate>,
    listening: AtomicBool,
    shared_state: Arc<RwLock<AppState>>,
}

impl App {
    pub fn new(data_dir: &str, backend: Backend) -> Arc<Self> {
        logging::init_logging(data_dir);
        tracing::info!(data_dir = %data_dir, "App::new() starting");

        let (update_tx, update_rx) = flume::unbounded();
        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(AppState::empty()));

        // Actor loop thread (single threaded "app actor").
        let core_tx_for_core = core_tx.clone();
        let shared_for_core = shared_state.clone();
        let data_dir = data_dir.to_string();
        thread::spawn(move || {
            let mut core = crate::core::AppCore::new(
                update_tx,
                core_tx_for_core,
                data_dir,
                shared_for_core,
                backend,
            );
            while let Ok(msg) = core_rx.recv() {
                core.handle_message(msg);
            }
        });

        Arc::new(Self {
            core_tx,
            update_rx,
            listening: AtomicBool::new(false),
            shared_state,
        })
    }

    pub fn state(&self) -> AppState {
        match self.shared_state.read() {
            Ok(g) => g.clone(),
            Err(poison) => poison.into_inner().clone(),
        }
    }

    pub fn dispatch(&self, action: AppAction) {
        // Contract: never block caller.
        let _ = self.core_tx.send(CoreMsg::Action(action));
    }

    pub fn listen_for_updates(&self, reconciler: Box<dyn Reconciler>) {
        if self
            .listening
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            // Avoid multiple listeners that would split messages.
            return;
        }

        let rx = self.update_rx.clone();
        thread::spawn(move || {
            while let Ok(update) = rx.recv() {
                reconciler.reconcile(update);
            }
        });
    }
}
