//! Process-wide state shared by every stage of one pipeline instance.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Flags and identity shared by reference across all stages of one pipeline.
///
/// `stop` is one-way (false→true only). `should_listen` implements
/// half-duplex turn-taking: the segmenter reads it, the synthesis path
/// writes it. Neither needs more than atomic visibility; races at the exact
/// flip instant are dwarfed by physical playback latency.
#[derive(Debug)]
pub struct Coordination {
    stop: AtomicBool,
    should_listen: AtomicBool,
    session_id: Mutex<String>,
}

impl Coordination {
    /// Fresh coordination state: not stopped, listening, no session yet.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stop: AtomicBool::new(false),
            should_listen: AtomicBool::new(true),
            session_id: Mutex::new(String::new()),
        })
    }

    /// Request shutdown of every worker. Irreversible.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Whether shutdown has been requested.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// Open or close the capture gate.
    pub fn set_listening(&self, listening: bool) {
        self.should_listen.store(listening, Ordering::Relaxed);
    }

    /// Whether the segmenter should consume incoming audio.
    pub fn is_listening(&self) -> bool {
        self.should_listen.load(Ordering::Relaxed)
    }

    /// Record the session identifier, set once per connection.
    pub fn set_session_id(&self, id: impl Into<String>) {
        if let Ok(mut slot) = self.session_id.lock() {
            *slot = id.into();
        }
    }

    /// The current session identifier (empty before a connection is bound).
    pub fn session_id(&self) -> String {
        self.session_id
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_default()
    }
}
