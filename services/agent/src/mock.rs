use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::{AgentError, AgentStartStopper};

/// Agent stand-in that records lifecycle calls.
#[derive(Debug, Default)]
pub struct MockAgent {
    running: AtomicBool,
    starts: AtomicUsize,
    stops: AtomicUsize,
    fail_start: AtomicBool,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start` calls fail until cleared.
    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Successful `start` calls so far.
    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// `stop` calls so far, including no-op ones.
    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentStartStopper for MockAgent {
    async fn start(&self) -> Result<(), AgentError> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(AgentError::io(
                "starting mock agent",
                std::io::Error::other("start failure injected"),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyRunning);
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.running.store(false, Ordering::SeqCst);
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
