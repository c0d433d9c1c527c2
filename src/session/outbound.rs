use std::{collections::VecDeque, sync::Arc};

use tracing::{error, trace};

use crate::{common::types::SessionId, transport::Transport};

/// The bound transport plus the replay buffer used while paused.
///
/// The buffer has no size cap. Its only bound is the resume timeout: a
/// session that never resumes is torn down and the buffer goes with it.
pub(crate) struct Outbound {
    transport: Option<Arc<dyn Transport>>,
    queue: VecDeque<String>,
}

impl Outbound {
    pub fn new(transport: Option<Arc<dyn Transport>>) -> Self {
        Self {
            transport,
            queue: VecDeque::new(),
        }
    }

    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }

    pub fn is_bound_to(&self, transport: &Arc<dyn Transport>) -> bool {
        self.transport
            .as_ref()
            .is_some_and(|t| std::ptr::addr_eq(Arc::as_ptr(t), Arc::as_ptr(transport)))
    }

    pub fn enqueue(&mut self, payload: String) {
        self.queue.push_back(payload);
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Hands `payload` to the live transport, or drops it when none is
    /// bound. Write failures are logged and forgotten.
    pub fn send(&self, session_id: &SessionId, payload: String) {
        let Some(transport) = self.transport.as_ref().filter(|t| t.is_open()) else {
            trace!("No live transport, dropping payload: session={}", session_id);
            return;
        };
        trace!("Sending payload: session={} payload={}", session_id, payload);
        if let Err(e) = transport.send(payload) {
            error!("Transport write failed: session={} err={}", session_id, e);
        }
    }

    pub fn detach(&mut self) -> Option<Arc<dyn Transport>> {
        self.transport.take()
    }

    /// Binds `transport` and writes out the buffered payloads in FIFO order.
    /// Returns how many were replayed.
    pub fn attach_and_replay(&mut self, session_id: &SessionId, transport: Arc<dyn Transport>) -> usize {
        self.transport = Some(transport);
        let replayed = self.queue.len();
        while let Some(payload) = self.queue.pop_front() {
            self.send(session_id, payload);
        }
        replayed
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }
}
