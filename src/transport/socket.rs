use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::ws::{CloseFrame, Message};

use crate::{common::errors::TransportError, transport::Transport};

/// Transport backed by the writer half of an axum websocket. Payloads go
/// through an unbounded flume channel drained by the socket task.
pub struct WebSocketTransport {
    tx: flume::Sender<Message>,
    open: AtomicBool,
}

impl WebSocketTransport {
    pub fn new(tx: flume::Sender<Message>) -> Self {
        Self {
            tx,
            open: AtomicBool::new(true),
        }
    }

    /// Called by the socket task once the peer is gone.
    pub fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }
}

impl Transport for WebSocketTransport {
    fn send(&self, payload: String) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::Closed);
        }
        self.tx
            .send(Message::Text(payload.into()))
            .map_err(|_| TransportError::Closed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_disconnected()
    }

    fn close(&self, code: u16, reason: Option<String>) {
        if !self.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let frame = CloseFrame {
            code,
            reason: reason.unwrap_or_default().into(),
        };
        let _ = self.tx.send(Message::Close(Some(frame)));
    }
}
