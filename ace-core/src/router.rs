//! Request id allocation and the pending-request map.
//!
//! The router owns two small pieces of state shared by the writer (which
//! inserts) and the reader (which removes) in the transport's reactor tasks.
//! Because both sides run on the same single-threaded executor this needs no
//! cross-thread locking — see the concurrency notes in the crate root.

use std::collections::HashMap;

use tracing::warn;

use crate::protocol::Response;

/// What to do with a response once it arrives.
pub enum Continuation {
    /// Overwrite the device state cache (the writer's default `get_status` poll).
    StatusPoll(tokio::sync::oneshot::Sender<Response>),
    /// Hand the raw response back to whichever command is awaiting it.
    Command(tokio::sync::oneshot::Sender<Response>),
}

impl Continuation {
    fn into_sender(self) -> tokio::sync::oneshot::Sender<Response> {
        match self {
            Continuation::StatusPoll(tx) => tx,
            Continuation::Command(tx) => tx,
        }
    }
}

/// Allocates monotonic request ids and tracks which continuation owns each
/// outstanding id.
#[derive(Default)]
pub struct Router {
    next_id: u32,
    pending: HashMap<u32, Continuation>,
}

impl Router {
    pub fn new() -> Self {
        Router {
            next_id: 0,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next request id. Ids are never reused.
    pub fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Register a continuation for `id`. Overwrites silently if `id` is
    /// already pending — callers are expected to allocate fresh ids via
    /// [`Router::next_id`].
    pub fn register(&mut self, id: u32, continuation: Continuation) {
        self.pending.insert(id, continuation);
    }

    /// How many requests are currently awaiting a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Resolve `response` against the pending map, firing exactly one
    /// continuation if its id is known. Unknown ids (arriving after a forced
    /// timeout clear, for instance) are logged and dropped.
    pub fn resolve(&mut self, response: Response) {
        match self.pending.remove(&response.id) {
            Some(continuation) => {
                let _ = continuation.into_sender().send(response);
            }
            None => {
                warn!(id = response.id, "response for unknown or expired request id");
            }
        }
    }

    /// Drop every pending continuation without resolving it, used when the
    /// transport tears down after a timeout or I/O fault.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
