//! Page render requests and stale-result rejection
//!
//! Rendering happens on the host and completes asynchronously. Each request
//! gets a ticket; starting a new request supersedes every earlier one, and a
//! completion is applied only if it still matches the current page and scale.

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderTicket {
    pub generation: u64,
    pub page_index: u32,
    pub scale: f64,
}

#[derive(Debug, Default)]
pub struct RenderCoordinator {
    next_generation: u64,
    current: Option<RenderTicket>,
    last_applied: Option<u64>,
}

impl RenderCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a render for `page_index` at `scale`, invalidating earlier requests
    pub fn begin(&mut self, page_index: u32, scale: f64) -> RenderTicket {
        self.next_generation += 1;
        let ticket = RenderTicket {
            generation: self.next_generation,
            page_index,
            scale,
        };
        self.current = Some(ticket);
        ticket
    }

    /// Whether a finished render may be applied. Accepting it records it as applied.
    pub fn complete(&mut self, ticket: &RenderTicket) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let matches_view = ticket.page_index == current.page_index && ticket.scale == current.scale;
        let not_older = self.last_applied.map_or(true, |last| ticket.generation >= last);
        if matches_view && not_older && ticket.generation <= current.generation {
            self.last_applied = Some(ticket.generation);
            true
        } else {
            debug!(
                generation = ticket.generation,
                current = current.generation,
                page_index = ticket.page_index,
                "discarding stale render result"
            );
            false
        }
    }

    pub fn current(&self) -> Option<RenderTicket> {
        self.current
    }

    /// Whether the most recent request has been applied
    pub fn is_settled(&self) -> bool {
        match (self.current, self.last_applied) {
            (Some(current), Some(last)) => last == current.generation,
            (None, _) => true,
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.current = None;
        self.last_applied = None;
    }
}
