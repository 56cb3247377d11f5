// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! SMART reservations and the ordered queues holding them.

use crate::flit::{FlitKey, PortDirection, RouteInfo};
use crate::Cycle;
use std::collections::BTreeMap;

/// A single-cycle reservation asking a downstream router to let `flit`
/// skip its input buffers.
///
/// `flit` identifies the flit by identity only; the flit itself stays with
/// whichever buffer or link holds it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Ssr {
    pub vnet: usize,
    /// Routers crossed since the router that originated the reservation.
    pub src_hops: usize,
    pub bypass_req: bool,
    /// Direction the flit wants to leave the receiving router through.
    pub outport_dirn: PortDirection,
    /// Input port at the receiving router, resolved on arrival.
    pub inport: Option<usize>,
    pub flit: FlitKey,
    pub route: RouteInfo,
    /// Cycle from which the reservation is due.
    pub time: Cycle,
}

impl Ssr {
    pub fn new(
        src_hops: usize,
        bypass_req: bool,
        outport_dirn: PortDirection,
        flit: FlitKey,
        route: RouteInfo,
        time: Cycle,
    ) -> Self {
        Self {
            vnet: route.vnet,
            src_hops,
            bypass_req,
            outport_dirn,
            inport: None,
            flit,
            route,
            time,
        }
    }

    pub fn is_due(&self, now: Cycle) -> bool {
        self.time <= now
    }
}

/// Reservations ordered by due cycle, then by fewest source hops, then by
/// arrival order. Used both for requests at an output port and for grants
/// at an input port.
#[derive(Clone, Debug, Default)]
pub struct SsrQueue {
    entries: BTreeMap<(Cycle, usize, u64), Ssr>,
    next_seq: u64,
}

impl SsrQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ssr: Ssr) {
        let key = (ssr.time, ssr.src_hops, self.next_seq);
        self.next_seq += 1;
        self.entries.insert(key, ssr);
    }

    pub fn peek(&self) -> Option<&Ssr> {
        self.entries.values().next()
    }

    pub fn pop(&mut self) -> Option<Ssr> {
        let key = *self.entries.keys().next()?;
        self.entries.remove(&key)
    }

    /// Is the top entry due by `now`?
    pub fn is_ready(&self, now: Cycle) -> bool {
        self.peek().map_or(false, |ssr| ssr.is_due(now))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drops every entry due by `now`; later ones stay queued.
    pub fn clear_ready(&mut self, now: Cycle) -> usize {
        let mut cleared = 0;
        while self.is_ready(now) {
            self.pop();
            cleared += 1;
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ssr(packet: usize, src_hops: usize, time: Cycle) -> Ssr {
        Ssr::new(
            src_hops,
            true,
            PortDirection::East,
            FlitKey { packet, id: 0 },
            RouteInfo::new(0, 0, 3),
            time,
        )
    }

    #[test]
    fn earliest_then_fewest_hops_then_fifo() {
        let mut queue = SsrQueue::new();
        queue.push(ssr(1, 3, 11));
        queue.push(ssr(2, 2, 10));
        queue.push(ssr(3, 1, 10));
        queue.push(ssr(4, 1, 10));
        let order: Vec<usize> = std::iter::from_fn(|| queue.pop())
            .map(|s| s.flit.packet)
            .collect();
        assert_eq!(order, vec![3, 4, 2, 1]);
    }

    #[test]
    fn ready_once_due() {
        let mut queue = SsrQueue::new();
        assert!(!queue.is_ready(100));
        queue.push(ssr(1, 1, 5));
        assert!(!queue.is_ready(4));
        assert!(queue.is_ready(5));
        assert!(queue.is_ready(6));
        queue.push(ssr(2, 1, 9));
        assert_eq!(queue.clear_ready(6), 1);
        assert_eq!(queue.len(), 1);
        queue.clear();
        assert!(queue.is_empty());
    }
}
