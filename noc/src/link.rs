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

//! Time-stamped FIFOs and the point-to-point links built from them.

use crate::credit::Credit;
use crate::flit::Flit;
use crate::Cycle;
use std::collections::VecDeque;

/// Anything carrying the cycle at which its receiver may observe it.
pub trait Timed {
    fn time(&self) -> Cycle;
    fn set_time(&mut self, time: Cycle);
}

impl Timed for Flit {
    fn time(&self) -> Cycle {
        Flit::time(self)
    }

    fn set_time(&mut self, time: Cycle) {
        Flit::set_time(self, time)
    }
}

/// FIFO whose head is only visible once its timestamp has been reached.
#[derive(Clone, Debug)]
pub struct TimedBuffer<T> {
    queue: VecDeque<T>,
}

impl<T> Default for TimedBuffer<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }
}

impl<T: Timed> TimedBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, item: T) {
        self.queue.push_back(item);
    }

    pub fn is_ready(&self, now: Cycle) -> bool {
        self.queue.front().map_or(false, |item| item.time() <= now)
    }

    pub fn peek(&self) -> Option<&T> {
        self.queue.front()
    }

    pub fn peek_mut(&mut self) -> Option<&mut T> {
        self.queue.front_mut()
    }

    pub fn consume(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Removes every item visible by `now`, in order.
    pub fn drain_ready(&mut self, now: Cycle) -> Vec<T> {
        let mut ready = vec![];
        while self.is_ready(now) {
            if let Some(item) = self.queue.pop_front() {
                ready.push(item);
            }
        }
        ready
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.queue.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.queue.iter_mut()
    }
}

pub type FlitBuffer = TimedBuffer<Flit>;
pub type CreditBuffer = TimedBuffer<Credit>;

/// Receiving end of a physical link.
///
/// Items arrive in order and at most one becomes visible per cycle.
#[derive(Clone, Debug)]
pub struct Link<T> {
    id: usize,
    latency: Cycle,
    queue: TimedBuffer<T>,
    last_arrival: Option<Cycle>,
}

impl<T: Timed> Link<T> {
    pub fn new(id: usize, latency: Cycle) -> Self {
        Self {
            id,
            latency,
            queue: TimedBuffer::new(),
            last_arrival: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn latency(&self) -> Cycle {
        self.latency
    }

    /// Queues `item` to arrive no earlier than `arrival`; returns the
    /// cycle at which it will actually be visible.
    pub fn deliver(&mut self, mut item: T, arrival: Cycle) -> Cycle {
        let arrival = match self.last_arrival {
            Some(last) if last >= arrival => last + 1,
            _ => arrival,
        };
        item.set_time(arrival);
        self.queue.insert(item);
        self.last_arrival = Some(arrival);
        arrival
    }

    pub fn is_ready(&self, now: Cycle) -> bool {
        self.queue.is_ready(now)
    }

    pub fn peek(&self) -> Option<&T> {
        self.queue.peek()
    }

    pub fn consume(&mut self) -> Option<T> {
        self.queue.consume()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.queue.iter_mut()
    }
}

pub type NetworkLink = Link<Flit>;
pub type CreditLink = Link<Credit>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flit::FlitKey;

    fn credit(vc: usize) -> Credit {
        Credit::new(vc, false, 0, FlitKey { packet: 0, id: 0 })
    }

    #[test]
    fn head_visible_from_its_timestamp() {
        let mut buffer = CreditBuffer::new();
        assert!(!buffer.is_ready(0));
        let mut c = credit(1);
        c.time = 5;
        buffer.insert(c);
        assert!(!buffer.is_ready(4));
        assert!(buffer.is_ready(5));
        assert_eq!(buffer.drain_ready(5).len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn link_serializes_arrivals() {
        let mut link = CreditLink::new(0, 1);
        assert_eq!(link.deliver(credit(0), 4), 4);
        assert_eq!(link.deliver(credit(1), 4), 5);
        assert_eq!(link.deliver(credit(2), 9), 9);
        assert!(link.is_ready(4));
        assert_eq!(link.consume().map(|c| c.vc), Some(0));
        assert!(!link.is_ready(4));
        assert!(link.is_ready(5));
    }
}
