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

//! Endpoint attached to the local ports of a router.

use crate::credit::Credit;
use crate::error::Error;
use crate::flit::{Flit, Payload};
use crate::link::{CreditBuffer, CreditLink, FlitBuffer, NetworkLink};
use crate::out_vc_state::OutVcState;
use crate::vc::VcState;
use crate::Cycle;
use std::collections::VecDeque;

/// Injects packets into its router and collects the flits delivered to it.
///
/// Flits of one packet are injected back to back on a single VC, at most
/// one flit per cycle, and only while the router has buffer space for them.
#[derive(Clone, Debug)]
pub struct NetworkInterface {
    id: usize,
    vcs_per_vnet: usize,
    /// View of the router's local input VCs.
    outvc_state: Vec<OutVcState>,
    credit_link: CreditLink,
    inject_queue: VecDeque<Flit>,
    current_vc: Option<usize>,
    out_buffer: FlitBuffer,
    eject_link: NetworkLink,
    credit_queue: CreditBuffer,
    ejected: Vec<(Cycle, Flit)>,
    flits_injected: u64,
}

impl NetworkInterface {
    pub fn new(id: usize, num_vcs: usize, vcs_per_vnet: usize, buffers_per_vc: usize) -> Self {
        Self {
            id,
            vcs_per_vnet,
            outvc_state: (0..num_vcs)
                .map(|vc| OutVcState::new(vc, buffers_per_vc))
                .collect(),
            credit_link: CreditLink::new(id, 1),
            inject_queue: VecDeque::new(),
            current_vc: None,
            out_buffer: FlitBuffer::new(),
            eject_link: NetworkLink::new(id, 1),
            credit_queue: CreditBuffer::new(),
            ejected: vec![],
            flits_injected: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Queues the flits of one packet; they are released from their
    /// timestamp on.
    pub fn enqueue_packet(&mut self, flits: Vec<Flit>) {
        self.inject_queue.extend(flits);
    }

    pub fn pending_flits(&self) -> usize {
        self.inject_queue.len()
    }

    pub fn receive(&mut self, flit: Flit, arrival: Cycle) -> Cycle {
        self.eject_link.deliver(flit, arrival)
    }

    pub fn receive_credit(&mut self, credit: Credit) -> Cycle {
        let arrival = credit.time;
        self.credit_link.deliver(credit, arrival)
    }

    pub fn ejected(&self) -> &[(Cycle, Flit)] {
        &self.ejected
    }

    pub fn flits_injected(&self) -> u64 {
        self.flits_injected
    }

    pub fn drain_out_buffer(&mut self) -> Vec<Flit> {
        let mut flits = vec![];
        while let Some(flit) = self.out_buffer.consume() {
            flits.push(flit);
        }
        flits
    }

    pub fn drain_credits(&mut self) -> Vec<Credit> {
        let mut credits = vec![];
        while let Some(credit) = self.credit_queue.consume() {
            credits.push(credit);
        }
        credits
    }

    fn free_vc(&self, vnet: usize, now: Cycle) -> Option<usize> {
        let base = vnet * self.vcs_per_vnet;
        (base..base + self.vcs_per_vnet).find(|vc| {
            self.outvc_state
                .get(*vc)
                .map_or(false, |s| s.is_in_state(VcState::Idle, now) && s.has_credit())
        })
    }

    /// Returns the next cycle this interface has work for, if any.
    pub fn wakeup(&mut self, now: Cycle) -> Result<Option<Cycle>, Error> {
        if self.credit_link.is_ready(now) {
            if let Some(credit) = self.credit_link.consume() {
                let state = self
                    .outvc_state
                    .get_mut(credit.vc)
                    .ok_or(Error::InvalidVc(credit.vc))?;
                state.increment_credit()?;
                if credit.is_free_signal {
                    state.set_state(VcState::Idle, now);
                }
            }
        }

        if self.eject_link.is_ready(now) {
            if let Some(flit) = self.eject_link.consume() {
                log::trace!("ni {}: ejected {} at {}", self.id, flit, now);
                self.credit_queue.insert(Credit::new(
                    flit.vc(),
                    flit.flit_type().is_tail(),
                    now + 1,
                    flit.key(),
                ));
                self.ejected.push((now, flit));
            }
        }

        self.inject(now)?;

        let next = match self.inject_queue.front() {
            Some(flit) if flit.time() > now => Some(flit.time()),
            Some(_) => Some(now + 1),
            None => None,
        };
        Ok(next)
    }

    fn inject(&mut self, now: Cycle) -> Result<(), Error> {
        let (flit_type, vnet) = match self.inject_queue.front() {
            Some(flit) if flit.time() <= now => (flit.flit_type(), flit.vnet()),
            _ => return Ok(()),
        };
        let vc = if flit_type.is_head() {
            match self.free_vc(vnet, now) {
                Some(vc) => vc,
                None => return Ok(()),
            }
        } else {
            match self.current_vc {
                Some(vc) if self.outvc_state[vc].has_credit() => vc,
                _ => return Ok(()),
            }
        };
        let mut flit = match self.inject_queue.pop_front() {
            Some(flit) => flit,
            None => return Ok(()),
        };
        if flit_type.is_head() {
            self.outvc_state[vc].set_state(VcState::Active, now);
        }
        self.outvc_state[vc].decrement_credit()?;
        self.current_vc = if flit_type.is_tail() { None } else { Some(vc) };
        flit.set_vc(vc);
        flit.set_time(now + 1);
        log::trace!("ni {}: injecting {} at {}", self.id, flit, now);
        self.out_buffer.insert(flit);
        self.flits_injected += 1;
        Ok(())
    }

    pub fn functional_write(&mut self, update: &Payload) -> u32 {
        self.inject_queue
            .iter_mut()
            .chain(self.out_buffer.iter_mut())
            .chain(self.eject_link.iter_mut())
            .map(|flit| flit.functional_write(update) as u32)
            .sum()
    }
}
