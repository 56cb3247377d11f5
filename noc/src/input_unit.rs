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

//! Ingress side of a router port.
//!
//! An input unit pulls at most one flit per cycle off its link, runs the
//! virtual channel state machine, rebuilds packets in order and returns
//! credits upstream. It also holds the bypass grants its router handed out.

use crate::credit::Credit;
use crate::error::Error;
use crate::flit::{Flit, FlitKey, FlitStage, PacketId, Payload, PortDirection};
use crate::link::{CreditBuffer, NetworkLink};
use crate::routing::RoutingUnit;
use crate::ssr::{Ssr, SsrQueue};
use crate::vc::{VcState, VirtualChannel};
use crate::Cycle;

/// What one ingress wakeup did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IngressOutcome {
    /// No flit was presented.
    Idle,
    /// A flit was presented but left on the link; it shows up again next cycle.
    Stalled,
    /// The flit was buffered. `wakeup` is set when it only becomes eligible
    /// for switch allocation in a later cycle.
    Buffered { wakeup: Option<Cycle> },
}

/// Result of matching a presented flit against the pending bypass grants.
#[derive(Debug, PartialEq)]
pub enum SmartGrant {
    None,
    /// The due grant belonged to another flit.
    Lost,
    Won(Ssr),
}

#[derive(Clone, Debug)]
pub struct InputUnit {
    id: usize,
    router: usize,
    direction: PortDirection,
    vcs: Vec<VirtualChannel>,
    in_link: NetworkLink,
    credit_queue: CreditBuffer,
    /// Packet whose head was accepted and whose tail was not.
    current_packet: Option<PacketId>,
    last_flit: Option<FlitKey>,
    ssr_grants: SsrQueue,
    buffer_reads: Vec<u64>,
    buffer_writes: Vec<u64>,
    stalls: u64,
}

impl InputUnit {
    pub fn new(
        id: usize,
        router: usize,
        direction: PortDirection,
        num_vcs: usize,
        virtual_networks: usize,
        in_link: NetworkLink,
    ) -> Self {
        Self {
            id,
            router,
            direction,
            vcs: (0..num_vcs).map(VirtualChannel::new).collect(),
            in_link,
            credit_queue: CreditBuffer::new(),
            current_packet: None,
            last_flit: None,
            ssr_grants: SsrQueue::new(),
            buffer_reads: vec![0; virtual_networks],
            buffer_writes: vec![0; virtual_networks],
            stalls: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn num_vcs(&self) -> usize {
        self.vcs.len()
    }

    pub fn vc(&self, vc: usize) -> &VirtualChannel {
        &self.vcs[vc]
    }

    pub fn vc_mut(&mut self, vc: usize) -> &mut VirtualChannel {
        &mut self.vcs[vc]
    }

    pub fn current_packet(&self) -> Option<PacketId> {
        self.current_packet
    }

    /// Queues an arriving flit on the inbound link; returns when it is visible.
    pub fn receive(&mut self, flit: Flit, arrival: Cycle) -> Cycle {
        self.in_link.deliver(flit, arrival)
    }

    /// The flit the link presents this cycle, if any.
    pub fn peek_link(&self, now: Cycle) -> Option<&Flit> {
        if self.in_link.is_ready(now) {
            self.in_link.peek()
        } else {
            None
        }
    }

    pub fn consume_link(&mut self) -> Option<Flit> {
        self.in_link.consume()
    }

    pub fn has_pending_link_flits(&self) -> bool {
        !self.in_link.is_empty()
    }

    fn stall(&mut self, flit: &Flit, why: &str) -> IngressOutcome {
        self.stalls += 1;
        log::debug!(
            "router {} inport {}: stall {} ({})",
            self.router,
            self.id,
            flit,
            why
        );
        IngressOutcome::Stalled
    }

    pub fn wakeup(
        &mut self,
        now: Cycle,
        pipe_stages: Cycle,
        routing_unit: &dyn RoutingUnit,
    ) -> Result<IngressOutcome, Error> {
        let presented = match self.peek_link(now) {
            Some(flit) => flit.clone(),
            None => return Ok(IngressOutcome::Idle),
        };
        let vc = presented.vc();
        if vc >= self.vcs.len() {
            return Err(Error::InvalidVc(vc));
        }
        let flit_type = presented.flit_type();

        let mut flit = if flit_type.is_head() {
            if !self.vcs[vc].is_in_state(VcState::Idle, now) {
                return Err(Error::HeadOnBusyVc {
                    router: self.router,
                    inport: self.id,
                    vc,
                });
            }
            if let Some(packet) = self.current_packet {
                if packet != presented.packet() {
                    return Ok(self.stall(&presented, "packet in flight"));
                }
            }
            let mut flit = match self.in_link.consume() {
                Some(flit) => flit,
                None => return Ok(IngressOutcome::Idle),
            };
            self.vcs[vc].set_active(now);
            let outport = routing_unit.outport_compute(flit.route_mut(), self.id, self.direction)?;
            self.vcs[vc].grant_outport(outport);
            flit.set_outport(outport);
            self.current_packet = if flit_type.is_tail() {
                None
            } else {
                Some(flit.packet())
            };
            self.last_flit = Some(flit.key());
            flit
        } else {
            let last = match (self.current_packet, self.last_flit) {
                (Some(packet), Some(last)) if packet == presented.packet() => last,
                _ => {
                    return Err(Error::OrphanFlit {
                        router: self.router,
                        inport: self.id,
                        packet: presented.packet(),
                        flit: presented.id(),
                    })
                }
            };
            if presented.id() != last.id && presented.id() != last.id + 1 {
                return Ok(self.stall(&presented, "out of order"));
            }
            if !self.vcs[vc].is_in_state(VcState::Active, now) {
                return Err(Error::InactiveVc {
                    router: self.router,
                    inport: self.id,
                    vc,
                });
            }
            let mut flit = match self.in_link.consume() {
                Some(flit) => flit,
                None => return Ok(IngressOutcome::Idle),
            };
            self.last_flit = Some(flit.key());
            if flit_type.is_tail() {
                self.current_packet = None;
            }
            if let Some(outport) = self.vcs[vc].outport() {
                flit.set_outport(outport);
            }
            flit
        };

        let vnet = flit.vnet();
        let eligible = now + pipe_stages - 1;
        flit.advance_stage(FlitStage::SwitchAllocation, eligible);
        log::trace!(
            "router {} inport {}: buffered {} at {}",
            self.router,
            self.id,
            flit,
            now
        );
        self.vcs[vc].insert_flit(flit);
        self.buffer_writes[vnet] += 1;
        self.buffer_reads[vnet] += 1;

        Ok(IngressOutcome::Buffered {
            wakeup: if pipe_stages > 1 { Some(eligible) } else { None },
        })
    }

    /// Returns one slot of `vc` upstream, visible there next cycle.
    pub fn increment_credit(&mut self, vc: usize, free_signal: bool, now: Cycle, flit: FlitKey) {
        log::trace!(
            "router {} inport {}: credit vc {} free {} for {}",
            self.router,
            self.id,
            vc,
            free_signal,
            flit
        );
        self.credit_queue
            .insert(Credit::new(vc, free_signal, now + 1, flit));
    }

    pub fn drain_credits(&mut self) -> Vec<Credit> {
        let mut credits = vec![];
        while let Some(credit) = self.credit_queue.consume() {
            credits.push(credit);
        }
        credits
    }

    pub fn pending_credits(&self) -> usize {
        self.credit_queue.len()
    }

    pub fn set_vc_idle(&mut self, vc: usize, now: Cycle) {
        self.vcs[vc].set_idle(now);
    }

    pub fn is_vc_idle(&self, vc: usize, now: Cycle) -> bool {
        self.vcs[vc].is_in_state(VcState::Idle, now)
    }

    /// Accepts a grant for the next cycle.
    pub fn grant_ssr(&mut self, mut ssr: Ssr, now: Cycle) {
        ssr.time = now + 1;
        log::debug!(
            "router {} inport {}: granted bypass for {} at {}",
            self.router,
            self.id,
            ssr.flit,
            ssr.time
        );
        self.ssr_grants.push(ssr);
    }

    /// Pops the due grants and checks whether `flit` holds the winning one.
    ///
    /// Grants left over from earlier cycles are discarded. A grant due this
    /// cycle for another flit is consumed and reported as lost.
    pub fn take_smart_grant(&mut self, flit: FlitKey, now: Cycle) -> SmartGrant {
        while self.ssr_grants.is_ready(now) {
            let ssr = match self.ssr_grants.pop() {
                Some(ssr) => ssr,
                None => break,
            };
            if ssr.flit == flit {
                return SmartGrant::Won(ssr);
            }
            if ssr.time == now {
                log::debug!(
                    "router {} inport {}: {} lost bypass to {}",
                    self.router,
                    self.id,
                    flit,
                    ssr.flit
                );
                return SmartGrant::Lost;
            }
            log::debug!(
                "router {} inport {}: discarding stale grant for {}",
                self.router,
                self.id,
                ssr.flit
            );
        }
        SmartGrant::None
    }

    pub fn pending_grants(&self) -> usize {
        self.ssr_grants.len()
    }

    pub fn buffer_reads(&self) -> &[u64] {
        &self.buffer_reads
    }

    pub fn buffer_writes(&self) -> &[u64] {
        &self.buffer_writes
    }

    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    pub fn reset_stats(&mut self) {
        self.buffer_reads.iter_mut().for_each(|c| *c = 0);
        self.buffer_writes.iter_mut().for_each(|c| *c = 0);
        self.stalls = 0;
    }

    pub fn functional_write(&mut self, update: &Payload) -> u32 {
        let buffered: u32 = self
            .vcs
            .iter_mut()
            .map(|vc| vc.functional_write(update))
            .sum();
        let in_flight: u32 = self
            .in_link
            .iter_mut()
            .map(|flit| flit.functional_write(update) as u32)
            .sum();
        buffered + in_flight
    }
}
