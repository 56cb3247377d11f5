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

//! Egress side of a router port.

use crate::credit::Credit;
use crate::error::Error;
use crate::flit::{Flit, FlitStage, PacketId, Payload, PortDirection};
use crate::link::{CreditLink, FlitBuffer};
use crate::out_vc_state::OutVcState;
use crate::ssr::{Ssr, SsrQueue};
use crate::vc::VcState;
use crate::Cycle;

/// Tracks the downstream virtual channels reachable through one output port,
/// queues bypass requests that want to leave through it, and stages flits for
/// the outbound link.
#[derive(Clone, Debug)]
pub struct OutputUnit {
    id: usize,
    router: usize,
    direction: PortDirection,
    vcs_per_vnet: usize,
    outvc_state: Vec<OutVcState>,
    out_buffer: FlitBuffer,
    credit_link: CreditLink,
    ssr_reqs: SsrQueue,
    link_latency: Cycle,
    bypassed_at: Option<Cycle>,
    /// Multi-flit packet currently streaming through this port.
    locked_packet: Option<PacketId>,
}

impl OutputUnit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        router: usize,
        direction: PortDirection,
        num_vcs: usize,
        vcs_per_vnet: usize,
        buffers_per_vc: usize,
        link_latency: Cycle,
        credit_link: CreditLink,
    ) -> Self {
        Self {
            id,
            router,
            direction,
            vcs_per_vnet,
            outvc_state: (0..num_vcs)
                .map(|vc| OutVcState::new(vc, buffers_per_vc))
                .collect(),
            out_buffer: FlitBuffer::new(),
            credit_link,
            ssr_reqs: SsrQueue::new(),
            link_latency,
            bypassed_at: None,
            locked_packet: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn link_latency(&self) -> Cycle {
        self.link_latency
    }

    pub fn outvc_state(&self, vc: usize) -> &OutVcState {
        &self.outvc_state[vc]
    }

    pub fn num_vcs(&self) -> usize {
        self.outvc_state.len()
    }

    /// Processes the credit the downstream router returned for this cycle.
    pub fn wakeup(&mut self, now: Cycle) -> Result<(), Error> {
        if !self.credit_link.is_ready(now) {
            return Ok(());
        }
        if let Some(credit) = self.credit_link.consume() {
            let state = self
                .outvc_state
                .get_mut(credit.vc)
                .ok_or(Error::InvalidVc(credit.vc))?;
            state.increment_credit()?;
            if credit.is_free_signal {
                state.set_state(VcState::Idle, now);
            }
            log::trace!(
                "router {} outport {}: credit vc {} -> {}",
                self.router,
                self.id,
                credit.vc,
                state.credit_count()
            );
        }
        Ok(())
    }

    /// Queues a returning credit; returns when it will be processed.
    pub fn receive_credit(&mut self, credit: Credit) -> Cycle {
        let arrival = credit.time;
        self.credit_link.deliver(credit, arrival)
    }

    pub fn has_pending_credits(&self) -> bool {
        !self.credit_link.is_empty()
    }

    pub fn has_credit(&self, outvc: usize) -> bool {
        self.outvc_state
            .get(outvc)
            .map_or(false, |state| state.has_credit())
    }

    fn vnet_range(&self, vnet: usize) -> std::ops::Range<usize> {
        let base = vnet * self.vcs_per_vnet;
        base..(base + self.vcs_per_vnet).min(self.outvc_state.len())
    }

    fn is_free(&self, vc: usize, now: Cycle) -> bool {
        let state = &self.outvc_state[vc];
        state.is_in_state(VcState::Idle, now) && state.has_credit()
    }

    pub fn has_free_vc(&self, vnet: usize, now: Cycle) -> bool {
        self.vnet_range(vnet).any(|vc| self.is_free(vc, now))
    }

    /// Claims the lowest free VC of `vnet`.
    pub fn select_free_vc(&mut self, vnet: usize, now: Cycle) -> Option<usize> {
        let vc = self.vnet_range(vnet).find(|vc| self.is_free(*vc, now))?;
        self.outvc_state[vc].set_state(VcState::Active, now);
        Some(vc)
    }

    pub fn decrement_credit(&mut self, outvc: usize) -> Result<(), Error> {
        self.outvc_state
            .get_mut(outvc)
            .ok_or(Error::InvalidVc(outvc))?
            .decrement_credit()
    }

    pub fn increment_credit(&mut self, outvc: usize) -> Result<(), Error> {
        self.outvc_state
            .get_mut(outvc)
            .ok_or(Error::InvalidVc(outvc))?
            .increment_credit()
    }

    /// Stages a flit that won the switch; it departs next cycle.
    pub fn insert_flit(&mut self, mut flit: Flit, now: Cycle) {
        flit.advance_stage(FlitStage::LinkTraversal, now + 1);
        flit.set_time(now + 1);
        log::trace!("router {} outport {}: sending {}", self.router, self.id, flit);
        self.out_buffer.insert(flit);
    }

    /// Stages a flit that bypassed this router's buffers. The port is then
    /// unavailable to switch allocation for the rest of the cycle.
    pub fn smart_bypass(&mut self, flit: Flit, now: Cycle) {
        self.bypassed_at = Some(now);
        self.insert_flit(flit, now);
    }

    pub fn was_bypassed(&self, now: Cycle) -> bool {
        self.bypassed_at == Some(now)
    }

    pub fn drain_out_buffer(&mut self) -> Vec<Flit> {
        let mut flits = vec![];
        while let Some(flit) = self.out_buffer.consume() {
            flits.push(flit);
        }
        flits
    }

    pub fn lock(&mut self, packet: PacketId) {
        self.locked_packet = Some(packet);
    }

    pub fn unlock(&mut self) {
        self.locked_packet = None;
    }

    pub fn is_locked(&self) -> bool {
        self.locked_packet.is_some()
    }

    pub fn is_locked_by_other(&self, packet: PacketId) -> bool {
        self.locked_packet.map_or(false, |locked| locked != packet)
    }

    pub fn insert_ssr(&mut self, ssr: Ssr) {
        log::debug!(
            "router {} outport {}: bypass request for {} due {} ({} hops)",
            self.router,
            self.id,
            ssr.flit,
            ssr.time,
            ssr.src_hops
        );
        self.ssr_reqs.push(ssr);
    }

    pub fn is_ready_ssr(&self, now: Cycle) -> bool {
        self.ssr_reqs.is_ready(now)
    }

    pub fn top_ssr(&self) -> Option<&Ssr> {
        self.ssr_reqs.peek()
    }

    pub fn pop_ssr(&mut self) -> Option<Ssr> {
        self.ssr_reqs.pop()
    }

    /// Drops the requests that lost arbitration this cycle.
    pub fn clear_ssr_reqs(&mut self, now: Cycle) {
        let dropped = self.ssr_reqs.clear_ready(now);
        if dropped > 0 {
            log::debug!(
                "router {} outport {}: dropped {} bypass requests",
                self.router,
                self.id,
                dropped
            );
        }
    }

    pub fn pending_ssrs(&self) -> usize {
        self.ssr_reqs.len()
    }

    pub fn functional_write(&mut self, update: &Payload) -> u32 {
        self.out_buffer
            .iter_mut()
            .map(|flit| flit.functional_write(update) as u32)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flit::{FlitKey, FlitType, RouteInfo};

    fn unit() -> OutputUnit {
        // 2 vnets x 2 vcs, 2 buffers each.
        OutputUnit::new(1, 0, PortDirection::East, 4, 2, 2, 1, CreditLink::new(0, 1))
    }

    #[test]
    fn selects_lowest_free_vc_of_vnet() {
        let mut unit = unit();
        assert!(unit.has_free_vc(1, 0));
        assert_eq!(unit.select_free_vc(1, 0), Some(2));
        assert_eq!(unit.select_free_vc(1, 0), Some(3));
        assert!(!unit.has_free_vc(1, 0));
        assert_eq!(unit.select_free_vc(1, 0), None);
        assert_eq!(unit.select_free_vc(0, 0), Some(0));
    }

    #[test]
    fn free_signal_releases_vc() {
        let mut unit = unit();
        let vc = unit.select_free_vc(0, 3).unwrap();
        unit.decrement_credit(vc).unwrap();
        unit.decrement_credit(vc).unwrap();
        assert!(!unit.has_credit(vc));
        let key = FlitKey { packet: 9, id: 1 };
        unit.receive_credit(Credit::new(vc, false, 5, key));
        unit.receive_credit(Credit::new(vc, true, 5, key));
        unit.wakeup(4).unwrap();
        assert!(!unit.has_credit(vc));
        unit.wakeup(5).unwrap();
        assert_eq!(unit.outvc_state(vc).credit_count(), 1);
        assert!(unit.outvc_state(vc).is_in_state(VcState::Active, 5));
        // The second credit was serialized to the next cycle.
        unit.wakeup(6).unwrap();
        assert_eq!(unit.outvc_state(vc).credit_count(), 2);
        assert!(unit.outvc_state(vc).is_in_state(VcState::Idle, 6));
    }

    #[test]
    fn credit_overflow_is_fatal() {
        let mut unit = unit();
        unit.receive_credit(Credit::new(0, false, 1, FlitKey { packet: 0, id: 0 }));
        assert_eq!(unit.wakeup(1), Err(Error::CreditOverflow { vc: 0 }));
    }

    #[test]
    fn bypass_blocks_port_for_the_cycle() {
        let mut unit = unit();
        let flit = Flit::new(1, 0, FlitType::HeadTail, 0, RouteInfo::new(0, 0, 1), None, 0);
        unit.smart_bypass(flit, 7);
        assert!(unit.was_bypassed(7));
        assert!(!unit.was_bypassed(8));
        let sent = unit.drain_out_buffer();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].time(), 8);
        assert!(sent[0].is_stage(FlitStage::LinkTraversal, 8));
    }

    #[test]
    fn packet_lock() {
        let mut unit = unit();
        assert!(!unit.is_locked_by_other(3));
        unit.lock(3);
        assert!(!unit.is_locked_by_other(3));
        assert!(unit.is_locked_by_other(4));
        unit.unlock();
        assert!(!unit.is_locked());
    }
}
