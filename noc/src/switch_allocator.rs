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

//! Switch allocation: picks, per output port, the input VC that crosses the
//! crossbar this cycle, and arbitrates bypass reservations against local
//! traffic.

use crate::config::SmartPriority;
use crate::error::Error;
use crate::flit::{FlitStage, FlitType};
use crate::router::Router;
use crate::Cycle;

pub trait SwitchAllocator {
    /// Runs allocation for `router` in cycle `now`. Winners are handed to
    /// the router with `grant_switch`.
    fn wakeup(&mut self, router: &mut Router, now: Cycle) -> Result<(), Error>;
    fn input_arbiter_activity(&self) -> u64;
    fn output_arbiter_activity(&self) -> u64;
    fn reset_stats(&mut self);
}

/// Separable input-first allocator with round-robin arbiters.
#[derive(Clone, Debug)]
pub struct SeparableAllocator {
    priority: SmartPriority,
    round_robin_invc: Vec<usize>,
    round_robin_inport: Vec<usize>,
    input_arbiter_activity: u64,
    output_arbiter_activity: u64,
}

impl SeparableAllocator {
    pub fn new(priority: SmartPriority) -> Self {
        Self {
            priority,
            round_robin_invc: vec![],
            round_robin_inport: vec![],
            input_arbiter_activity: 0,
            output_arbiter_activity: 0,
        }
    }

    /// Outport requested by `vc` if its top flit can be switched now.
    fn is_eligible(router: &Router, inport: usize, vc: usize, now: Cycle) -> Option<usize> {
        let channel = router.input_unit(inport).vc(vc);
        if !channel.need_stage(FlitStage::SwitchAllocation, now) {
            return None;
        }
        let outport = channel.outport()?;
        let flit = channel.peek_top_flit()?;
        let output_unit = router.output_unit(outport);
        if output_unit.was_bypassed(now) || output_unit.is_locked_by_other(flit.packet()) {
            return None;
        }
        let ready = if flit.flit_type().is_head() {
            output_unit.has_free_vc(flit.vnet(), now)
        } else {
            channel
                .outvc()
                .map_or(false, |outvc| output_unit.has_credit(outvc))
        };
        if ready {
            Some(outport)
        } else {
            None
        }
    }

    fn arbitrate_inport(&mut self, router: &Router, inport: usize, now: Cycle) -> Option<(usize, usize)> {
        let num_vcs = router.input_unit(inport).num_vcs();
        let start = self.round_robin_invc[inport];
        for k in 0..num_vcs {
            let vc = (start + k) % num_vcs;
            if let Some(outport) = Self::is_eligible(router, inport, vc, now) {
                self.input_arbiter_activity += 1;
                return Some((vc, outport));
            }
        }
        None
    }

    fn arbitrate_outport(&self, requests: &[Option<(usize, usize)>], outport: usize) -> Option<(usize, usize)> {
        let num_inports = requests.len();
        let start = self.round_robin_inport[outport];
        (0..num_inports)
            .map(|k| (start + k) % num_inports)
            .find_map(|inport| match requests[inport] {
                Some((vc, requested)) if requested == outport => Some((inport, vc)),
                _ => None,
            })
    }

    /// Settles a ready reservation at `outport` against the local winner.
    /// Returns the local winner that may still use the port.
    fn resolve_smart(
        &mut self,
        router: &mut Router,
        outport: usize,
        local: Option<(usize, usize)>,
        now: Cycle,
    ) -> Option<(usize, usize)> {
        if !router.output_unit(outport).is_ready_ssr(now) {
            return local;
        }
        let grant = !router.output_unit(outport).is_locked()
            && match self.priority {
                SmartPriority::Local => local.is_none(),
                SmartPriority::Bypass => true,
            };
        if !grant {
            router.output_unit_mut(outport).clear_ssr_reqs(now);
            return local;
        }
        if let Some(ssr) = router.output_unit_mut(outport).pop_ssr() {
            if let Some(inport) = ssr.inport {
                router.input_unit_mut(inport).grant_ssr(ssr, now);
                self.output_arbiter_activity += 1;
            }
        }
        router.output_unit_mut(outport).clear_ssr_reqs(now);
        None
    }

    fn grant(
        &mut self,
        router: &mut Router,
        inport: usize,
        vc: usize,
        outport: usize,
        now: Cycle,
    ) -> Result<(), Error> {
        let (vnet, flit_type, key) = match router.input_unit(inport).vc(vc).peek_top_flit() {
            Some(flit) => (flit.vnet(), flit.flit_type(), flit.key()),
            None => return Ok(()),
        };
        let outvc = if flit_type.is_head() {
            match router.output_unit_mut(outport).select_free_vc(vnet, now) {
                Some(outvc) => {
                    router.input_unit_mut(inport).vc_mut(vc).grant_outvc(outvc);
                    outvc
                }
                None => return Ok(()),
            }
        } else {
            match router.input_unit(inport).vc(vc).outvc() {
                Some(outvc) => outvc,
                None => return Ok(()),
            }
        };
        router.output_unit_mut(outport).decrement_credit(outvc)?;

        let input_unit = router.input_unit_mut(inport);
        let mut flit = match input_unit.vc_mut(vc).consume_top_flit() {
            Some(flit) => flit,
            None => return Ok(()),
        };
        input_unit.increment_credit(vc, flit_type.is_tail(), now, key);
        if flit_type.is_tail() {
            // Observable as idle from the next cycle on.
            input_unit.set_vc_idle(vc, now + 1);
        }
        let num_vcs = input_unit.num_vcs();

        flit.set_vc(outvc);
        flit.set_outport(outport);
        flit.advance_stage(FlitStage::SwitchTraversal, now);
        log::trace!(
            "router {}: inport {} vc {} wins outport {} vc {} with {}",
            router.id(),
            inport,
            vc,
            outport,
            outvc,
            flit
        );
        router.grant_switch(inport, flit);
        match flit_type {
            FlitType::Head => router.output_unit_mut(outport).lock(key.packet),
            FlitType::Tail => router.output_unit_mut(outport).unlock(),
            _ => {}
        }

        self.output_arbiter_activity += 1;
        self.round_robin_invc[inport] = (vc + 1) % num_vcs;
        self.round_robin_inport[outport] = (inport + 1) % router.num_inports();
        Ok(())
    }

    /// Wakes the router next cycle if a buffered flit becomes switchable then.
    fn check_for_wakeup(router: &mut Router, now: Cycle) {
        let next = now + 1;
        let pending = (0..router.num_inports()).any(|inport| {
            let input_unit = router.input_unit(inport);
            (0..input_unit.num_vcs())
                .any(|vc| input_unit.vc(vc).need_stage(FlitStage::SwitchAllocation, next))
        });
        if pending {
            router.schedule_wakeup(next);
        }
    }
}

impl SwitchAllocator for SeparableAllocator {
    fn wakeup(&mut self, router: &mut Router, now: Cycle) -> Result<(), Error> {
        self.round_robin_invc.resize(router.num_inports(), 0);
        self.round_robin_inport.resize(router.num_outports(), 0);

        let requests: Vec<Option<(usize, usize)>> = (0..router.num_inports())
            .map(|inport| self.arbitrate_inport(router, inport, now))
            .collect();
        for outport in 0..router.num_outports() {
            let local = self.arbitrate_outport(&requests, outport);
            if let Some((inport, vc)) = self.resolve_smart(router, outport, local, now) {
                self.grant(router, inport, vc, outport, now)?;
            }
        }
        Self::check_for_wakeup(router, now);
        Ok(())
    }

    fn input_arbiter_activity(&self) -> u64 {
        self.input_arbiter_activity
    }

    fn output_arbiter_activity(&self) -> u64 {
        self.output_arbiter_activity
    }

    fn reset_stats(&mut self) {
        self.input_arbiter_activity = 0;
        self.output_arbiter_activity = 0;
    }
}
