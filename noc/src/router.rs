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

//! A single router: its ports, the per-cycle pipeline, and the SMART
//! bypass handshake.

use crate::config::{RouterConfiguration, SmartConfiguration};
use crate::crossbar::CrossbarSwitch;
use crate::error::Error;
use crate::flit::{Flit, FlitKey, FlitType, NetDest, Payload, PortDirection, RouteInfo};
use crate::input_unit::{IngressOutcome, InputUnit, SmartGrant};
use crate::link::{CreditLink, NetworkLink};
use crate::output_unit::OutputUnit;
use crate::routing::RoutingUnit;
use crate::ssr::Ssr;
use crate::stats::RouterStats;
use crate::switch_allocator::SwitchAllocator;
use crate::vcd::{VcdComponent, VcdWriter};
use crate::Cycle;
use std::cell::RefCell;
use std::rc::Rc;

pub struct Router {
    id: usize,
    pipe_stages: Cycle,
    virtual_networks: usize,
    vcs_per_vnet: usize,
    buffers_per_vc: usize,
    smart: SmartConfiguration,
    input_units: Vec<InputUnit>,
    output_units: Vec<OutputUnit>,
    routing_unit: Box<dyn RoutingUnit>,
    // Taken out while it runs, since it needs the router itself.
    switch_allocator: Option<Box<dyn SwitchAllocator>>,
    crossbar: CrossbarSwitch,
    /// Last flit admitted by bypass, with the output VC its packet holds.
    last_flit: Option<(FlitKey, usize)>,
    pending_wakeups: Vec<Cycle>,
    ssr_outbox: Vec<(usize, Ssr)>,
    smart_bypasses: u64,
}

impl Router {
    pub fn new(
        id: usize,
        config: &RouterConfiguration,
        smart: &SmartConfiguration,
        routing_unit: Box<dyn RoutingUnit>,
        switch_allocator: Box<dyn SwitchAllocator>,
    ) -> Self {
        Self {
            id,
            pipe_stages: config.latency,
            virtual_networks: config.virtual_networks,
            vcs_per_vnet: config.vcs_per_vnet,
            buffers_per_vc: config.buffers_per_vc,
            smart: smart.clone(),
            input_units: vec![],
            output_units: vec![],
            routing_unit,
            switch_allocator: Some(switch_allocator),
            crossbar: CrossbarSwitch::new(),
            last_flit: None,
            pending_wakeups: vec![],
            ssr_outbox: vec![],
            smart_bypasses: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pipe_stages(&self) -> Cycle {
        self.pipe_stages
    }

    pub fn smart(&self) -> &SmartConfiguration {
        &self.smart
    }

    pub fn add_in_port(&mut self, dirn: PortDirection, in_link: NetworkLink) -> usize {
        let inport = self.input_units.len();
        self.input_units.push(InputUnit::new(
            inport,
            self.id,
            dirn,
            self.virtual_networks * self.vcs_per_vnet,
            self.virtual_networks,
            in_link,
        ));
        self.routing_unit.add_in_direction(dirn, inport);
        self.crossbar.add_inport();
        inport
    }

    pub fn add_out_port(
        &mut self,
        dirn: PortDirection,
        credit_link: CreditLink,
        routing_table_entry: Vec<NetDest>,
        link_weight: usize,
        link_latency: Cycle,
    ) -> usize {
        let outport = self.output_units.len();
        self.output_units.push(OutputUnit::new(
            outport,
            self.id,
            dirn,
            self.virtual_networks * self.vcs_per_vnet,
            self.vcs_per_vnet,
            self.buffers_per_vc,
            link_latency,
            credit_link,
        ));
        self.routing_unit.add_route(routing_table_entry);
        self.routing_unit.add_weight(link_weight);
        self.routing_unit.add_out_direction(dirn, outport);
        outport
    }

    pub fn num_inports(&self) -> usize {
        self.input_units.len()
    }

    pub fn num_outports(&self) -> usize {
        self.output_units.len()
    }

    pub fn input_unit(&self, inport: usize) -> &InputUnit {
        &self.input_units[inport]
    }

    pub fn input_unit_mut(&mut self, inport: usize) -> &mut InputUnit {
        &mut self.input_units[inport]
    }

    pub fn output_unit(&self, outport: usize) -> &OutputUnit {
        &self.output_units[outport]
    }

    pub fn output_unit_mut(&mut self, outport: usize) -> &mut OutputUnit {
        &mut self.output_units[outport]
    }

    pub fn inport_direction(&self, inport: usize) -> PortDirection {
        self.input_units[inport].direction()
    }

    pub fn outport_direction(&self, outport: usize) -> PortDirection {
        self.output_units[outport].direction()
    }

    pub fn inport_idx(&self, dirn: PortDirection) -> Result<usize, Error> {
        self.routing_unit.inport_idx(dirn)
    }

    pub fn outport_idx(&self, dirn: PortDirection) -> Result<usize, Error> {
        self.routing_unit.outport_idx(dirn)
    }

    pub fn route_compute(
        &self,
        route: &mut RouteInfo,
        inport: usize,
        inport_dirn: PortDirection,
    ) -> Result<usize, Error> {
        self.routing_unit.outport_compute(route, inport, inport_dirn)
    }

    /// Records the switch allocation winner of `inport` for traversal.
    pub fn grant_switch(&mut self, inport: usize, flit: Flit) {
        self.crossbar.update_sw_winner(inport, flit);
    }

    pub fn schedule_wakeup(&mut self, cycle: Cycle) {
        self.pending_wakeups.push(cycle);
    }

    pub fn pending_wakeups(&self) -> &[Cycle] {
        &self.pending_wakeups
    }

    pub fn take_pending_wakeups(&mut self) -> Vec<Cycle> {
        std::mem::take(&mut self.pending_wakeups)
    }

    /// Reservations originated this cycle, keyed by the outport they leave by.
    pub fn take_ssr_outbox(&mut self) -> Vec<(usize, Ssr)> {
        std::mem::take(&mut self.ssr_outbox)
    }

    pub fn wakeup(&mut self, now: Cycle) -> Result<(), Error> {
        log::trace!("router {}: wakeup at {}", self.id, now);
        for inport in 0..self.input_units.len() {
            if self.smart.enabled && self.try_smart_bypass(inport, now)? {
                continue;
            }
            let outcome =
                self.input_units[inport].wakeup(now, self.pipe_stages, self.routing_unit.as_ref())?;
            match outcome {
                IngressOutcome::Buffered { wakeup: Some(cycle) } => self.schedule_wakeup(cycle),
                IngressOutcome::Stalled => self.schedule_wakeup(now + 1),
                _ => {}
            }
        }

        // Credits go before allocation so a VC freed now is usable now.
        for output_unit in self.output_units.iter_mut() {
            output_unit.wakeup(now)?;
        }

        if let Some(mut switch_allocator) = self.switch_allocator.take() {
            let allocated = switch_allocator.wakeup(self, now);
            self.switch_allocator = Some(switch_allocator);
            allocated?;
        }

        let traversals = self.crossbar.wakeup(&mut self.output_units, now);
        for traversal in traversals {
            self.originate_ssr(
                traversal.outport,
                traversal.flit,
                traversal.flit_type,
                &traversal.route,
                1,
                now,
            );
        }
        Ok(())
    }

    /// Emits a reservation toward the router behind `outport` for a
    /// single-flit packet that just left through it.
    fn originate_ssr(
        &mut self,
        outport: usize,
        flit: FlitKey,
        flit_type: FlitType,
        route: &RouteInfo,
        src_hops: usize,
        now: Cycle,
    ) {
        if !self.smart.enabled || flit_type != FlitType::HeadTail || src_hops > self.smart.hpc_max
        {
            return;
        }
        let output_unit = &self.output_units[outport];
        let dirn = output_unit.direction();
        if dirn == PortDirection::Local {
            return;
        }
        let (bypass_req, next_dirn) = match self.routing_unit.next_hop_direction(route, dirn) {
            Some(PortDirection::Local) => (false, PortDirection::Local),
            Some(next) if next == dirn => (true, next),
            _ => return,
        };
        let ssr = Ssr::new(
            src_hops,
            bypass_req,
            next_dirn,
            flit,
            route.clone(),
            now + output_unit.link_latency(),
        );
        log::debug!(
            "router {}: reservation for {} via {} ({} hops, bypass {})",
            self.id,
            flit,
            dirn,
            src_hops,
            bypass_req
        );
        self.ssr_outbox.push((outport, ssr));
    }

    /// Files a reservation that arrived through the port facing `inport_dirn`.
    pub fn insert_ssr(&mut self, inport_dirn: PortDirection, mut ssr: Ssr) -> Result<(), Error> {
        ssr.inport = Some(self.routing_unit.inport_idx(inport_dirn)?);
        if ssr.src_hops > 0 && !ssr.bypass_req {
            if ssr.route.dest_router == self.id && self.smart.dest_bypass {
                let outport = self
                    .routing_unit
                    .lookup_routing_table(ssr.vnet, &ssr.route.net_dest)?;
                ssr.outport_dirn = self.output_units[outport].direction();
                ssr.bypass_req = true;
                self.output_units[outport].insert_ssr(ssr);
            } else {
                log::debug!(
                    "router {}: dropping reservation for {} from {}",
                    self.id,
                    ssr.flit,
                    inport_dirn
                );
            }
            return Ok(());
        }
        let outport = self.routing_unit.outport_idx(ssr.outport_dirn)?;
        self.output_units[outport].insert_ssr(ssr);
        Ok(())
    }

    /// In-order admission of a bypassing flit at this router.
    fn admits_bypass(&self, flit: FlitKey, flit_type: FlitType) -> bool {
        match (flit_type.is_head(), self.last_flit) {
            (true, None) => true,
            (true, Some(_)) => false,
            (false, Some((last, _))) => {
                last.packet == flit.packet && (flit.id == last.id || flit.id == last.id + 1)
            }
            (false, None) => false,
        }
    }

    /// Lets the flit presented at `inport` skip this router's buffers if it
    /// holds the grant due this cycle. A declined bypass changes nothing and
    /// leaves the flit to the buffered path.
    pub fn try_smart_bypass(&mut self, inport: usize, now: Cycle) -> Result<bool, Error> {
        let (key, flit_type, vnet, invc) = match self.input_units[inport].peek_link(now) {
            Some(flit) => (flit.key(), flit.flit_type(), flit.vnet(), flit.vc()),
            None => return Ok(false),
        };
        let ssr = match self.input_units[inport].take_smart_grant(key, now) {
            SmartGrant::Won(ssr) => ssr,
            _ => return Ok(false),
        };
        let outport = self.routing_unit.outport_idx(ssr.outport_dirn)?;

        // A late grant may name a port another bypass already took.
        if self.output_units[outport].was_bypassed(now) {
            log::debug!(
                "router {}: outport {} already bypassed, buffering {}",
                self.id,
                outport,
                key
            );
            return Ok(false);
        }
        if !self.admits_bypass(key, flit_type) {
            log::debug!("router {}: {} not admitted in order", self.id, key);
            return Ok(false);
        }
        let output_unit = &self.output_units[outport];
        let has_vc = if flit_type.is_head() {
            output_unit.has_free_vc(vnet, now)
        } else {
            self.last_flit
                .map_or(false, |(_, outvc)| output_unit.has_credit(outvc))
        };
        if !has_vc || output_unit.is_locked_by_other(key.packet) {
            log::debug!(
                "router {}: no free vc for {} at outport {}",
                self.id,
                key,
                outport
            );
            return Ok(false);
        }
        let input_unit = &self.input_units[inport];
        if invc >= input_unit.num_vcs() {
            return Err(Error::InvalidVc(invc));
        }
        if !input_unit.is_vc_idle(invc, now) || !input_unit.vc(invc).is_empty() {
            return Err(Error::BypassVcNotIdle {
                router: self.id,
                inport,
                vc: invc,
            });
        }

        let mut flit = match self.input_units[inport].consume_link() {
            Some(flit) => flit,
            None => return Ok(false),
        };
        let outvc = self.smart_vc_select(inport, outport, &mut flit, now)?;
        self.smart_route_update(inport, outport, &mut flit)?;

        self.last_flit = if flit_type.is_tail() {
            None
        } else {
            Some((key, outvc))
        };
        match flit_type {
            FlitType::Head => self.output_units[outport].lock(key.packet),
            FlitType::Tail => self.output_units[outport].unlock(),
            _ => {}
        }
        flit.increment_hops();
        flit.route_mut().smart_hops_traversed += 1;
        let route = flit.route().clone();
        log::debug!(
            "router {}: {} bypassed inport {} to outport {} vc {}",
            self.id,
            key,
            inport,
            outport,
            outvc
        );
        self.output_units[outport].smart_bypass(flit, now);
        self.smart_bypasses += 1;
        self.originate_ssr(outport, key, flit_type, &route, ssr.src_hops + 1, now);
        Ok(true)
    }

    /// Binds the bypassing flit to an output VC and returns the input VC's
    /// credit upstream.
    fn smart_vc_select(
        &mut self,
        inport: usize,
        outport: usize,
        flit: &mut Flit,
        now: Cycle,
    ) -> Result<usize, Error> {
        let invc = flit.vc();
        let selected = if flit.flit_type().is_head() {
            self.output_units[outport].select_free_vc(flit.vnet(), now)
        } else {
            self.last_flit.map(|(_, outvc)| outvc)
        };
        let outvc = selected.ok_or(Error::NoFreeVc {
            router: self.id,
            outport,
        })?;
        self.output_units[outport].decrement_credit(outvc)?;
        self.input_units[inport].increment_credit(
            invc,
            flit.flit_type().is_tail(),
            now,
            flit.key(),
        );
        flit.set_vc(outvc);
        Ok(outvc)
    }

    /// Recomputes the route at this router; it has to agree with the
    /// reservation.
    fn smart_route_update(
        &mut self,
        inport: usize,
        outport: usize,
        flit: &mut Flit,
    ) -> Result<(), Error> {
        let inport_dirn = self.input_units[inport].direction();
        let computed = self
            .routing_unit
            .outport_compute(flit.route_mut(), inport, inport_dirn)?;
        if computed != outport {
            return Err(Error::RouteMismatch {
                router: self.id,
                expected: outport,
                computed,
            });
        }
        flit.set_outport(outport);
        Ok(())
    }

    pub fn functional_write(&mut self, update: &Payload) -> u32 {
        let mut updated = self.crossbar.functional_write(update);
        for input_unit in self.input_units.iter_mut() {
            updated += input_unit.functional_write(update);
        }
        for output_unit in self.output_units.iter_mut() {
            updated += output_unit.functional_write(update);
        }
        updated
    }

    pub fn collate_stats(&self) -> RouterStats {
        let mut stats = RouterStats {
            router: self.id,
            buffer_reads: vec![0; self.virtual_networks],
            buffer_writes: vec![0; self.virtual_networks],
            crossbar_activity: self.crossbar.activity(),
            smart_bypasses: self.smart_bypasses,
            ..Default::default()
        };
        for input_unit in self.input_units.iter() {
            for (vnet, count) in input_unit.buffer_reads().iter().enumerate() {
                stats.buffer_reads[vnet] += count;
            }
            for (vnet, count) in input_unit.buffer_writes().iter().enumerate() {
                stats.buffer_writes[vnet] += count;
            }
            stats.ingress_stalls += input_unit.stalls();
        }
        if let Some(switch_allocator) = self.switch_allocator.as_ref() {
            stats.sw_input_arbiter_activity = switch_allocator.input_arbiter_activity();
            stats.sw_output_arbiter_activity = switch_allocator.output_arbiter_activity();
        }
        stats
    }

    pub fn reset_stats(&mut self) {
        self.input_units.iter_mut().for_each(|u| u.reset_stats());
        self.crossbar.reset_stats();
        if let Some(switch_allocator) = self.switch_allocator.as_mut() {
            switch_allocator.reset_stats();
        }
        self.smart_bypasses = 0;
    }
}

impl VcdComponent for Router {
    fn vcd_write_scope(&self, writer: Rc<RefCell<VcdWriter>>) {
        let _vcd_router_scope =
            VcdWriter::managed_decl_scope(Rc::clone(&writer), &format!("router{}", self.id));
        for input_unit in self.input_units.iter() {
            let _vcd_port_scope = VcdWriter::managed_decl_scope(
                Rc::clone(&writer),
                &format!("in_{}", input_unit.direction()),
            );
            for vc in 0..input_unit.num_vcs() {
                writer
                    .borrow_mut()
                    .add_integer_var(&format!("vc{}_state", vc), 2);
            }
        }
        for output_unit in self.output_units.iter() {
            let _vcd_port_scope = VcdWriter::managed_decl_scope(
                Rc::clone(&writer),
                &format!("out_{}", output_unit.direction()),
            );
            for vc in 0..output_unit.num_vcs() {
                writer
                    .borrow_mut()
                    .add_integer_var(&format!("vc{}_credits", vc), 8);
            }
        }
    }

    fn vcd_trace(&self, writer: Rc<RefCell<VcdWriter>>) {
        let _vcd_router_scope =
            VcdWriter::managed_trace_scope(Rc::clone(&writer), &format!("router{}", self.id));
        for input_unit in self.input_units.iter() {
            let _vcd_port_scope = VcdWriter::managed_trace_scope(
                Rc::clone(&writer),
                &format!("in_{}", input_unit.direction()),
            );
            for vc in 0..input_unit.num_vcs() {
                writer.borrow_mut().change_value(
                    &format!("vc{}_state", vc),
                    input_unit.vc(vc).state().as_u64(),
                );
            }
        }
        for output_unit in self.output_units.iter() {
            let _vcd_port_scope = VcdWriter::managed_trace_scope(
                Rc::clone(&writer),
                &format!("out_{}", output_unit.direction()),
            );
            for vc in 0..output_unit.num_vcs() {
                writer.borrow_mut().change_value(
                    &format!("vc{}_credits", vc),
                    output_unit.outvc_state(vc).credit_count() as u64,
                );
            }
        }
    }
}
