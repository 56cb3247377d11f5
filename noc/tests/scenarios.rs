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

//! Single-router protocol scenarios driven cycle by cycle.

use noc::*;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

const LOCAL: usize = 0;
const WEST: usize = 1;
const EAST: usize = 1;

/// Routers on a line: everything heads east until it reaches its
/// destination. Counts route computations.
struct LineRouting {
    router: usize,
    computes: Rc<Cell<usize>>,
    inports: BTreeMap<PortDirection, usize>,
    outports: BTreeMap<PortDirection, usize>,
}

impl RoutingUnit for LineRouting {
    fn add_in_direction(&mut self, dirn: PortDirection, inport: usize) {
        self.inports.insert(dirn, inport);
    }

    fn add_out_direction(&mut self, dirn: PortDirection, outport: usize) {
        self.outports.insert(dirn, outport);
    }

    fn add_route(&mut self, _entry: Vec<NetDest>) {}

    fn add_weight(&mut self, _weight: usize) {}

    fn outport_compute(
        &self,
        route: &mut RouteInfo,
        _inport: usize,
        _inport_dirn: PortDirection,
    ) -> Result<usize, Error> {
        self.computes.set(self.computes.get() + 1);
        let dirn = if route.dest_router == self.router {
            PortDirection::Local
        } else {
            PortDirection::East
        };
        route.outport_dirn = Some(dirn);
        self.outport_idx(dirn)
    }

    fn inport_idx(&self, dirn: PortDirection) -> Result<usize, Error> {
        self.inports
            .get(&dirn)
            .copied()
            .ok_or(Error::UnknownDirection(dirn))
    }

    fn outport_idx(&self, dirn: PortDirection) -> Result<usize, Error> {
        self.outports
            .get(&dirn)
            .copied()
            .ok_or(Error::UnknownDirection(dirn))
    }

    fn lookup_routing_table(&self, _vnet: usize, dest: &NetDest) -> Result<usize, Error> {
        if dest.contains(self.router) {
            self.outport_idx(PortDirection::Local)
        } else {
            self.outport_idx(PortDirection::East)
        }
    }

    fn next_hop_direction(
        &self,
        route: &RouteInfo,
        outport_dirn: PortDirection,
    ) -> Option<PortDirection> {
        match outport_dirn {
            PortDirection::East if route.dest_router == self.router + 1 => {
                Some(PortDirection::Local)
            }
            PortDirection::East => Some(PortDirection::East),
            _ => None,
        }
    }
}

fn smart() -> SmartConfiguration {
    SmartConfiguration {
        enabled: true,
        dest_bypass: true,
        hpc_max: 4,
        priority: SmartPriority::Local,
    }
}

/// Router with Local and West inputs, Local and East outputs, one vnet of
/// two VCs with four buffers each.
fn line_router(id: usize, latency: Cycle, smart: SmartConfiguration) -> (Router, Rc<Cell<usize>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = RouterConfiguration {
        latency,
        virtual_networks: 1,
        vcs_per_vnet: 2,
        buffers_per_vc: 4,
    };
    let computes = Rc::new(Cell::new(0));
    let routing = LineRouting {
        router: id,
        computes: Rc::clone(&computes),
        inports: BTreeMap::new(),
        outports: BTreeMap::new(),
    };
    let mut router = Router::new(
        id,
        &config,
        &smart,
        Box::new(routing),
        Box::new(SeparableAllocator::new(smart.priority)),
    );
    router.add_in_port(PortDirection::Local, NetworkLink::new(0, 1));
    router.add_in_port(PortDirection::West, NetworkLink::new(1, 1));
    router.add_out_port(
        PortDirection::Local,
        CreditLink::new(2, 1),
        vec![NetDest::single(id)],
        1,
        1,
    );
    router.add_out_port(PortDirection::East, CreditLink::new(3, 1), vec![NetDest::new()], 1, 1);
    (router, computes)
}

fn flit(packet: PacketId, id: usize, flit_type: FlitType, vc: usize, dest: usize) -> Flit {
    Flit::new(packet, id, flit_type, vc, RouteInfo::new(0, 0, dest), None, 0)
}

fn credit_summary(credits: &[Credit]) -> Vec<(usize, bool, Cycle)> {
    credits
        .iter()
        .map(|c| (c.vc, c.is_free_signal, c.time))
        .collect()
}

#[test]
fn packet_is_rebuilt_in_order() {
    let (mut router, computes) = line_router(1, 1, SmartConfiguration::default());
    router
        .input_unit_mut(WEST)
        .receive(flit(1, 0, FlitType::Head, 0, 5), 1);
    router
        .input_unit_mut(WEST)
        .receive(flit(1, 1, FlitType::Body, 0, 5), 2);
    router
        .input_unit_mut(WEST)
        .receive(flit(1, 2, FlitType::Tail, 0, 5), 3);

    let mut sent = vec![];
    let mut credits = vec![];
    for now in 1..=3 {
        router.wakeup(now).unwrap();
        if now < 3 {
            assert!(router
                .input_unit(WEST)
                .vc(0)
                .is_in_state(VcState::Active, now));
        }
        let out = router.output_unit_mut(EAST).drain_out_buffer();
        assert_eq!(out.len(), 1, "one flit leaves per cycle");
        sent.extend(out);
        credits.extend(router.input_unit_mut(WEST).drain_credits());
    }

    assert_eq!(computes.get(), 1, "route bound once at the head");
    let ids: Vec<usize> = sent.iter().map(|f| f.id()).collect();
    assert_eq!(ids, vec![0, 1, 2]);
    assert!(sent.iter().all(|f| f.vc() == 0 && f.outport() == EAST));
    assert_eq!(
        credit_summary(&credits),
        vec![(0, false, 2), (0, false, 3), (0, true, 4)]
    );
    // Idle exactly one cycle after the tail won the switch.
    assert!(!router.input_unit(WEST).is_vc_idle(0, 3));
    assert!(router.input_unit(WEST).is_vc_idle(0, 4));
    assert_eq!(router.output_unit(EAST).outvc_state(0).credit_count(), 1);
    assert!(!router.output_unit(EAST).is_locked());
}

#[test]
fn stalls_on_a_gap_in_flit_ids() {
    let routing = LineRouting {
        router: 1,
        computes: Rc::new(Cell::new(0)),
        inports: BTreeMap::new(),
        outports: vec![(PortDirection::Local, 0), (PortDirection::East, 1)]
            .into_iter()
            .collect(),
    };
    let mut unit = InputUnit::new(1, 1, PortDirection::West, 2, 1, NetworkLink::new(0, 1));
    for id in 0..4 {
        let flit_type = if id == 0 {
            FlitType::Head
        } else {
            FlitType::Body
        };
        unit.receive(flit(1, id, flit_type, 0, 5), id + 1);
    }
    unit.receive(flit(1, 5, FlitType::Body, 0, 5), 5);
    for now in 1..=4 {
        assert!(matches!(
            unit.wakeup(now, 1, &routing),
            Ok(IngressOutcome::Buffered { .. })
        ));
    }
    for now in 5..=8 {
        assert_eq!(unit.wakeup(now, 1, &routing), Ok(IngressOutcome::Stalled));
        assert_eq!(unit.peek_link(now).map(|f| f.id()), Some(5));
        assert_eq!(unit.vc(0).len(), 4);
    }
    // The link now delivers the missing flit first.
    unit.consume_link();
    unit.receive(flit(1, 4, FlitType::Body, 0, 5), 9);
    unit.receive(flit(1, 5, FlitType::Tail, 0, 5), 10);
    assert!(matches!(
        unit.wakeup(9, 1, &routing),
        Ok(IngressOutcome::Buffered { .. })
    ));
    assert!(matches!(
        unit.wakeup(10, 1, &routing),
        Ok(IngressOutcome::Buffered { .. })
    ));
    assert_eq!(unit.vc(0).len(), 6);
    assert_eq!(unit.current_packet(), None);
    assert_eq!(unit.stalls(), 4);
}

#[test]
fn single_stage_pipeline_switches_immediately() {
    let (mut router, _) = line_router(1, 1, SmartConfiguration::default());
    router
        .input_unit_mut(WEST)
        .receive(flit(1, 0, FlitType::HeadTail, 0, 5), 1);
    router.wakeup(1).unwrap();
    assert_eq!(router.output_unit_mut(EAST).drain_out_buffer().len(), 1);
    assert!(router.take_pending_wakeups().is_empty());
}

#[test]
fn deeper_pipeline_delays_switch_allocation() {
    let (mut router, _) = line_router(1, 3, SmartConfiguration::default());
    router
        .input_unit_mut(WEST)
        .receive(flit(1, 0, FlitType::HeadTail, 0, 5), 1);
    router.wakeup(1).unwrap();
    assert!(router.output_unit_mut(EAST).drain_out_buffer().is_empty());
    let wakeups = router.take_pending_wakeups();
    assert_eq!(wakeups.iter().filter(|c| **c == 3).count(), 1);
    assert!(!wakeups.contains(&2));
    let top = router.input_unit(WEST).vc(0).peek_top_flit().unwrap();
    assert!(top.is_stage(FlitStage::SwitchAllocation, 3));
    assert!(!top.is_stage(FlitStage::SwitchAllocation, 2));

    router.wakeup(3).unwrap();
    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].time(), 4);
}

/// Files a reservation for `key` at router 1 in cycle 10; it is granted in
/// the same cycle and due at 11.
fn reserve(router: &mut Router, key: FlitKey, src_hops: usize) {
    let ssr = Ssr::new(
        src_hops,
        true,
        PortDirection::East,
        key,
        RouteInfo::new(0, 0, 5),
        10,
    );
    router.insert_ssr(PortDirection::West, ssr).unwrap();
    router.wakeup(10).unwrap();
    assert_eq!(router.input_unit(WEST).pending_grants(), 1);
}

#[test]
fn granted_flit_bypasses_the_buffers() {
    let (mut router, computes) = line_router(1, 1, smart());
    let f = flit(7, 0, FlitType::HeadTail, 1, 5);
    reserve(&mut router, f.key(), 2);
    router.input_unit_mut(WEST).receive(f, 11);
    router.wakeup(11).unwrap();

    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].key(), FlitKey { packet: 7, id: 0 });
    assert_eq!(sent[0].hops(), 1);
    assert_eq!(sent[0].route().smart_hops_traversed, 1);
    assert_eq!(sent[0].vc(), 0);
    assert_eq!(sent[0].time(), 12);
    assert_eq!(computes.get(), 1);

    let west = router.input_unit(WEST);
    assert_eq!(west.vc(1).state(), VcState::Idle);
    assert!(west.vc(1).is_empty());
    assert_eq!(west.buffer_writes(), &[0]);
    assert_eq!(
        credit_summary(&router.input_unit_mut(WEST).drain_credits()),
        vec![(1, true, 12)]
    );
    assert_eq!(router.output_unit(EAST).outvc_state(0).credit_count(), 3);
    assert_eq!(router.collate_stats().smart_bypasses, 1);

    let outbox = router.take_ssr_outbox();
    assert_eq!(outbox.len(), 1);
    let (outport, chained) = &outbox[0];
    assert_eq!(*outport, EAST);
    assert_eq!(chained.src_hops, 3);
    assert!(chained.bypass_req);
    assert_eq!(chained.outport_dirn, PortDirection::East);
    assert_eq!(chained.time, 12);
}

#[test]
fn bypass_without_free_vc_falls_back_to_buffering() {
    let (mut router, _) = line_router(1, 1, smart());
    {
        let east = router.output_unit_mut(EAST);
        assert_eq!(east.select_free_vc(0, 0), Some(0));
        east.decrement_credit(0).unwrap();
        assert_eq!(east.select_free_vc(0, 0), Some(1));
    }
    let f = flit(7, 0, FlitType::HeadTail, 1, 5);
    let key = f.key();
    reserve(&mut router, key, 2);
    router.input_unit_mut(WEST).receive(f, 11);
    router.wakeup(11).unwrap();

    assert!(router.output_unit_mut(EAST).drain_out_buffer().is_empty());
    let east = router.output_unit(EAST);
    assert_eq!(east.outvc_state(0).credit_count(), 3);
    assert_eq!(east.outvc_state(1).credit_count(), 4);
    assert!(east.outvc_state(0).is_in_state(VcState::Active, 11));
    assert!(router.input_unit_mut(WEST).drain_credits().is_empty());
    assert_eq!(router.input_unit(WEST).vc(1).len(), 1);
    assert!(router
        .input_unit(WEST)
        .vc(1)
        .is_in_state(VcState::Active, 11));
    assert_eq!(router.collate_stats().smart_bypasses, 0);

    // Freeing a downstream VC lets the buffered flit go the ordinary way.
    router
        .output_unit_mut(EAST)
        .receive_credit(Credit::new(0, true, 12, key));
    router.wakeup(12).unwrap();
    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].hops(), 1);
    assert_eq!(sent[0].route().smart_hops_traversed, 0);
}

#[test]
fn grant_for_another_flit_is_lost() {
    let (mut router, _) = line_router(1, 1, smart());
    reserve(&mut router, FlitKey { packet: 99, id: 0 }, 1);
    router
        .input_unit_mut(WEST)
        .receive(flit(7, 0, FlitType::HeadTail, 0, 5), 11);
    router.wakeup(11).unwrap();
    assert_eq!(router.input_unit(WEST).pending_grants(), 0);
    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].route().smart_hops_traversed, 0);
    assert_eq!(router.input_unit(WEST).buffer_writes(), &[1]);
}

#[test]
fn bypass_claims_port_for_the_cycle() {
    let (mut router, _) = line_router(1, 1, smart());
    let f = flit(7, 0, FlitType::HeadTail, 1, 5);
    reserve(&mut router, f.key(), 1);
    router.input_unit_mut(WEST).receive(f, 11);
    // A local flit wants the same output in the same cycle.
    router
        .input_unit_mut(LOCAL)
        .receive(flit(8, 0, FlitType::HeadTail, 0, 5), 11);
    router.wakeup(11).unwrap();
    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].packet(), 7);
    assert!(router.take_pending_wakeups().contains(&12));
    router.wakeup(12).unwrap();
    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].packet(), 8);
}

#[test]
fn late_grant_yields_port_already_bypassed() {
    let (mut router, _) = line_router(1, 1, smart());
    let late = flit(7, 0, FlitType::HeadTail, 1, 5);
    reserve(&mut router, late.key(), 1);
    // Due at 11, but its flit only shows up at 13.
    router.wakeup(11).unwrap();

    let fresh = flit(8, 0, FlitType::HeadTail, 0, 5);
    let ssr = Ssr::new(
        1,
        true,
        PortDirection::East,
        fresh.key(),
        RouteInfo::new(0, 0, 5),
        12,
    );
    router.insert_ssr(PortDirection::Local, ssr).unwrap();
    router.wakeup(12).unwrap();
    assert_eq!(router.input_unit(LOCAL).pending_grants(), 1);

    router.input_unit_mut(LOCAL).receive(fresh, 13);
    router.input_unit_mut(WEST).receive(late, 13);
    router.wakeup(13).unwrap();
    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].packet(), 8);
    assert_eq!(sent[0].time(), 14);
    assert_eq!(router.collate_stats().smart_bypasses, 1);
    assert_eq!(router.input_unit(WEST).pending_grants(), 0);
    assert_eq!(router.input_unit(WEST).vc(1).len(), 1);

    router.wakeup(14).unwrap();
    let sent = router.output_unit_mut(EAST).drain_out_buffer();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].packet(), 7);
    assert_eq!(sent[0].time(), 15);
    assert_eq!(sent[0].route().smart_hops_traversed, 0);
}

#[test]
fn bypass_into_occupied_vc_is_fatal() {
    // Three stages keep the buffered head out of allocation until 11.
    let (mut router, _) = line_router(1, 3, smart());
    router
        .input_unit_mut(WEST)
        .receive(flit(6, 0, FlitType::Head, 1, 5), 9);
    router.wakeup(9).unwrap();
    let f = flit(7, 0, FlitType::HeadTail, 1, 5);
    reserve(&mut router, f.key(), 1);
    router.input_unit_mut(WEST).receive(f, 11);

    assert_eq!(
        router.wakeup(11),
        Err(Error::BypassVcNotIdle {
            router: 1,
            inport: WEST,
            vc: 1
        })
    );
    // Nothing was committed before the check failed.
    let west = router.input_unit(WEST);
    assert_eq!(west.vc(1).len(), 1);
    assert!(west.vc(1).is_in_state(VcState::Active, 11));
    assert_eq!(west.peek_link(11).map(|f| f.packet()), Some(7));
    assert_eq!(router.input_unit_mut(WEST).drain_credits(), vec![]);
    let east = router.output_unit(EAST);
    assert_eq!(east.outvc_state(0).credit_count(), 4);
    assert!(east.outvc_state(0).is_in_state(VcState::Idle, 11));
    assert!(!east.was_bypassed(11));
    assert_eq!(router.collate_stats().smart_bypasses, 0);
}

#[test]
fn reservations_stop_at_the_hop_limit() {
    let (mut router, _) = line_router(1, 1, smart());
    let f = flit(7, 0, FlitType::HeadTail, 1, 5);
    reserve(&mut router, f.key(), 3);
    router.input_unit_mut(WEST).receive(f, 11);
    router.wakeup(11).unwrap();
    let outbox = router.take_ssr_outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].1.src_hops, 4);

    let (mut router, _) = line_router(1, 1, smart());
    let f = flit(7, 0, FlitType::HeadTail, 1, 5);
    reserve(&mut router, f.key(), 4);
    router.input_unit_mut(WEST).receive(f, 11);
    router.wakeup(11).unwrap();
    assert_eq!(router.output_unit_mut(EAST).drain_out_buffer().len(), 1);
    assert!(router.take_ssr_outbox().is_empty());
}

#[test]
fn destination_converts_reservation_to_local_bypass() {
    let (mut router, _) = line_router(5, 1, smart());
    let ssr = Ssr::new(
        1,
        false,
        PortDirection::Local,
        FlitKey { packet: 3, id: 0 },
        RouteInfo::new(0, 2, 5),
        4,
    );
    router.insert_ssr(PortDirection::West, ssr).unwrap();
    let local = router.output_unit(LOCAL);
    assert_eq!(local.pending_ssrs(), 1);
    let top = local.top_ssr().unwrap();
    assert!(top.bypass_req);
    assert_eq!(top.outport_dirn, PortDirection::Local);
    assert_eq!(top.inport, Some(WEST));
}

#[test]
fn non_bypass_reservations_are_dropped_elsewhere() {
    let ssr = Ssr::new(
        1,
        false,
        PortDirection::Local,
        FlitKey { packet: 3, id: 0 },
        RouteInfo::new(0, 2, 5),
        4,
    );
    // Destination without destination bypass.
    let mut config = smart();
    config.dest_bypass = false;
    let (mut router, _) = line_router(5, 1, config);
    router.insert_ssr(PortDirection::West, ssr.clone()).unwrap();
    assert_eq!(router.output_unit(LOCAL).pending_ssrs(), 0);
    assert_eq!(router.output_unit(EAST).pending_ssrs(), 0);

    // Not the destination.
    let (mut router, _) = line_router(4, 1, smart());
    router.insert_ssr(PortDirection::West, ssr).unwrap();
    assert_eq!(router.output_unit(LOCAL).pending_ssrs(), 0);
    assert_eq!(router.output_unit(EAST).pending_ssrs(), 0);
}

#[test]
fn bypass_route_mismatch_is_fatal() {
    let (mut router, _) = line_router(1, 1, smart());
    // Destination 1 routes to Local, but the reservation asked for East.
    let f = flit(7, 0, FlitType::HeadTail, 0, 1);
    reserve(&mut router, f.key(), 1);
    router.input_unit_mut(WEST).receive(f, 11);
    assert_eq!(
        router.wakeup(11),
        Err(Error::RouteMismatch {
            router: 1,
            expected: EAST,
            computed: LOCAL
        })
    );
}
