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

//! A mesh of routers and network interfaces driven by a global event queue.

use crate::config::NetworkConfiguration;
use crate::error::Error;
use crate::event::{EventQueue, Target};
use crate::flit::{Flit, FlitType, PacketId, Payload, PortDirection, RouteInfo};
use crate::link::{CreditLink, NetworkLink};
use crate::network_interface::NetworkInterface;
use crate::router::Router;
use crate::routing::MeshRoutingUnit;
use crate::stats::NetworkStats;
use crate::switch_allocator::SeparableAllocator;
use crate::topology::Topology;
use crate::vcd::{VcdComponent, VcdWriter};
use crate::Cycle;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Links between a router's local ports and its interface.
const LOCAL_LINK_LATENCY: Cycle = 1;

/// Where a router port leads.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Endpoint {
    Router { router: usize, port: usize },
    Interface(usize),
}

pub struct Network {
    config: NetworkConfiguration,
    topology: Topology,
    routers: Vec<Router>,
    interfaces: Vec<NetworkInterface>,
    events: EventQueue,
    now: Cycle,
    next_packet: PacketId,
    /// Receiver of each `(router, outport)` and the link latency to it.
    downstream: BTreeMap<(usize, usize), (Endpoint, Cycle)>,
    /// Sender feeding each `(router, inport)`; credits flow back to it.
    upstream: BTreeMap<(usize, usize), Endpoint>,
    local_ports: Vec<(usize, usize)>,
    injected_at: BTreeMap<PacketId, Cycle>,
    vcd_writer: Option<Rc<RefCell<VcdWriter>>>,
}

impl Network {
    pub fn new(config: &NetworkConfiguration) -> Result<Self, Error> {
        config.validate()?;
        let topology = Topology::mesh(config.rows, config.cols, config.link_latency);
        let num_routers = topology.num_routers();
        let router_config = &config.router;
        let vnets = router_config.virtual_networks;

        let mut routers: Vec<Router> = (0..num_routers)
            .map(|r| {
                Router::new(
                    r,
                    router_config,
                    &config.smart,
                    Box::new(MeshRoutingUnit::new(
                        r,
                        config.rows,
                        config.cols,
                        config.routing_algorithm,
                    )),
                    Box::new(SeparableAllocator::new(config.smart.priority)),
                )
            })
            .collect();
        let interfaces = (0..num_routers)
            .map(|r| {
                NetworkInterface::new(
                    r,
                    router_config.num_vcs(),
                    router_config.vcs_per_vnet,
                    router_config.buffers_per_vc,
                )
            })
            .collect();

        let mut downstream = BTreeMap::new();
        let mut upstream = BTreeMap::new();
        let mut local_ports = vec![];
        let mut link_id = 0;
        let mut next_link_id = || {
            link_id += 1;
            link_id - 1
        };

        for (r, router) in routers.iter_mut().enumerate() {
            let inport = router.add_in_port(
                PortDirection::Local,
                NetworkLink::new(next_link_id(), LOCAL_LINK_LATENCY),
            );
            let outport = router.add_out_port(
                PortDirection::Local,
                CreditLink::new(next_link_id(), 1),
                topology.local_table_entry(r, vnets),
                1,
                LOCAL_LINK_LATENCY,
            );
            upstream.insert((r, inport), Endpoint::Interface(r));
            downstream.insert((r, outport), (Endpoint::Interface(r), LOCAL_LINK_LATENCY));
            local_ports.push((inport, outport));
        }

        let mut incoming: Vec<Vec<(PortDirection, usize, usize, Cycle)>> =
            vec![vec![]; num_routers];
        for r in 0..num_routers {
            for (next, channel) in topology.links_from(r) {
                let outport = routers[r].add_out_port(
                    channel.src_outport_dirn,
                    CreditLink::new(next_link_id(), 1),
                    topology.routing_table_entry(r, next, channel, vnets),
                    channel.weight,
                    channel.latency,
                );
                incoming[next].push((channel.dst_inport_dirn, r, outport, channel.latency));
            }
        }
        for (r, mut links) in incoming.into_iter().enumerate() {
            links.sort();
            for (dirn, src, src_outport, latency) in links {
                let inport = routers[r].add_in_port(dirn, NetworkLink::new(next_link_id(), latency));
                upstream.insert(
                    (r, inport),
                    Endpoint::Router {
                        router: src,
                        port: src_outport,
                    },
                );
                downstream.insert(
                    (src, src_outport),
                    (Endpoint::Router { router: r, port: inport }, latency),
                );
            }
        }
        log::debug!(
            "network: {} routers, {} links, smart {}",
            num_routers,
            downstream.len(),
            config.smart.enabled
        );

        Ok(Self {
            config: config.clone(),
            topology,
            routers,
            interfaces,
            events: EventQueue::new(),
            now: 0,
            next_packet: 0,
            downstream,
            upstream,
            local_ports,
            injected_at: BTreeMap::new(),
            vcd_writer: None,
        })
    }

    pub fn config(&self) -> &NetworkConfiguration {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn now(&self) -> Cycle {
        self.now
    }

    pub fn num_routers(&self) -> usize {
        self.routers.len()
    }

    pub fn router(&self, r: usize) -> &Router {
        &self.routers[r]
    }

    pub fn interface(&self, r: usize) -> &NetworkInterface {
        &self.interfaces[r]
    }

    /// Flits delivered to the interface of router `r`, with their cycle.
    pub fn ejected(&self, r: usize) -> &[(Cycle, Flit)] {
        self.interfaces[r].ejected()
    }

    /// Nothing left to simulate.
    pub fn is_idle(&self) -> bool {
        self.events.is_empty()
    }

    pub fn inject(
        &mut self,
        src: usize,
        dest: usize,
        vnet: usize,
        num_flits: usize,
        at: Cycle,
    ) -> Result<PacketId, Error> {
        self.inject_with_payload(src, dest, vnet, num_flits, at, None)
    }

    /// Queues a packet of `num_flits` flits at the interface of `src`.
    pub fn inject_with_payload(
        &mut self,
        src: usize,
        dest: usize,
        vnet: usize,
        num_flits: usize,
        at: Cycle,
        payload: Option<Payload>,
    ) -> Result<PacketId, Error> {
        let num_routers = self.routers.len();
        if src >= num_routers {
            return Err(Error::InvalidNode(src));
        }
        if dest >= num_routers {
            return Err(Error::InvalidNode(dest));
        }
        if vnet >= self.config.router.virtual_networks {
            return Err(Error::InvalidVnet(vnet));
        }
        if num_flits == 0 {
            return Err(Error::EmptyPacket);
        }
        let at = at.max(self.now);
        let packet = self.next_packet;
        self.next_packet += 1;
        let route = RouteInfo::new(vnet, src, dest);
        let flits = (0..num_flits)
            .map(|id| {
                Flit::new(
                    packet,
                    id,
                    FlitType::for_position(id, num_flits),
                    0,
                    route.clone(),
                    payload,
                    at,
                )
            })
            .collect();
        self.interfaces[src].enqueue_packet(flits);
        self.injected_at.insert(packet, at);
        self.events.schedule(at, Target::Interface(src));
        log::debug!(
            "packet {}: {} -> {} vnet {} ({} flits) at {}",
            packet,
            src,
            dest,
            vnet,
            num_flits,
            at
        );
        Ok(packet)
    }

    /// Simulates every event up to and including cycle `end`.
    pub fn run_until(&mut self, end: Cycle) -> Result<(), Error> {
        while let Some(cycle) = self.events.next_cycle() {
            if cycle > end {
                break;
            }
            self.step()?;
        }
        self.now = self.now.max(end);
        Ok(())
    }

    /// Simulates until nothing is left to do or `limit` is passed; returns
    /// the last simulated cycle.
    pub fn run_to_completion(&mut self, limit: Cycle) -> Result<Cycle, Error> {
        while let Some(cycle) = self.events.next_cycle() {
            if cycle > limit {
                break;
            }
            self.step()?;
        }
        Ok(self.now)
    }

    /// Simulates the next cycle with pending events.
    pub fn step(&mut self) -> Result<Option<Cycle>, Error> {
        let (cycle, targets) = match self.events.pop_cycle() {
            Some(due) => due,
            None => return Ok(None),
        };
        self.now = cycle;
        for target in targets {
            match target {
                Target::Interface(i) => {
                    if let Some(next) = self.interfaces[i].wakeup(cycle)? {
                        self.events.schedule(next, Target::Interface(i));
                    }
                }
                Target::Router(r) => {
                    self.routers[r].wakeup(cycle)?;
                    for next in self.routers[r].take_pending_wakeups() {
                        self.events.schedule(next, Target::Router(r));
                    }
                }
            }
        }
        self.transport()?;
        self.trace_vcd(cycle);
        Ok(Some(cycle))
    }

    /// Moves what routers and interfaces emitted this cycle onto the links
    /// of their receivers and schedules the receivers.
    fn transport(&mut self) -> Result<(), Error> {
        for r in 0..self.routers.len() {
            for outport in 0..self.routers[r].num_outports() {
                let flits = self.routers[r].output_unit_mut(outport).drain_out_buffer();
                if flits.is_empty() {
                    continue;
                }
                let (endpoint, latency) = self.downstream[&(r, outport)];
                for flit in flits {
                    let arrival = flit.time() + latency;
                    match endpoint {
                        Endpoint::Router { router, port } => {
                            let arrival =
                                self.routers[router].input_unit_mut(port).receive(flit, arrival);
                            self.events.schedule(arrival, Target::Router(router));
                        }
                        Endpoint::Interface(i) => {
                            let arrival = self.interfaces[i].receive(flit, arrival);
                            self.events.schedule(arrival, Target::Interface(i));
                        }
                    }
                }
            }

            for inport in 0..self.routers[r].num_inports() {
                let credits = self.routers[r].input_unit_mut(inport).drain_credits();
                if credits.is_empty() {
                    continue;
                }
                let endpoint = self.upstream[&(r, inport)];
                for credit in credits {
                    match endpoint {
                        Endpoint::Router { router, port } => {
                            let arrival =
                                self.routers[router].output_unit_mut(port).receive_credit(credit);
                            self.events.schedule(arrival, Target::Router(router));
                        }
                        Endpoint::Interface(i) => {
                            let arrival = self.interfaces[i].receive_credit(credit);
                            self.events.schedule(arrival, Target::Interface(i));
                        }
                    }
                }
            }

            for (outport, ssr) in self.routers[r].take_ssr_outbox() {
                if let (Endpoint::Router { router, port }, _) = self.downstream[&(r, outport)] {
                    let due = ssr.time;
                    let dirn = self.routers[router].inport_direction(port);
                    self.routers[router].insert_ssr(dirn, ssr)?;
                    self.events.schedule(due, Target::Router(router));
                }
            }
        }

        for i in 0..self.interfaces.len() {
            let (local_inport, local_outport) = self.local_ports[i];
            for flit in self.interfaces[i].drain_out_buffer() {
                let arrival = flit.time() + LOCAL_LINK_LATENCY;
                let arrival = self.routers[i]
                    .input_unit_mut(local_inport)
                    .receive(flit, arrival);
                self.events.schedule(arrival, Target::Router(i));
            }
            for credit in self.interfaces[i].drain_credits() {
                let arrival = self.routers[i]
                    .output_unit_mut(local_outport)
                    .receive_credit(credit);
                self.events.schedule(arrival, Target::Router(i));
            }
        }
        Ok(())
    }

    /// Applies a functional write to every flit held anywhere in the network.
    pub fn functional_write(&mut self, update: &Payload) -> u32 {
        let in_routers: u32 = self
            .routers
            .iter_mut()
            .map(|r| r.functional_write(update))
            .sum();
        let in_interfaces: u32 = self
            .interfaces
            .iter_mut()
            .map(|ni| ni.functional_write(update))
            .sum();
        in_routers + in_interfaces
    }

    pub fn stats(&self) -> NetworkStats {
        let mut stats = NetworkStats {
            cycles: self.now,
            packets_injected: self.injected_at.len() as u64,
            ..Default::default()
        };
        for ni in self.interfaces.iter() {
            stats.flits_injected += ni.flits_injected();
            for (cycle, flit) in ni.ejected() {
                stats.flits_ejected += 1;
                stats.total_hops += flit.hops() as u64;
                if flit.flit_type().is_tail() {
                    stats.packets_ejected += 1;
                    if let Some(at) = self.injected_at.get(&flit.packet()) {
                        stats.total_packet_latency += (*cycle - *at) as u64;
                    }
                }
            }
        }
        for router in self.routers.iter() {
            let router_stats = router.collate_stats();
            stats.smart_bypasses += router_stats.smart_bypasses;
            stats.ingress_stalls += router_stats.ingress_stalls;
            stats.routers.push(router_stats);
        }
        stats
    }

    pub fn reset_stats(&mut self) {
        self.routers.iter_mut().for_each(|r| r.reset_stats());
    }

    /// Starts dumping per-cycle VC states and credit counts.
    pub fn enable_vcd(&mut self, writer: VcdWriter) {
        let writer = Rc::new(RefCell::new(writer));
        let components: Vec<&dyn VcdComponent> =
            self.routers.iter().map(|r| r as &dyn VcdComponent).collect();
        VcdWriter::write_header(Rc::clone(&writer), &components);
        self.vcd_writer = Some(writer);
    }

    fn trace_vcd(&self, cycle: Cycle) {
        if let Some(writer) = self.vcd_writer.as_ref() {
            let components: Vec<&dyn VcdComponent> =
                self.routers.iter().map(|r| r as &dyn VcdComponent).collect();
            VcdWriter::trace_cycle(Rc::clone(writer), cycle as u64, &components);
        }
    }
}
