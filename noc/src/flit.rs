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

//! Flits and the routing metadata they carry through the network.

use crate::Cycle;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub type PacketId = usize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FlitType {
    Head,
    Body,
    Tail,
    HeadTail,
}

impl FlitType {
    /// HEAD and HEAD_TAIL open a packet.
    pub fn is_head(&self) -> bool {
        matches!(self, FlitType::Head | FlitType::HeadTail)
    }

    /// TAIL and HEAD_TAIL close a packet.
    pub fn is_tail(&self) -> bool {
        matches!(self, FlitType::Tail | FlitType::HeadTail)
    }

    /// The type of flit `id` in a packet of `len` flits.
    pub fn for_position(id: usize, len: usize) -> Self {
        match (id, len) {
            (_, 1) => FlitType::HeadTail,
            (0, _) => FlitType::Head,
            (i, n) if i + 1 == n => FlitType::Tail,
            _ => FlitType::Body,
        }
    }
}

/// Router pipeline stages.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FlitStage {
    Invalid,
    VcAllocation,
    SwitchAllocation,
    SwitchTraversal,
    LinkTraversal,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
pub enum PortDirection {
    Local,
    North,
    East,
    South,
    West,
}

impl PortDirection {
    pub const ALL: [PortDirection; 5] = [
        PortDirection::Local,
        PortDirection::North,
        PortDirection::East,
        PortDirection::South,
        PortDirection::West,
    ];

    /// The direction a link leaving through `self` enters the neighbour.
    pub fn opposite(&self) -> Self {
        match self {
            PortDirection::Local => PortDirection::Local,
            PortDirection::North => PortDirection::South,
            PortDirection::South => PortDirection::North,
            PortDirection::East => PortDirection::West,
            PortDirection::West => PortDirection::East,
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PortDirection::Local => "Local",
            PortDirection::North => "North",
            PortDirection::East => "East",
            PortDirection::South => "South",
            PortDirection::West => "West",
        };
        write!(f, "{}", name)
    }
}

/// A set of destination routers.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NetDest(BTreeSet<usize>);

impl NetDest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(router: usize) -> Self {
        let mut dest = Self::new();
        dest.add(router);
        dest
    }

    pub fn add(&mut self, router: usize) {
        self.0.insert(router);
    }

    pub fn contains(&self, router: usize) -> bool {
        self.0.contains(&router)
    }

    pub fn intersects(&self, other: &NetDest) -> bool {
        self.0.intersection(&other.0).next().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.0.iter()
    }
}

impl fmt::Display for NetDest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{{{}}}", self.0.iter().join(","))
    }
}

/// Per-packet result of route computation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RouteInfo {
    pub vnet: usize,
    pub net_dest: NetDest,
    pub src_router: usize,
    pub dest_router: usize,
    pub x_hops_remaining: usize,
    pub y_hops_remaining: usize,
    /// Outport direction chosen at the router currently holding the flit.
    pub outport_dirn: Option<PortDirection>,
    pub smart_hops_traversed: usize,
}

impl RouteInfo {
    pub fn new(vnet: usize, src_router: usize, dest_router: usize) -> Self {
        Self {
            vnet,
            net_dest: NetDest::single(dest_router),
            src_router,
            dest_router,
            x_hops_remaining: 0,
            y_hops_remaining: 0,
            outport_dirn: None,
            smart_hops_traversed: 0,
        }
    }
}

/// Identity of a flit; reservations refer to flits only through this.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FlitKey {
    pub packet: PacketId,
    pub id: usize,
}

impl fmt::Display for FlitKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.packet, self.id)
    }
}

/// Memory contents carried by a flit, target of functional writes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Payload {
    pub addr: u64,
    pub data: u64,
}

#[derive(Clone, Debug)]
pub struct Flit {
    packet: PacketId,
    id: usize,
    flit_type: FlitType,
    vnet: usize,
    vc: usize,
    route: RouteInfo,
    outport: usize,
    stage: (FlitStage, Cycle),
    /// Cycle at which the flit becomes visible to its current holder.
    time: Cycle,
    hops: usize,
    enqueue_time: Cycle,
    payload: Option<Payload>,
}

impl Flit {
    pub fn new(
        packet: PacketId,
        id: usize,
        flit_type: FlitType,
        vc: usize,
        route: RouteInfo,
        payload: Option<Payload>,
        now: Cycle,
    ) -> Self {
        Self {
            packet,
            id,
            flit_type,
            vnet: route.vnet,
            vc,
            route,
            outport: 0,
            stage: (FlitStage::Invalid, now),
            time: now,
            hops: 0,
            enqueue_time: now,
            payload,
        }
    }

    pub fn key(&self) -> FlitKey {
        FlitKey {
            packet: self.packet,
            id: self.id,
        }
    }

    pub fn packet(&self) -> PacketId {
        self.packet
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn flit_type(&self) -> FlitType {
        self.flit_type
    }

    pub fn vnet(&self) -> usize {
        self.vnet
    }

    pub fn vc(&self) -> usize {
        self.vc
    }

    pub fn set_vc(&mut self, vc: usize) {
        self.vc = vc;
    }

    pub fn route(&self) -> &RouteInfo {
        &self.route
    }

    pub fn route_mut(&mut self) -> &mut RouteInfo {
        &mut self.route
    }

    pub fn outport(&self) -> usize {
        self.outport
    }

    pub fn set_outport(&mut self, outport: usize) {
        self.outport = outport;
    }

    pub fn stage(&self) -> (FlitStage, Cycle) {
        self.stage
    }

    pub fn advance_stage(&mut self, stage: FlitStage, time: Cycle) {
        self.stage = (stage, time);
    }

    /// True when the flit sits in `stage` and that stage started by `now`.
    pub fn is_stage(&self, stage: FlitStage, now: Cycle) -> bool {
        self.stage.0 == stage && self.stage.1 <= now
    }

    pub fn time(&self) -> Cycle {
        self.time
    }

    pub fn set_time(&mut self, time: Cycle) {
        self.time = time;
    }

    pub fn hops(&self) -> usize {
        self.hops
    }

    pub fn increment_hops(&mut self) {
        self.hops += 1;
    }

    pub fn enqueue_time(&self) -> Cycle {
        self.enqueue_time
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Overlays `update` if the flit carries the same address.
    pub fn functional_write(&mut self, update: &Payload) -> bool {
        match self.payload.as_mut() {
            Some(payload) if payload.addr == update.addr => {
                payload.data = update.data;
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for Flit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[flit {} {:?} vnet {} vc {} dest {} outport {} stage {:?}@{} time {}]",
            self.key(),
            self.flit_type,
            self.vnet,
            self.vc,
            self.route.net_dest,
            self.outport,
            self.stage.0,
            self.stage.1,
            self.time
        )
    }
}
