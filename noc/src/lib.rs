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

//! Cycle-level model of a SMART network-on-chip router.
//!
//! Routers move flits through virtual channels under credit-based flow
//! control and may let single-flit packets skip the buffers of downstream
//! routers through one-cycle-ahead reservations.

mod config;
mod credit;
mod crossbar;
mod error;
mod event;
mod flit;
mod input_unit;
mod link;
mod network;
mod network_interface;
mod out_vc_state;
mod output_unit;
mod router;
mod routing;
mod ssr;
mod stats;
mod switch_allocator;
mod topology;
mod vc;
mod vcd;

// type to use for cycles
pub type Cycle = usize;

pub use crate::config::{
    NetworkConfiguration, RouterConfiguration, RoutingAlgorithm, SmartConfiguration, SmartPriority,
};
pub use crate::credit::Credit;
pub use crate::crossbar::{CrossbarSwitch, Traversal};
pub use crate::error::Error;
pub use crate::event::{EventQueue, Target};
pub use crate::flit::{
    Flit, FlitKey, FlitStage, FlitType, NetDest, PacketId, Payload, PortDirection, RouteInfo,
};
pub use crate::input_unit::{IngressOutcome, InputUnit, SmartGrant};
pub use crate::link::{CreditBuffer, CreditLink, FlitBuffer, Link, NetworkLink, Timed, TimedBuffer};
pub use crate::network::Network;
pub use crate::network_interface::NetworkInterface;
pub use crate::out_vc_state::OutVcState;
pub use crate::output_unit::OutputUnit;
pub use crate::router::Router;
pub use crate::routing::{MeshRoutingUnit, RoutingUnit};
pub use crate::ssr::{Ssr, SsrQueue};
pub use crate::stats::{NetworkStats, RouterStats};
pub use crate::switch_allocator::{SeparableAllocator, SwitchAllocator};
pub use crate::topology::{mesh_coords, mesh_neighbour, Channel, Topology};
pub use crate::vc::{VcState, VirtualChannel};
pub use crate::vcd::{VcdComponent, VcdWriter};
