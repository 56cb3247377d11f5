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

use std::fmt;

use crate::flit::{PacketId, PortDirection};

/// Errors raised by the router core.
///
/// Everything but `InvalidConfiguration` is a protocol violation and aborts
/// the simulation; stalls are never reported through this type.
#[derive(Debug, Eq, PartialEq)]
pub enum Error {
    /// A HEAD/HEAD_TAIL flit targeted a VC that still holds a packet.
    HeadOnBusyVc {
        router: usize,
        inport: usize,
        vc: usize,
    },
    /// A BODY/TAIL flit with no matching packet in flight on its port.
    OrphanFlit {
        router: usize,
        inport: usize,
        packet: PacketId,
        flit: usize,
    },
    /// A BODY/TAIL flit was buffered into a VC that is not active.
    InactiveVc {
        router: usize,
        inport: usize,
        vc: usize,
    },
    /// Re-validating a bypass produced a different outport.
    RouteMismatch {
        router: usize,
        expected: usize,
        computed: usize,
    },
    /// The input VC vacated by a bypassing flit was busy or still had flits.
    BypassVcNotIdle {
        router: usize,
        inport: usize,
        vc: usize,
    },
    /// A bypass reached VC selection without a free VC to claim.
    NoFreeVc {
        router: usize,
        outport: usize,
    },
    CreditUnderflow {
        vc: usize,
    },
    CreditOverflow {
        vc: usize,
    },
    UnknownDirection(PortDirection),
    NoRoute {
        router: usize,
        vnet: usize,
    },
    InvalidNode(usize),
    InvalidPort(usize),
    InvalidVc(usize),
    InvalidVnet(usize),
    EmptyPacket,
    InvalidConfiguration(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::HeadOnBusyVc { router, inport, vc } => write!(
                f,
                "ERROR: head flit on busy vc {} at router {} inport {}",
                vc, router, inport
            ),
            Self::OrphanFlit {
                router,
                inport,
                packet,
                flit,
            } => write!(
                f,
                "ERROR: flit {}.{} without a head at router {} inport {}",
                packet, flit, router, inport
            ),
            Self::InactiveVc { router, inport, vc } => write!(
                f,
                "ERROR: body flit on inactive vc {} at router {} inport {}",
                vc, router, inport
            ),
            Self::RouteMismatch {
                router,
                expected,
                computed,
            } => write!(
                f,
                "ERROR: bypass route mismatch at router {}: reserved outport {}, computed {}",
                router, expected, computed
            ),
            Self::BypassVcNotIdle { router, inport, vc } => write!(
                f,
                "ERROR: bypass vacated busy vc {} at router {} inport {}",
                vc, router, inport
            ),
            Self::UnknownDirection(dirn) => write!(f, "ERROR: unknown port direction {}", dirn),
            Self::NoRoute { router, vnet } => {
                write!(f, "ERROR: no route at router {} for vnet {}", router, vnet)
            }
            Self::InvalidConfiguration(msg) => write!(f, "ERROR: invalid configuration: {}", msg),
            _ => write!(f, "{:?}", self),
        }
    }
}

// Lets `anyhow::Result` carry our errors in binaries and tests.
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
