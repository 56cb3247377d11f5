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

use crate::flit::{Flit, FlitKey, FlitStage, FlitType, Payload, RouteInfo};
use crate::output_unit::OutputUnit;
use crate::Cycle;

/// A flit that crossed the switch this cycle.
#[derive(Clone, Debug)]
pub struct Traversal {
    pub outport: usize,
    pub flit: FlitKey,
    pub flit_type: FlitType,
    pub route: RouteInfo,
}

/// Moves switch allocation winners from input ports to output units.
#[derive(Clone, Debug)]
pub struct CrossbarSwitch {
    winners: Vec<Option<Flit>>,
    activity: u64,
}

impl CrossbarSwitch {
    pub fn new() -> Self {
        Self {
            winners: vec![],
            activity: 0,
        }
    }

    pub fn add_inport(&mut self) {
        self.winners.push(None);
    }

    pub fn update_sw_winner(&mut self, inport: usize, flit: Flit) {
        self.winners[inport] = Some(flit);
    }

    pub fn wakeup(&mut self, output_units: &mut [OutputUnit], now: Cycle) -> Vec<Traversal> {
        let mut traversals = vec![];
        for slot in self.winners.iter_mut() {
            let ready = slot
                .as_ref()
                .map_or(false, |flit| flit.is_stage(FlitStage::SwitchTraversal, now));
            if !ready {
                continue;
            }
            if let Some(mut flit) = slot.take() {
                flit.increment_hops();
                let outport = flit.outport();
                traversals.push(Traversal {
                    outport,
                    flit: flit.key(),
                    flit_type: flit.flit_type(),
                    route: flit.route().clone(),
                });
                output_units[outport].insert_flit(flit, now);
                self.activity += 1;
            }
        }
        traversals
    }

    pub fn activity(&self) -> u64 {
        self.activity
    }

    pub fn reset_stats(&mut self) {
        self.activity = 0;
    }

    pub fn functional_write(&mut self, update: &Payload) -> u32 {
        self.winners
            .iter_mut()
            .flatten()
            .map(|flit| flit.functional_write(update) as u32)
            .sum()
    }
}

impl Default for CrossbarSwitch {
    fn default() -> Self {
        Self::new()
    }
}
