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

use serde::Serialize;

/// Activity counters of one router.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RouterStats {
    pub router: usize,
    /// Per virtual network.
    pub buffer_reads: Vec<u64>,
    pub buffer_writes: Vec<u64>,
    pub crossbar_activity: u64,
    pub sw_input_arbiter_activity: u64,
    pub sw_output_arbiter_activity: u64,
    pub smart_bypasses: u64,
    pub ingress_stalls: u64,
}

impl RouterStats {
    pub fn total_buffer_reads(&self) -> u64 {
        self.buffer_reads.iter().sum()
    }

    pub fn total_buffer_writes(&self) -> u64 {
        self.buffer_writes.iter().sum()
    }
}

/// Whole-network summary.
#[derive(Clone, Debug, Default, Serialize)]
pub struct NetworkStats {
    pub cycles: usize,
    pub packets_injected: u64,
    pub flits_injected: u64,
    pub flits_ejected: u64,
    pub packets_ejected: u64,
    /// Sum over ejected packets of ejection cycle minus injection cycle.
    pub total_packet_latency: u64,
    pub total_hops: u64,
    pub smart_bypasses: u64,
    pub ingress_stalls: u64,
    pub routers: Vec<RouterStats>,
}

impl NetworkStats {
    pub fn average_packet_latency(&self) -> f64 {
        if self.packets_ejected == 0 {
            0.0
        } else {
            self.total_packet_latency as f64 / self.packets_ejected as f64
        }
    }
}
