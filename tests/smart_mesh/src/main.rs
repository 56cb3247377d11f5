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

//! Drives a mesh with a fixed traffic pattern and reports its statistics.
//!
//! Usage: `smart_mesh [config.yaml]`. Without a file, a 4x4 mesh with
//! SMART and destination bypass enabled is used.

use anyhow::{bail, Context};
use noc::Network;
use noc::NetworkConfiguration;
use noc::SmartConfiguration;

const ROUNDS: usize = 8;
const CYCLE_LIMIT: usize = 100_000;

fn default_config() -> NetworkConfiguration {
    NetworkConfiguration {
        smart: SmartConfiguration {
            enabled: true,
            dest_bypass: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Every router sends to a rotating partner; every fourth round uses
/// multi-flit packets.
fn inject_pattern(network: &mut Network) -> anyhow::Result<u64> {
    let num_routers = network.num_routers();
    let mut packets = 0;
    for round in 0..ROUNDS {
        for src in 0..num_routers {
            let dest = (src + round + 1) % num_routers;
            let num_flits = if round % 4 == 3 { 4 } else { 1 };
            network
                .inject(src, dest, 0, num_flits, round * 2)
                .with_context(|| format!("injecting {} -> {}", src, dest))?;
            packets += 1;
        }
    }
    Ok(packets)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let config = match std::env::args().nth(1) {
        Some(file_name) => NetworkConfiguration::from_file(&file_name)?,
        None => default_config(),
    };
    let mut network = Network::new(&config).context("building network")?;
    let packets = inject_pattern(&mut network)?;
    let last = network
        .run_to_completion(CYCLE_LIMIT)
        .context("simulation failed")?;

    let stats = network.stats();
    if stats.packets_ejected != packets {
        bail!(
            "only {} of {} packets delivered by cycle {}",
            stats.packets_ejected,
            packets,
            last
        );
    }
    log::info!(
        "{} packets in {} cycles, average latency {:.2}, {} bypasses",
        packets,
        last,
        stats.average_packet_latency(),
        stats.smart_bypasses
    );
    print!("{}", serde_yaml::to_string(&stats)?);
    Ok(())
}
