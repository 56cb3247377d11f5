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

use crate::error::Error;
use crate::Cycle;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Parameters shared by every router of a network.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RouterConfiguration {
    /// Pipeline depth: cycles between buffering a flit and its switch
    /// allocation, plus one.
    pub latency: Cycle,
    pub virtual_networks: usize,
    pub vcs_per_vnet: usize,
    /// Flit slots per virtual channel; also the initial credit count.
    pub buffers_per_vc: usize,
}

impl RouterConfiguration {
    pub fn num_vcs(&self) -> usize {
        self.virtual_networks * self.vcs_per_vnet
    }
}

impl Default for RouterConfiguration {
    fn default() -> Self {
        Self {
            latency: 1,
            virtual_networks: 1,
            vcs_per_vnet: 4,
            buffers_per_vc: 4,
        }
    }
}

/// Who wins an output port when a bypass reservation and a locally
/// buffered flit want it in the same cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum SmartPriority {
    Local,
    Bypass,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SmartConfiguration {
    pub enabled: bool,
    /// Lets the destination router turn a reservation into a bypass to its
    /// local port.
    pub dest_bypass: bool,
    /// Longest chain of routers a reservation may reach.
    pub hpc_max: usize,
    pub priority: SmartPriority,
}

impl Default for SmartConfiguration {
    fn default() -> Self {
        Self {
            enabled: false,
            dest_bypass: false,
            hpc_max: 4,
            priority: SmartPriority::Local,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
pub enum RoutingAlgorithm {
    Table,
    Xy,
}

/// A rows x cols mesh of routers, one network interface per router.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NetworkConfiguration {
    pub rows: usize,
    pub cols: usize,
    pub link_latency: Cycle,
    pub routing_algorithm: RoutingAlgorithm,
    pub router: RouterConfiguration,
    pub smart: SmartConfiguration,
}

impl Default for NetworkConfiguration {
    fn default() -> Self {
        Self {
            rows: 4,
            cols: 4,
            link_latency: 1,
            routing_algorithm: RoutingAlgorithm::Xy,
            router: RouterConfiguration::default(),
            smart: SmartConfiguration::default(),
        }
    }
}

impl NetworkConfiguration {
    pub fn from_file(file_name: &str) -> anyhow::Result<Self> {
        let file = File::open(Path::new(file_name))
            .with_context(|| format!("File {} not found.", file_name))?;
        let reader = BufReader::new(file);
        serde_yaml::from_reader(reader)
            .with_context(|| format!("Failed to parse network configuration {}", file_name))
    }

    pub fn from_str(config: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(config).context("Failed to parse network configuration")
    }

    pub fn num_routers(&self) -> usize {
        self.rows * self.cols
    }

    pub fn validate(&self) -> Result<(), Error> {
        let invalid = |msg: &str| Err(Error::InvalidConfiguration(msg.to_string()));
        if self.rows == 0 || self.cols == 0 {
            return invalid("mesh must have at least one router");
        }
        if self.link_latency == 0 {
            return invalid("link latency must be at least one cycle");
        }
        if self.router.latency == 0 {
            return invalid("router pipeline depth must be at least one cycle");
        }
        if self.router.virtual_networks == 0 || self.router.vcs_per_vnet == 0 {
            return invalid("routers need at least one virtual channel per network");
        }
        if self.router.buffers_per_vc == 0 {
            return invalid("virtual channels need at least one buffer");
        }
        if self.smart.enabled && self.smart.hpc_max == 0 {
            return invalid("hpc_max must be positive when SMART is enabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_yaml_config() {
        let conf_str = "---
rows: 2
cols: 8
link_latency: 1
routing_algorithm: Table
router:
  latency: 3
  virtual_networks: 2
  vcs_per_vnet: 2
  buffers_per_vc: 4
smart:
  enabled: true
  dest_bypass: true
  hpc_max: 8
  priority: Bypass
";
        let config = NetworkConfiguration::from_str(conf_str).unwrap();
        assert_eq!(config.num_routers(), 16);
        assert_eq!(config.routing_algorithm, RoutingAlgorithm::Table);
        assert_eq!(config.router.num_vcs(), 4);
        assert_eq!(config.smart.priority, SmartPriority::Bypass);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn write_yaml_config() {
        let config = NetworkConfiguration::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back = NetworkConfiguration::from_str(&yaml).unwrap();
        assert_eq!(back.rows, config.rows);
        assert_eq!(back.smart.hpc_max, config.smart.hpc_max);
    }

    #[test]
    fn rejects_bad_configs() {
        let mut config = NetworkConfiguration::default();
        config.router.latency = 0;
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(NetworkConfiguration::from_str("rows: [").is_err());
        assert!(NetworkConfiguration::from_file("/nonexistent/noc.yaml").is_err());
    }
}
