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

use crate::config::RoutingAlgorithm;
use crate::error::Error;
use crate::flit::{NetDest, PortDirection, RouteInfo};
use crate::topology::{mesh_coords, mesh_neighbour};
use std::collections::BTreeMap;

/// Route computation for one router.
///
/// The router registers its ports with the unit as they are created and then
/// treats it as the only authority on outport decisions.
pub trait RoutingUnit {
    fn add_in_direction(&mut self, dirn: PortDirection, inport: usize);
    fn add_out_direction(&mut self, dirn: PortDirection, outport: usize);
    /// Routing table entry of the next outport, one destination set per vnet.
    fn add_route(&mut self, entry: Vec<NetDest>);
    fn add_weight(&mut self, weight: usize);

    /// Chooses the outport for `route` and records the chosen direction in it.
    fn outport_compute(
        &self,
        route: &mut RouteInfo,
        inport: usize,
        inport_dirn: PortDirection,
    ) -> Result<usize, Error>;

    fn inport_idx(&self, dirn: PortDirection) -> Result<usize, Error>;
    fn outport_idx(&self, dirn: PortDirection) -> Result<usize, Error>;
    fn lookup_routing_table(&self, vnet: usize, dest: &NetDest) -> Result<usize, Error>;

    /// Predicts the direction the router reached through `outport_dirn` will
    /// pick for `route`. `None` when the algorithm cannot tell.
    fn next_hop_direction(
        &self,
        _route: &RouteInfo,
        _outport_dirn: PortDirection,
    ) -> Option<PortDirection> {
        None
    }
}

/// Routing on a 2D mesh, either table driven or dimension ordered.
#[derive(Clone, Debug)]
pub struct MeshRoutingUnit {
    router: usize,
    rows: usize,
    cols: usize,
    algorithm: RoutingAlgorithm,
    /// Indexed by outport, then vnet.
    routing_table: Vec<Vec<NetDest>>,
    weights: Vec<usize>,
    inports: BTreeMap<PortDirection, usize>,
    outports: BTreeMap<PortDirection, usize>,
}

impl MeshRoutingUnit {
    pub fn new(router: usize, rows: usize, cols: usize, algorithm: RoutingAlgorithm) -> Self {
        Self {
            router,
            rows,
            cols,
            algorithm,
            routing_table: vec![],
            weights: vec![],
            inports: BTreeMap::new(),
            outports: BTreeMap::new(),
        }
    }

    /// X first, then Y. Also leaves the remaining hop counts in `route`.
    fn xy_direction(&self, from: usize, route: &mut RouteInfo) -> PortDirection {
        let (x, y) = mesh_coords(self.cols, from);
        let (dest_x, dest_y) = mesh_coords(self.cols, route.dest_router);
        let x_hops = if dest_x > x { dest_x - x } else { x - dest_x };
        let y_hops = if dest_y > y { dest_y - y } else { y - dest_y };
        if x_hops > 0 {
            route.x_hops_remaining = x_hops - 1;
            route.y_hops_remaining = y_hops;
            if dest_x > x {
                PortDirection::East
            } else {
                PortDirection::West
            }
        } else if y_hops > 0 {
            route.x_hops_remaining = 0;
            route.y_hops_remaining = y_hops - 1;
            if dest_y > y {
                PortDirection::North
            } else {
                PortDirection::South
            }
        } else {
            PortDirection::Local
        }
    }
}

impl RoutingUnit for MeshRoutingUnit {
    fn add_in_direction(&mut self, dirn: PortDirection, inport: usize) {
        self.inports.insert(dirn, inport);
    }

    fn add_out_direction(&mut self, dirn: PortDirection, outport: usize) {
        self.outports.insert(dirn, outport);
    }

    fn add_route(&mut self, entry: Vec<NetDest>) {
        self.routing_table.push(entry);
    }

    fn add_weight(&mut self, weight: usize) {
        self.weights.push(weight);
    }

    fn outport_compute(
        &self,
        route: &mut RouteInfo,
        _inport: usize,
        inport_dirn: PortDirection,
    ) -> Result<usize, Error> {
        let outport = if route.dest_router == self.router {
            self.lookup_routing_table(route.vnet, &route.net_dest)?
        } else {
            match self.algorithm {
                RoutingAlgorithm::Table => {
                    self.lookup_routing_table(route.vnet, &route.net_dest)?
                }
                RoutingAlgorithm::Xy => {
                    let dirn = self.xy_direction(self.router, route);
                    if dirn == inport_dirn && dirn != PortDirection::Local {
                        log::warn!(
                            "router {}: XY route for {} leaves through its inport {}",
                            self.router,
                            route.net_dest,
                            dirn
                        );
                    }
                    self.outport_idx(dirn)?
                }
            }
        };
        route.outport_dirn = self
            .outports
            .iter()
            .find(|(_, idx)| **idx == outport)
            .map(|(dirn, _)| *dirn);
        Ok(outport)
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

    /// Lowest weight outport reaching `dest`, lowest index on ties.
    fn lookup_routing_table(&self, vnet: usize, dest: &NetDest) -> Result<usize, Error> {
        self.routing_table
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.get(vnet).map_or(false, |d| d.intersects(dest)))
            .min_by_key(|(outport, _)| (self.weights.get(*outport).copied().unwrap_or(usize::MAX), *outport))
            .map(|(outport, _)| outport)
            .ok_or(Error::NoRoute {
                router: self.router,
                vnet,
            })
    }

    fn next_hop_direction(
        &self,
        route: &RouteInfo,
        outport_dirn: PortDirection,
    ) -> Option<PortDirection> {
        let next = mesh_neighbour(self.rows, self.cols, self.router, outport_dirn)?;
        if next == route.dest_router {
            return Some(PortDirection::Local);
        }
        match self.algorithm {
            RoutingAlgorithm::Xy => {
                let mut scratch = route.clone();
                Some(self.xy_direction(next, &mut scratch))
            }
            RoutingAlgorithm::Table => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Router 4 in the middle of a 3x3 mesh.
    fn center(algorithm: RoutingAlgorithm) -> MeshRoutingUnit {
        let mut unit = MeshRoutingUnit::new(4, 3, 3, algorithm);
        let entries: Vec<(PortDirection, Vec<usize>)> = vec![
            (PortDirection::Local, vec![4]),
            (PortDirection::North, vec![6, 7, 8]),
            (PortDirection::East, vec![2, 5, 8]),
            (PortDirection::South, vec![0, 1, 2]),
            (PortDirection::West, vec![0, 3, 6]),
        ];
        for (outport, (dirn, dests)) in entries.into_iter().enumerate() {
            let mut dest = NetDest::new();
            dests.into_iter().for_each(|d| dest.add(d));
            unit.add_route(vec![dest]);
            unit.add_weight(1);
            unit.add_out_direction(dirn, outport);
            unit.add_in_direction(dirn, outport);
        }
        unit
    }

    #[test]
    fn xy_goes_east_west_first() {
        let unit = center(RoutingAlgorithm::Xy);
        let mut route = RouteInfo::new(0, 4, 8);
        let outport = unit
            .outport_compute(&mut route, 0, PortDirection::Local)
            .unwrap();
        assert_eq!(outport, unit.outport_idx(PortDirection::East).unwrap());
        assert_eq!(route.outport_dirn, Some(PortDirection::East));
        assert_eq!((route.x_hops_remaining, route.y_hops_remaining), (0, 1));

        let mut route = RouteInfo::new(0, 4, 1);
        let outport = unit
            .outport_compute(&mut route, 0, PortDirection::Local)
            .unwrap();
        assert_eq!(outport, unit.outport_idx(PortDirection::South).unwrap());
    }

    #[test]
    fn destination_uses_table() {
        let unit = center(RoutingAlgorithm::Xy);
        let mut route = RouteInfo::new(0, 0, 4);
        let outport = unit
            .outport_compute(&mut route, 4, PortDirection::West)
            .unwrap();
        assert_eq!(outport, 0);
        assert_eq!(route.outport_dirn, Some(PortDirection::Local));
    }

    #[test]
    fn table_ties_break_to_lowest_index() {
        let unit = center(RoutingAlgorithm::Table);
        // 8 is reachable through North (1) and East (2).
        assert_eq!(unit.lookup_routing_table(0, &NetDest::single(8)), Ok(1));
        assert_eq!(
            unit.lookup_routing_table(1, &NetDest::single(8)),
            Err(Error::NoRoute { router: 4, vnet: 1 })
        );
    }

    #[test]
    fn predicts_next_hop() {
        let unit = center(RoutingAlgorithm::Xy);
        let route = RouteInfo::new(0, 3, 5);
        assert_eq!(
            unit.next_hop_direction(&route, PortDirection::East),
            Some(PortDirection::Local)
        );
        let route = RouteInfo::new(0, 3, 8);
        // 5 turns north towards 8.
        assert_eq!(
            unit.next_hop_direction(&route, PortDirection::East),
            Some(PortDirection::North)
        );
        assert_eq!(
            center(RoutingAlgorithm::Table).next_hop_direction(&route, PortDirection::East),
            None
        );
    }
}
