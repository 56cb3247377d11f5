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

//! Mesh topology and the routing tables derived from it.

use crate::flit::{NetDest, PortDirection};
use crate::Cycle;
use petgraph::algo::dijkstra;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

/// Column and row of `router`; router ids grow along a row first.
pub fn mesh_coords(cols: usize, router: usize) -> (usize, usize) {
    (router % cols, router / cols)
}

/// Router reached by leaving `router` through `dirn`, if any.
pub fn mesh_neighbour(
    rows: usize,
    cols: usize,
    router: usize,
    dirn: PortDirection,
) -> Option<usize> {
    let (x, y) = mesh_coords(cols, router);
    match dirn {
        PortDirection::Local => None,
        PortDirection::East if x + 1 < cols => Some(router + 1),
        PortDirection::West if x > 0 => Some(router - 1),
        PortDirection::North if y + 1 < rows => Some(router + cols),
        PortDirection::South if y > 0 => Some(router - cols),
        _ => None,
    }
}

/// A unidirectional router to router link.
#[derive(Clone, Debug)]
pub struct Channel {
    pub src_outport_dirn: PortDirection,
    pub dst_inport_dirn: PortDirection,
    pub latency: Cycle,
    pub weight: usize,
}

#[derive(Clone, Debug)]
pub struct Topology {
    rows: usize,
    cols: usize,
    graph: DiGraph<usize, Channel>,
    /// Shortest distances, indexed by source router.
    distances: Vec<HashMap<NodeIndex, usize>>,
}

impl Topology {
    pub fn mesh(rows: usize, cols: usize, link_latency: Cycle) -> Self {
        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..rows * cols).map(|r| graph.add_node(r)).collect();
        for router in 0..rows * cols {
            for dirn in PortDirection::ALL.iter().skip(1) {
                if let Some(next) = mesh_neighbour(rows, cols, router, *dirn) {
                    graph.add_edge(
                        nodes[router],
                        nodes[next],
                        Channel {
                            src_outport_dirn: *dirn,
                            dst_inport_dirn: dirn.opposite(),
                            latency: link_latency,
                            weight: 1,
                        },
                    );
                }
            }
        }
        let distances = nodes
            .iter()
            .map(|n| dijkstra(&graph, *n, None, |e| e.weight().weight))
            .collect();
        log::debug!(
            "mesh {}x{}: {} routers, {} links",
            rows,
            cols,
            graph.node_count(),
            graph.edge_count()
        );
        Self {
            rows,
            cols,
            graph,
            distances,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn num_routers(&self) -> usize {
        self.graph.node_count()
    }

    /// Outgoing links of `router` as `(neighbour, channel)`, in direction order.
    pub fn links_from(&self, router: usize) -> Vec<(usize, &Channel)> {
        let mut links: Vec<(usize, &Channel)> = self
            .graph
            .edges(NodeIndex::new(router))
            .map(|e| (self.graph[e.target()], e.weight()))
            .collect();
        links.sort_by_key(|(_, channel)| channel.src_outport_dirn);
        links
    }

    pub fn distance(&self, from: usize, to: usize) -> Option<usize> {
        self.distances[from].get(&NodeIndex::new(to)).copied()
    }

    /// Destinations on a shortest path through `channel` out of `router`,
    /// replicated for each of the `vnets` virtual networks.
    pub fn routing_table_entry(&self, router: usize, next: usize, channel: &Channel, vnets: usize) -> Vec<NetDest> {
        let mut dest = NetDest::new();
        for target in 0..self.num_routers() {
            match (self.distance(router, target), self.distance(next, target)) {
                (Some(direct), Some(via)) if target != router && direct == via + channel.weight => {
                    dest.add(target)
                }
                _ => {}
            }
        }
        vec![dest; vnets]
    }

    /// The entry of a `Local` outport only covers the router itself.
    pub fn local_table_entry(&self, router: usize, vnets: usize) -> Vec<NetDest> {
        vec![NetDest::single(router); vnets]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_links_and_neighbours() {
        let topology = Topology::mesh(2, 3, 1);
        assert_eq!(topology.num_routers(), 6);
        // 2 rows of 2 horizontal links, 3 columns of 1 vertical link, both ways.
        assert_eq!(topology.graph.edge_count(), 2 * (2 * 2 + 3));
        assert_eq!(mesh_neighbour(2, 3, 0, PortDirection::West), None);
        assert_eq!(mesh_neighbour(2, 3, 0, PortDirection::North), Some(3));
        let dirns: Vec<PortDirection> = topology
            .links_from(4)
            .iter()
            .map(|(_, c)| c.src_outport_dirn)
            .collect();
        assert_eq!(
            dirns,
            vec![PortDirection::East, PortDirection::South, PortDirection::West]
        );
    }

    #[test]
    fn table_entries_follow_shortest_paths() {
        let topology = Topology::mesh(2, 2, 1);
        let (next, channel) = topology
            .links_from(0)
            .into_iter()
            .find(|(_, c)| c.src_outport_dirn == PortDirection::East)
            .unwrap();
        let entry = topology.routing_table_entry(0, next, channel, 2);
        assert_eq!(entry.len(), 2);
        assert!(entry[0].contains(1));
        assert!(entry[0].contains(3));
        assert!(!entry[0].contains(2));
        assert!(!entry[0].contains(0));
        assert_eq!(topology.distance(0, 3), Some(2));
    }
}
