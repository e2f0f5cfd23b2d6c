use crate::{
    error::{McnfError, Result},
    sparse::SparseVec,
    types::{Network, VertexId},
};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap, HashMap};

/// Vertex queued with its tentative distance; ordering is reversed so the
/// std max-heap pops the smallest distance first.
#[derive(Debug, Copy, Clone)]
struct CostNode {
    dist: f64,
    vertex: usize,
}

impl PartialEq for CostNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for CostNode {}

impl PartialOrd for CostNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for CostNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist
            .total_cmp(&self.dist)
            .then_with(|| other.vertex.cmp(&self.vertex))
    }
}

/// Shortest-path tree for one origin: tentative distances and the arc used to
/// reach each vertex.
#[derive(Debug, Clone)]
struct SpTree {
    dist: Vec<f64>,
    parent: Vec<Option<usize>>,
}

impl SpTree {
    fn new(vertices: usize) -> Self {
        Self {
            dist: vec![f64::INFINITY; vertices],
            parent: vec![None; vertices],
        }
    }

    fn reset(&mut self) {
        self.dist.fill(f64::INFINITY);
        self.parent.fill(None);
    }
}

/// All-or-nothing flow oracle: one directed graph with mutable per-arc costs.
///
/// `get_flows` routes every commodity's full demand along its current
/// shortest origin-destination path. Commodities sharing an origin reuse a
/// single Dijkstra tree.
pub struct ShortestPathOracle {
    vertices: usize,
    commodities: usize,
    demands: Vec<f64>,
    endpoints: Vec<(VertexId, VertexId)>,
    /// Outgoing arcs per vertex as `(arc index, target vertex)`.
    adjacency: Vec<Vec<(usize, VertexId)>>,
    costs: Vec<f64>,
    /// First arc for each `(head, tail)` pair; parallel arcs resolve to the
    /// lowest index.
    by_endpoints: HashMap<(VertexId, VertexId), usize>,
    /// Commodities grouped by origin, ascending commodity order inside each.
    origin_groups: Vec<(VertexId, Vec<usize>)>,
    destinations: Vec<VertexId>,
    scratch: SpTree,
}

impl ShortestPathOracle {
    pub fn new(network: &Network) -> Self {
        let vertices = network.num_vertices();
        let mut adjacency = vec![Vec::new(); vertices];
        let mut by_endpoints = HashMap::new();
        let mut endpoints = Vec::with_capacity(network.num_arcs());
        for (a, arc) in network.arcs().iter().enumerate() {
            adjacency[arc.head].push((a, arc.tail));
            by_endpoints.entry((arc.head, arc.tail)).or_insert(a);
            endpoints.push((arc.head, arc.tail));
        }

        let mut groups: BTreeMap<VertexId, Vec<usize>> = BTreeMap::new();
        for (k, commodity) in network.commodities().iter().enumerate() {
            groups.entry(commodity.origin).or_default().push(k);
        }

        Self {
            vertices,
            commodities: network.num_commodities(),
            demands: network.commodities().iter().map(|c| c.demand).collect(),
            endpoints,
            adjacency,
            costs: vec![0.0; network.num_arcs()],
            by_endpoints,
            origin_groups: groups.into_iter().collect(),
            destinations: network
                .commodities()
                .iter()
                .map(|c| c.destination)
                .collect(),
            scratch: SpTree::new(vertices),
        }
    }

    /// Set the cost of the arc identified by its endpoints. With parallel
    /// arcs this addresses the lowest-indexed one; prefer [`set_arc_cost`]
    /// when arc indices are at hand.
    ///
    /// [`set_arc_cost`]: Self::set_arc_cost
    pub fn set_cost(&mut self, head: VertexId, tail: VertexId, cost: f64) -> Result<()> {
        let arc = *self
            .by_endpoints
            .get(&(head, tail))
            .ok_or(McnfError::UnknownArc { head, tail })?;
        self.set_arc_cost(arc, cost);
        Ok(())
    }

    /// Set the cost of the arc at `index`. Negative costs are illegal.
    pub fn set_arc_cost(&mut self, index: usize, cost: f64) {
        assert!(cost >= 0.0, "negative arc cost {cost} on arc {index}");
        self.costs[index] = cost;
    }

    /// Revert all arc costs to zero.
    pub fn reset_cost(&mut self) {
        self.costs.fill(0.0);
    }

    /// Route every commodity along its current shortest path, accumulating
    /// `demand(k)` onto `out[a*K + k]` for each arc `a` of the path.
    ///
    /// `parsimonious` reuses one shared tree buffer across origins instead of
    /// allocating per-origin storage (and forgoes the parallel fan-out).
    pub fn get_flows(&mut self, out: &mut SparseVec, parsimonious: bool) -> Result<()> {
        assert_eq!(
            out.len(),
            self.endpoints.len() * self.commodities,
            "output dimension mismatch"
        );
        let mut entries = Vec::new();

        if parsimonious {
            let mut tree = std::mem::replace(&mut self.scratch, SpTree::new(0));
            for gi in 0..self.origin_groups.len() {
                let (origin, _) = self.origin_groups[gi];
                tree.reset();
                self.build_tree(origin, &mut tree);
                let result = self.route_group(gi, &tree, &mut entries);
                if let Err(e) = result {
                    self.scratch = tree;
                    return Err(e);
                }
            }
            self.scratch = tree;
        } else {
            let trees: Vec<SpTree> = self
                .origin_groups
                .par_iter()
                .map(|&(origin, _)| {
                    let mut tree = SpTree::new(self.vertices);
                    self.build_tree(origin, &mut tree);
                    tree
                })
                .collect();
            for (gi, tree) in trees.iter().enumerate() {
                self.route_group(gi, tree, &mut entries)?;
            }
        }

        out.add_assign(&SparseVec::from_entries(out.len(), entries));
        Ok(())
    }

    fn build_tree(&self, origin: VertexId, tree: &mut SpTree) {
        tree.dist[origin] = 0.0;
        let mut heap = BinaryHeap::new();
        heap.push(CostNode {
            dist: 0.0,
            vertex: origin,
        });
        while let Some(CostNode { dist, vertex }) = heap.pop() {
            if dist > tree.dist[vertex] {
                continue;
            }
            for &(arc, to) in &self.adjacency[vertex] {
                let next = dist + self.costs[arc];
                if next < tree.dist[to] {
                    tree.dist[to] = next;
                    tree.parent[to] = Some(arc);
                    heap.push(CostNode {
                        dist: next,
                        vertex: to,
                    });
                }
            }
        }
    }

    fn route_group(
        &self,
        group: usize,
        tree: &SpTree,
        entries: &mut Vec<(usize, f64)>,
    ) -> Result<()> {
        let (origin, ks) = &self.origin_groups[group];
        let origin = *origin;
        for &k in ks {
            let destination = self.destinations[k];
            if tree.dist[destination].is_infinite() {
                return Err(McnfError::InfeasibleCommodity { commodity: k });
            }
            let demand = self.demands[k];
            let mut vertex = destination;
            while vertex != origin {
                let arc = tree.parent[vertex].expect("tree path broken");
                entries.push((arc * self.commodities + k, demand));
                vertex = self.endpoints[arc].0;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arc, Commodity};

    /// Diamond: 0 -> 1 -> 3 and 0 -> 2 -> 3, plus a direct 0 -> 3.
    fn diamond(demand: f64) -> Network {
        Network::new(
            4,
            vec![
                Arc::new(0, 1, 1.0, 10.0),
                Arc::new(1, 3, 1.0, 10.0),
                Arc::new(0, 2, 1.0, 10.0),
                Arc::new(2, 3, 1.0, 10.0),
                Arc::new(0, 3, 5.0, 10.0),
            ],
            vec![Commodity::new(0, 3, demand)],
        )
        .unwrap()
    }

    fn load_linear_costs(oracle: &mut ShortestPathOracle, network: &Network) {
        for (a, arc) in network.arcs().iter().enumerate() {
            oracle.set_arc_cost(a, arc.cost);
        }
    }

    #[test]
    fn test_routes_along_cheapest_path() {
        let net = diamond(2.0);
        let mut oracle = ShortestPathOracle::new(&net);
        load_linear_costs(&mut oracle, &net);
        let mut out = SparseVec::new(net.flow_len());
        oracle.get_flows(&mut out, false).unwrap();
        // 0 -> 1 -> 3 ties 0 -> 2 -> 3 at cost 2; a single path carries all.
        let total: f64 = out.iter().map(|(_, v)| v).sum();
        assert_eq!(total, 4.0, "path of two arcs carries the demand");
        assert_eq!(out.get(4), 0.0, "direct arc of cost 5 stays empty");
    }

    #[test]
    fn test_flow_cost_matches_shortest_distance() {
        let net = diamond(3.0);
        let mut oracle = ShortestPathOracle::new(&net);
        load_linear_costs(&mut oracle, &net);
        let mut out = SparseVec::new(net.flow_len());
        oracle.get_flows(&mut out, false).unwrap();
        let cost: f64 = out
            .iter()
            .map(|(i, v)| net.arcs()[i / net.num_commodities()].cost * v)
            .sum();
        assert_eq!(cost, 3.0 * 2.0, "total cost equals demand times distance");
    }

    #[test]
    fn test_parsimonious_matches_parallel() {
        let net = Network::new(
            4,
            vec![
                Arc::new(0, 1, 1.0, 10.0),
                Arc::new(1, 3, 1.0, 10.0),
                Arc::new(2, 1, 1.0, 10.0),
                Arc::new(0, 3, 4.0, 10.0),
            ],
            vec![
                Commodity::new(0, 3, 1.0),
                Commodity::new(2, 3, 2.0),
                Commodity::new(0, 1, 0.5),
            ],
        )
        .unwrap();
        let mut oracle = ShortestPathOracle::new(&net);
        load_linear_costs(&mut oracle, &net);
        let mut fast = SparseVec::new(net.flow_len());
        oracle.get_flows(&mut fast, false).unwrap();
        let mut lean = SparseVec::new(net.flow_len());
        oracle.get_flows(&mut lean, true).unwrap();
        assert_eq!(fast, lean);
    }

    #[test]
    fn test_unreachable_destination_fails() {
        let net = Network::new(
            3,
            vec![Arc::new(0, 1, 1.0, 10.0)],
            vec![Commodity::new(0, 2, 1.0)],
        )
        .unwrap();
        let mut oracle = ShortestPathOracle::new(&net);
        load_linear_costs(&mut oracle, &net);
        let mut out = SparseVec::new(net.flow_len());
        let err = oracle.get_flows(&mut out, false).unwrap_err();
        assert!(matches!(
            err,
            McnfError::InfeasibleCommodity { commodity: 0 }
        ));
    }

    #[test]
    fn test_cost_update_redirects_flow() {
        let net = diamond(1.0);
        let mut oracle = ShortestPathOracle::new(&net);
        load_linear_costs(&mut oracle, &net);
        // Make both two-arc routes expensive; the direct arc wins.
        oracle.set_cost(0, 1, 10.0).unwrap();
        oracle.set_cost(0, 2, 10.0).unwrap();
        let mut out = SparseVec::new(net.flow_len());
        oracle.get_flows(&mut out, false).unwrap();
        assert_eq!(out.get(4), 1.0);
    }

    #[test]
    fn test_unknown_arc_rejected() {
        let net = diamond(1.0);
        let mut oracle = ShortestPathOracle::new(&net);
        let err = oracle.set_cost(3, 0, 1.0).unwrap_err();
        assert!(matches!(err, McnfError::UnknownArc { head: 3, tail: 0 }));
    }

    #[test]
    fn test_reset_cost_zeroes() {
        let net = diamond(1.0);
        let mut oracle = ShortestPathOracle::new(&net);
        load_linear_costs(&mut oracle, &net);
        oracle.reset_cost();
        let mut out = SparseVec::new(net.flow_len());
        oracle.get_flows(&mut out, false).unwrap();
        // All costs zero: any path is shortest; demand still fully routed.
        let routed: f64 = out.iter().map(|(_, v)| v).sum();
        assert!(routed >= 1.0);
    }
}
