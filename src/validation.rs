use crate::{sparse::SparseVec, types::Network};

/// Shared feasibility tolerance on conservation, non-negativity and capacity.
pub const FEASIBILITY_TOLERANCE: f64 = 1e-6;

/// Largest amount by which any entry drops below zero.
pub fn max_nonnegativity_violation(x: &SparseVec) -> f64 {
    x.iter().map(|(_, v)| (-v).max(0.0)).fold(0.0, f64::max)
}

/// Largest deviation from per-commodity flow conservation over all vertices.
pub fn max_conservation_violation(network: &Network, x: &SparseVec) -> f64 {
    let vertices = network.num_vertices();
    let k_count = network.num_commodities();
    let mut netflow = vec![0.0; vertices * k_count];

    for (i, v) in x.iter() {
        let arc = &network.arcs()[i / k_count];
        let k = i % k_count;
        netflow[k * vertices + arc.head] -= v;
        netflow[k * vertices + arc.tail] += v;
    }

    let mut worst = 0.0_f64;
    for (k, commodity) in network.commodities().iter().enumerate() {
        for v in 0..vertices {
            let balance = netflow[k * vertices + v];
            let expected = if v == commodity.origin {
                -commodity.demand
            } else if v == commodity.destination {
                commodity.demand
            } else {
                0.0
            };
            worst = worst.max((balance - expected).abs());
        }
    }
    worst
}

/// Largest amount by which any arc's aggregate flow exceeds its capacity.
pub fn max_capacity_violation(network: &Network, x: &SparseVec) -> f64 {
    let y = x.group_sums(network.num_commodities());
    y.iter()
        .map(|(a, ya)| (ya - network.arcs()[a].cap).max(0.0))
        .fold(0.0, f64::max)
}

/// Whether `x` satisfies conservation, non-negativity and (optionally)
/// capacity within [`FEASIBILITY_TOLERANCE`].
pub fn check_feasible(network: &Network, x: &SparseVec, capacity: bool) -> bool {
    max_nonnegativity_violation(x) <= FEASIBILITY_TOLERANCE
        && max_conservation_violation(network, x) <= FEASIBILITY_TOLERANCE
        && (!capacity || max_capacity_violation(network, x) <= FEASIBILITY_TOLERANCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arc, Commodity};

    fn path_net() -> Network {
        Network::new(
            3,
            vec![Arc::new(0, 1, 1.0, 2.0), Arc::new(1, 2, 1.0, 2.0)],
            vec![Commodity::new(0, 2, 1.5)],
        )
        .unwrap()
    }

    #[test]
    fn test_feasible_path_flow() {
        let net = path_net();
        let mut x = SparseVec::new(net.flow_len());
        x.insert(0, 1.5);
        x.insert(1, 1.5);
        assert_eq!(max_conservation_violation(&net, &x), 0.0);
        assert_eq!(max_nonnegativity_violation(&x), 0.0);
        assert_eq!(max_capacity_violation(&net, &x), 0.0);
        assert!(check_feasible(&net, &x, true));
    }

    #[test]
    fn test_detects_conservation_violation() {
        let net = path_net();
        let mut x = SparseVec::new(net.flow_len());
        x.insert(0, 1.5);
        x.insert(1, 1.0);
        assert!((max_conservation_violation(&net, &x) - 0.5).abs() < 1e-12);
        assert!(!check_feasible(&net, &x, false));
    }

    #[test]
    fn test_detects_capacity_violation() {
        let net = path_net();
        let mut x = SparseVec::new(net.flow_len());
        x.insert(0, 2.5);
        // Conservation is broken too, but capacity alone should flag 0.5.
        assert!((max_capacity_violation(&net, &x) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_detects_negative_entry() {
        let net = path_net();
        let mut x = SparseVec::new(net.flow_len());
        x.insert(0, -0.25);
        assert_eq!(max_nonnegativity_violation(&x), 0.25);
    }
}
