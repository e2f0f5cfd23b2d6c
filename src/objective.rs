use crate::{sparse::SparseVec, types::Network};

/// Separable convex arc-cost objective over a flattened `(arc, commodity)`
/// flow vector.
///
/// `value` returns `f64::INFINITY` outside the objective's domain (e.g.
/// Kleinrock at or above capacity); the solver treats that as "not a descent".
pub trait Objective {
    fn value(&self, x: &SparseVec) -> f64;

    fn gradient(&self, x: &SparseVec) -> SparseVec;

    /// Diagonal of the Hessian, when the objective provides one.
    fn hessian_diag(&self, _x: &SparseVec) -> Option<SparseVec> {
        None
    }

    /// Runtime capability probe: objectives that depend on `x` only through
    /// the per-arc aggregate expose their reduced form here.
    fn reducible(&self) -> Option<&dyn Reducible> {
        None
    }
}

/// Capability of an objective that depends on `x` only through the per-arc
/// aggregate `y[a] = sum_k x[a*K + k]`.
pub trait Reducible {
    /// Aggregate per-commodity flow into per-arc flow.
    fn reduce(&self, x: &SparseVec) -> SparseVec;

    /// The same objective expressed over the aggregate vector. The returned
    /// objective is never itself reducible.
    fn reduced_objective(&self) -> Box<dyn Objective>;
}

/// Expand per-arc marginals to the full `(arc, commodity)` gradient: every
/// commodity on an arc sees the same marginal cost.
fn expand_marginals(marginals: &[f64], commodities: usize) -> SparseVec {
    let mut g = SparseVec::new(marginals.len() * commodities);
    for (a, &m) in marginals.iter().enumerate() {
        for k in 0..commodities {
            g.insert(a * commodities + k, m);
        }
    }
    g
}

// ---------------------------------------------------------------------------
// Linear: f(x) = sum_a t_a * y_a
// ---------------------------------------------------------------------------

/// Linear cost objective; the gradient is the arc cost vector itself.
#[derive(Debug, Clone)]
pub struct LinearObjective {
    costs: Vec<f64>,
    commodities: usize,
}

impl LinearObjective {
    pub fn new(network: &Network) -> Self {
        Self {
            costs: network.arcs().iter().map(|a| a.cost).collect(),
            commodities: network.num_commodities(),
        }
    }
}

fn linear_value(costs: &[f64], y: &SparseVec) -> f64 {
    y.iter().map(|(a, ya)| costs[a] * ya).sum()
}

impl Objective for LinearObjective {
    fn value(&self, x: &SparseVec) -> f64 {
        linear_value(&self.costs, &x.group_sums(self.commodities))
    }

    fn gradient(&self, _x: &SparseVec) -> SparseVec {
        expand_marginals(&self.costs, self.commodities)
    }

    fn reducible(&self) -> Option<&dyn Reducible> {
        Some(self)
    }
}

impl Reducible for LinearObjective {
    fn reduce(&self, x: &SparseVec) -> SparseVec {
        x.group_sums(self.commodities)
    }

    fn reduced_objective(&self) -> Box<dyn Objective> {
        Box::new(ReducedLinear {
            costs: self.costs.clone(),
        })
    }
}

#[derive(Debug, Clone)]
struct ReducedLinear {
    costs: Vec<f64>,
}

impl Objective for ReducedLinear {
    fn value(&self, y: &SparseVec) -> f64 {
        linear_value(&self.costs, y)
    }

    fn gradient(&self, _y: &SparseVec) -> SparseVec {
        expand_marginals(&self.costs, 1)
    }
}

// ---------------------------------------------------------------------------
// BPR: f(x) = sum_a t_a * y_a * (1 + alpha/(beta+1) * (y_a/c_a)^beta)
// ---------------------------------------------------------------------------

pub const BPR_ALPHA: f64 = 0.15;
pub const BPR_BETA: f64 = 4.0;

/// Bureau of Public Roads latency objective. Finite everywhere.
#[derive(Debug, Clone)]
pub struct BprObjective {
    costs: Vec<f64>,
    caps: Vec<f64>,
    commodities: usize,
    alpha: f64,
    beta: f64,
}

impl BprObjective {
    pub fn new(network: &Network) -> Self {
        Self::with_shape(network, BPR_ALPHA, BPR_BETA)
    }

    pub fn with_shape(network: &Network, alpha: f64, beta: f64) -> Self {
        Self {
            costs: network.arcs().iter().map(|a| a.cost).collect(),
            caps: network.arcs().iter().map(|a| a.cap).collect(),
            commodities: network.num_commodities(),
            alpha,
            beta,
        }
    }
}

fn bpr_value(costs: &[f64], caps: &[f64], alpha: f64, beta: f64, y: &SparseVec) -> f64 {
    y.iter()
        .map(|(a, ya)| {
            costs[a] * ya * (1.0 + alpha / (beta + 1.0) * (ya / caps[a]).powf(beta))
        })
        .sum()
}

fn bpr_marginals(costs: &[f64], caps: &[f64], alpha: f64, beta: f64, y: &SparseVec) -> Vec<f64> {
    let dense = y.to_dense();
    (0..costs.len())
        .map(|a| costs[a] * (1.0 + alpha * (dense[a] / caps[a]).powf(beta)))
        .collect()
}

fn bpr_curvature(costs: &[f64], caps: &[f64], alpha: f64, beta: f64, y: &SparseVec) -> SparseVec {
    let mut gg = SparseVec::new(costs.len());
    for (a, ya) in y.iter() {
        let c = caps[a];
        let dd = costs[a] * alpha * beta * (ya / c).powf(beta - 1.0) / c;
        if dd.abs() > 1e-7 {
            gg.insert(a, dd);
        }
    }
    gg
}

impl Objective for BprObjective {
    fn value(&self, x: &SparseVec) -> f64 {
        let y = x.group_sums(self.commodities);
        bpr_value(&self.costs, &self.caps, self.alpha, self.beta, &y)
    }

    fn gradient(&self, x: &SparseVec) -> SparseVec {
        let y = x.group_sums(self.commodities);
        let marginals = bpr_marginals(&self.costs, &self.caps, self.alpha, self.beta, &y);
        expand_marginals(&marginals, self.commodities)
    }

    fn hessian_diag(&self, x: &SparseVec) -> Option<SparseVec> {
        let y = x.group_sums(self.commodities);
        let gg = bpr_curvature(&self.costs, &self.caps, self.alpha, self.beta, &y);
        let mut full = SparseVec::new(x.len());
        for (a, dd) in gg.iter() {
            for k in 0..self.commodities {
                full.insert(a * self.commodities + k, dd);
            }
        }
        Some(full)
    }

    fn reducible(&self) -> Option<&dyn Reducible> {
        Some(self)
    }
}

impl Reducible for BprObjective {
    fn reduce(&self, x: &SparseVec) -> SparseVec {
        x.group_sums(self.commodities)
    }

    fn reduced_objective(&self) -> Box<dyn Objective> {
        Box::new(ReducedBpr {
            costs: self.costs.clone(),
            caps: self.caps.clone(),
            alpha: self.alpha,
            beta: self.beta,
        })
    }
}

#[derive(Debug, Clone)]
struct ReducedBpr {
    costs: Vec<f64>,
    caps: Vec<f64>,
    alpha: f64,
    beta: f64,
}

impl Objective for ReducedBpr {
    fn value(&self, y: &SparseVec) -> f64 {
        bpr_value(&self.costs, &self.caps, self.alpha, self.beta, y)
    }

    fn gradient(&self, y: &SparseVec) -> SparseVec {
        let marginals = bpr_marginals(&self.costs, &self.caps, self.alpha, self.beta, y);
        expand_marginals(&marginals, 1)
    }

    fn hessian_diag(&self, y: &SparseVec) -> Option<SparseVec> {
        Some(bpr_curvature(
            &self.costs,
            &self.caps,
            self.alpha,
            self.beta,
            y,
        ))
    }
}

// ---------------------------------------------------------------------------
// Kleinrock: f(x) = sum_a y_a / (c_a - y_a), domain y_a < c_a
// ---------------------------------------------------------------------------

/// Queuing-delay objective; returns `+inf` when any arc reaches capacity.
#[derive(Debug, Clone)]
pub struct KleinrockObjective {
    caps: Vec<f64>,
    commodities: usize,
}

impl KleinrockObjective {
    pub fn new(network: &Network) -> Self {
        Self {
            caps: network.arcs().iter().map(|a| a.cap).collect(),
            commodities: network.num_commodities(),
        }
    }
}

fn kleinrock_value(caps: &[f64], y: &SparseVec) -> f64 {
    let mut sum = 0.0;
    for (a, ya) in y.iter() {
        let c = caps[a];
        if ya >= c {
            return f64::INFINITY;
        }
        sum += ya / (c - ya);
    }
    sum
}

fn kleinrock_marginals(caps: &[f64], y: &SparseVec) -> Vec<f64> {
    let dense = y.to_dense();
    caps.iter()
        .enumerate()
        .map(|(a, &c)| {
            let slack = c - dense[a];
            if slack > 0.0 {
                c / (slack * slack)
            } else {
                f64::INFINITY
            }
        })
        .collect()
}

fn kleinrock_curvature(caps: &[f64], y: &SparseVec) -> SparseVec {
    let mut gg = SparseVec::new(caps.len());
    for (a, ya) in y.iter() {
        let c = caps[a];
        let slack = c - ya;
        let dd = if slack > 0.0 {
            2.0 * c / (slack * slack * slack)
        } else {
            f64::INFINITY
        };
        gg.insert(a, dd);
    }
    gg
}

impl Objective for KleinrockObjective {
    fn value(&self, x: &SparseVec) -> f64 {
        kleinrock_value(&self.caps, &x.group_sums(self.commodities))
    }

    fn gradient(&self, x: &SparseVec) -> SparseVec {
        let y = x.group_sums(self.commodities);
        expand_marginals(&kleinrock_marginals(&self.caps, &y), self.commodities)
    }

    fn hessian_diag(&self, x: &SparseVec) -> Option<SparseVec> {
        let y = x.group_sums(self.commodities);
        let gg = kleinrock_curvature(&self.caps, &y);
        let mut full = SparseVec::new(x.len());
        for (a, dd) in gg.iter() {
            for k in 0..self.commodities {
                full.insert(a * self.commodities + k, dd);
            }
        }
        Some(full)
    }

    fn reducible(&self) -> Option<&dyn Reducible> {
        Some(self)
    }
}

impl Reducible for KleinrockObjective {
    fn reduce(&self, x: &SparseVec) -> SparseVec {
        x.group_sums(self.commodities)
    }

    fn reduced_objective(&self) -> Box<dyn Objective> {
        Box::new(ReducedKleinrock {
            caps: self.caps.clone(),
        })
    }
}

#[derive(Debug, Clone)]
struct ReducedKleinrock {
    caps: Vec<f64>,
}

impl Objective for ReducedKleinrock {
    fn value(&self, y: &SparseVec) -> f64 {
        kleinrock_value(&self.caps, y)
    }

    fn gradient(&self, y: &SparseVec) -> SparseVec {
        expand_marginals(&kleinrock_marginals(&self.caps, y), 1)
    }

    fn hessian_diag(&self, y: &SparseVec) -> Option<SparseVec> {
        Some(kleinrock_curvature(&self.caps, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Arc, Commodity};

    fn two_arc_net() -> Network {
        Network::new(
            2,
            vec![Arc::new(0, 1, 1.0, 10.0), Arc::new(0, 1, 2.0, 5.0)],
            vec![Commodity::new(0, 1, 3.0), Commodity::new(0, 1, 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_bpr_value_single_arc() {
        let net = Network::new(
            2,
            vec![Arc::new(0, 1, 1.0, 10.0)],
            vec![Commodity::new(0, 1, 5.0)],
        )
        .unwrap();
        let obj = BprObjective::new(&net);
        let mut x = SparseVec::new(1);
        x.insert(0, 5.0);
        // 5 * (1 + 0.15/5 * 0.5^4)
        let expected = 5.0 * (1.0 + 0.03 * 0.0625);
        assert!((obj.value(&x) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bpr_gradient_covers_unused_arcs() {
        let net = two_arc_net();
        let obj = BprObjective::new(&net);
        let x = SparseVec::new(net.flow_len());
        let g = obj.gradient(&x);
        // At zero flow the marginal is the free-flow cost, for every commodity.
        assert_eq!(g.get(0), 1.0);
        assert_eq!(g.get(1), 1.0);
        assert_eq!(g.get(2), 2.0);
        assert_eq!(g.get(3), 2.0);
    }

    #[test]
    fn test_kleinrock_domain_exit() {
        let net = two_arc_net();
        let obj = KleinrockObjective::new(&net);
        let mut x = SparseVec::new(net.flow_len());
        x.insert(2, 5.0); // arc 1, commodity 0: at capacity
        assert!(obj.value(&x).is_infinite());
    }

    #[test]
    fn test_kleinrock_gradient() {
        let net = two_arc_net();
        let obj = KleinrockObjective::new(&net);
        let mut x = SparseVec::new(net.flow_len());
        x.insert(0, 2.0); // arc 0, commodity 0
        let g = obj.gradient(&x);
        // c/(c-y)^2 = 10/64 on arc 0; 1/c = 0.2 on the empty arc 1.
        assert!((g.get(0) - 10.0 / 64.0).abs() < 1e-12);
        assert!((g.get(2) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_reducibility_round_trip_bit_equal() {
        let net = two_arc_net();
        for obj in [
            Box::new(BprObjective::new(&net)) as Box<dyn Objective>,
            Box::new(KleinrockObjective::new(&net)),
            Box::new(LinearObjective::new(&net)),
        ] {
            let mut x = SparseVec::new(net.flow_len());
            x.insert(0, 1.25);
            x.insert(1, 0.5);
            x.insert(3, 0.75);
            let red = obj.reducible().expect("objective should be reducible");
            let y = red.reduce(&x);
            let robj = red.reduced_objective();
            assert_eq!(obj.value(&x), robj.value(&y));
            assert!(robj.reducible().is_none());
        }
    }

    #[test]
    fn test_gradient_consistency_with_reduced() {
        let net = two_arc_net();
        let obj = KleinrockObjective::new(&net);
        let mut x = SparseVec::new(net.flow_len());
        x.insert(0, 1.0);
        x.insert(2, 2.0);
        let red = obj.reducible().unwrap();
        let y = red.reduce(&x);
        let robj = red.reduced_objective();
        let g = obj.gradient(&x);
        let gr = robj.gradient(&y);
        for a in 0..net.num_arcs() {
            for k in 0..net.num_commodities() {
                assert_eq!(g.get(a * net.num_commodities() + k), gr.get(a));
            }
        }
    }

    #[test]
    fn test_bpr_hessian_diag_on_support() {
        let net = two_arc_net();
        let obj = BprObjective::new(&net);
        let mut x = SparseVec::new(net.flow_len());
        x.insert(0, 4.0);
        let gg = obj.hessian_diag(&x).unwrap();
        // t*alpha*beta*(y/c)^3/c = 1*0.15*4*0.064/10
        let expected = 0.15 * 4.0 * (0.4f64).powf(3.0) / 10.0;
        assert!((gg.get(0) - expected).abs() < 1e-12);
        assert_eq!(gg.get(2), 0.0);
    }
}
