use crate::{
    error::Result,
    objective::Objective,
    qp::{QpSession, proximal_step},
    section_search::{PHI, naive_line_search, section_search},
    settings::Settings,
    shortest_path::ShortestPathOracle,
    sparse::SparseVec,
    telemetry::{IterationRecord, NullTelemetry, TelemetrySink},
    types::Network,
    validation,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// How a solve run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The cosine optimality test passed.
    Converged,
    /// The configured iteration cap was exhausted.
    IterationLimit,
    /// Beta shrank below its floor without finding a descent; the best
    /// iterate so far is returned.
    StepCollapse,
    /// No objective decrease across the configured number of outer
    /// iterations; the best iterate so far is returned.
    Stalled,
    /// The stop flag was raised; the last accepted iterate is returned.
    Interrupted,
}

/// Final iterate and how it was reached.
#[derive(Debug)]
pub struct Solution {
    pub flow: SparseVec,
    pub objective: f64,
    pub status: SolveStatus,
    pub iterations: usize,
}

/// Convex multi-commodity flow solver.
///
/// Drivers are selected by the settings: `to do SOCP = no` runs the
/// shortest-path-only driver, `to do shortest path = no` the pure proximal
/// driver, and the default combines a proximal step with a block of
/// shortest-path refinements per outer iteration.
pub struct Solver {
    network: Network,
    objective: Box<dyn Objective>,
    settings: Settings,
    telemetry: Box<dyn TelemetrySink>,
    stop: Option<std::sync::Arc<AtomicBool>>,
}

impl Solver {
    pub fn new(network: Network, objective: Box<dyn Objective>, settings: Settings) -> Self {
        Self {
            network,
            objective,
            settings,
            telemetry: Box::new(NullTelemetry),
            stop: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Install a cancellation flag, polled between outer iterations.
    pub fn with_stop_flag(mut self, stop: std::sync::Arc<AtomicBool>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    fn should_stop(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn solve(&mut self) -> Result<Solution> {
        if self.settings.socp {
            self.solve_proximal()
        } else {
            self.solve_shortest_path_only()
        }
    }

    /// Pure Frank-Wolfe-style driver: shortest-path direction plus section
    /// search, for a fixed number of iterations.
    fn solve_shortest_path_only(&mut self) -> Result<Solution> {
        let start = Instant::now();
        let s = self.settings.clone();
        let len = self.network.flow_len();
        let k_count = self.network.num_commodities();

        let mut oracle = ShortestPathOracle::new(&self.network);
        for (a, arc) in self.network.arcs().iter().enumerate() {
            oracle.set_arc_cost(a, arc.cost);
        }
        let mut x = SparseVec::new(len);
        oracle.get_flows(&mut x, s.parsimonious_sp())?;

        // Reducible objectives carry the aggregate alongside the full
        // iterate so every evaluation inside the loop stays per-arc.
        let reducible = self.objective.reducible();
        let (reduced, mut y) = match reducible {
            Some(r) => (Some(r.reduced_objective()), Some(r.reduce(&x))),
            None => (None, None),
        };

        let mut status = SolveStatus::IterationLimit;
        let mut iterations_done = 0;
        let mut tau = 1.0;

        for iteration in 1..=s.sp_iterations {
            if self.should_stop() {
                status = SolveStatus::Interrupted;
                break;
            }
            iterations_done = iteration;

            let mut sp = SparseVec::new(len);
            let objective_now;
            if let (Some(r), Some(robj), Some(y)) = (reducible, reduced.as_deref(), y.as_mut()) {
                let gy = robj.gradient(y);
                oracle.reset_cost();
                for (a, gv) in gy.iter() {
                    oracle.set_arc_cost(a, gv);
                }
                oracle.get_flows(&mut sp, s.parsimonious_sp())?;
                let ysp = r.reduce(&sp);

                if 4.0 * tau >= 1.0 {
                    tau = 0.25;
                }
                tau = section_search(
                    y,
                    &ysp,
                    robj,
                    s.line_search_iterations,
                    false,
                    4.0 * tau * (1.0 - PHI),
                    4.0 * tau * PHI,
                );
                x.scale(1.0 - tau);
                x.axpy(tau, &sp);
                y.scale(1.0 - tau);
                y.axpy(tau, &ysp);
                objective_now = robj.value(y);
            } else {
                let g = self.objective.gradient(&x);
                oracle.reset_cost();
                for a in 0..self.network.num_arcs() {
                    oracle.set_arc_cost(a, g.get(a * k_count));
                }
                oracle.get_flows(&mut sp, s.parsimonious_sp())?;

                if 4.0 * tau >= 1.0 {
                    tau = section_search(
                        &x,
                        &sp,
                        self.objective.as_ref(),
                        s.line_search_iterations,
                        true,
                        1.0 - PHI,
                        PHI,
                    );
                } else {
                    tau = section_search(
                        &x,
                        &sp,
                        self.objective.as_ref(),
                        s.line_search_iterations,
                        false,
                        4.0 * tau * (1.0 - PHI),
                        4.0 * tau * PHI,
                    );
                }
                x.scale(1.0 - tau);
                x.axpy(tau, &sp);
                objective_now = self.objective.value(&x);
            }

            self.telemetry.record(&IterationRecord {
                iteration,
                proximal_solves: 0,
                beta: 0.0,
                line_search: false,
                lambda: 1.0,
                tau_first: tau,
                tau_last: tau,
                cosine: 0.0,
                objective_after_search: objective_now,
                objective: objective_now,
                elapsed: start.elapsed(),
            });
        }

        let objective = self.objective.value(&x);
        debug_assert!(validation::check_feasible(&self.network, &x, false));
        Ok(Solution {
            flow: x,
            objective,
            status,
            iterations: iterations_done,
        })
    }

    /// Proximal driver: adaptive-beta projection step, cosine optimality
    /// test, optional line search, optional inner shortest-path block.
    fn solve_proximal(&mut self) -> Result<Solution> {
        let start = Instant::now();
        let s = self.settings.clone();
        let len = self.network.flow_len();
        let k_count = self.network.num_commodities();

        let mut qp = QpSession::new(&self.network, s.capacity_constraints)?;
        let mut oracle = ShortestPathOracle::new(&self.network);

        let mut x1;
        if s.shortest_path {
            for (a, arc) in self.network.arcs().iter().enumerate() {
                oracle.set_arc_cost(a, arc.cost);
            }
            x1 = SparseVec::new(len);
            oracle.get_flows(&mut x1, s.parsimonious_sp())?;
        } else {
            // Project the origin onto the flow polytope.
            let zero = SparseVec::new(len);
            x1 = proximal_step(&mut qp, &self.network, &zero, &zero, 0.0, s.parsimonious_qp())?;
        }
        let mut f1 = self.objective.value(&x1);
        let mut beta = s.initial_beta * x1.norm();

        let mut best_f = f1;
        let mut best_x = x1.clone();
        let mut stall = 0usize;

        let mut tau_hat: f64 = 0.1;
        let mut status = SolveStatus::IterationLimit;
        let mut iterations_done = 0;

        'outer: for iteration in 1..=s.max_iterations {
            if self.should_stop() {
                status = SolveStatus::Interrupted;
                break;
            }
            iterations_done = iteration;
            if s.reset_beta {
                beta = s.initial_beta * x1.norm();
            }

            let x0 = x1.clone();
            let f0 = f1;

            let mut g = self.objective.gradient(&x0);
            let norm_g = g.norm();
            if norm_g == 0.0 {
                status = SolveStatus::Converged;
                break;
            }
            g.scale(1.0 / norm_g);

            // Shrink beta and re-project until the step descends.
            let mut count = 0usize;
            let mut cosine;
            loop {
                count += 1;
                x1 = proximal_step(&mut qp, &self.network, &x0, &g, beta, s.parsimonious_qp())?;
                f1 = self.objective.value(&x1);
                if f1 < f0 {
                    break;
                }

                // A proximal fixed point cannot descend. When the candidate
                // reproduces the previous iterate (within the projection
                // tolerance) the step direction is -beta*g exactly, so the
                // cosine test reduces to the alignment of the gradients at
                // the two points.
                let mut diff = x1.clone();
                diff.sub_assign(&x0);
                if f1.is_finite() && diff.norm() <= 1e-7 * (1.0 + x0.norm()) {
                    let g1 = self.objective.gradient(&x1);
                    let denom = (g.squared_norm() * g1.squared_norm()).sqrt();
                    cosine = if denom > 0.0 {
                        1.0 - g.dot(&g1) / denom
                    } else {
                        0.0
                    };
                    if cosine <= s.optimality_epsilon {
                        if f1 > f0 {
                            x1 = x0.clone();
                            f1 = f0;
                        }
                        status = SolveStatus::Converged;
                        self.telemetry.record(&IterationRecord {
                            iteration,
                            proximal_solves: count,
                            beta,
                            line_search: false,
                            lambda: 1.0,
                            tau_first: 0.0,
                            tau_last: 0.0,
                            cosine,
                            objective_after_search: f1,
                            objective: f1,
                            elapsed: start.elapsed(),
                        });
                        break 'outer;
                    }
                }

                beta *= s.beta_down_factor;
                if beta < s.beta_floor {
                    status = SolveStatus::StepCollapse;
                    break 'outer;
                }
            }

            cosine = proximal_cosine(self.objective.as_ref(), &x0, &x1, &g, beta);
            let converged = cosine <= s.optimality_epsilon;

            // Line search toward the previous iterate.
            let g1 = self.objective.gradient(&x1);
            let mut lambda = 1.0;
            let mut dx = x0.clone();
            dx.sub_assign(&x1);
            let do_line_search = s.line_search && dx.dot(&g1) < 0.0;
            if do_line_search {
                lambda = if s.golden_search {
                    section_search(
                        &x0,
                        &x1,
                        self.objective.as_ref(),
                        s.line_search_iterations,
                        true,
                        1.0 - PHI,
                        PHI,
                    )
                } else {
                    naive_line_search(&x0, &x1, self.objective.as_ref(), s.line_search_iterations)
                };
                x1.sub_assign(&x0);
                x1.scale(lambda);
                x1.add_assign(&x0);
                f1 = self.objective.value(&x1);
            }
            let f_after_search = f1;

            // Inner refinement: shortest-path directions under the current
            // marginal costs, each combined by a bounded section search.
            let mut tau_first = 0.0;
            let mut tau_star = tau_hat;
            if s.shortest_path && s.sp_iterations_per_socp > 0 {
                let window = (20.0 * tau_hat).min(1.0);
                for inner in 0..s.sp_iterations_per_socp {
                    oracle.reset_cost();
                    if let Some(r) = self.objective.reducible() {
                        let y = r.reduce(&x1);
                        let robj = r.reduced_objective();
                        for (a, gv) in robj.gradient(&y).iter() {
                            oracle.set_arc_cost(a, gv);
                        }
                    } else {
                        let gfull = self.objective.gradient(&x1);
                        for a in 0..self.network.num_arcs() {
                            oracle.set_arc_cost(a, gfull.get(a * k_count));
                        }
                    }
                    let mut sp = SparseVec::new(len);
                    oracle.get_flows(&mut sp, s.parsimonious_sp())?;

                    tau_star = section_search(
                        &x1,
                        &sp,
                        self.objective.as_ref(),
                        s.line_search_iterations,
                        false,
                        window * (1.0 - PHI),
                        window * PHI,
                    );
                    x1.scale(1.0 - tau_star);
                    x1.axpy(tau_star, &sp);
                    if inner == 0 {
                        tau_first = tau_star;
                    }
                }
                f1 = self.objective.value(&x1);
                // A zero fraction would freeze the next window.
                tau_hat = if tau_star == 0.0 { 1.0 } else { tau_star };
            }

            self.telemetry.record(&IterationRecord {
                iteration,
                proximal_solves: count,
                beta,
                line_search: do_line_search,
                lambda,
                tau_first,
                tau_last: tau_star,
                cosine,
                objective_after_search: f_after_search,
                objective: f1,
                elapsed: start.elapsed(),
            });

            let improvement = best_f - f1;
            if improvement > best_f.abs().max(1.0) * 1e-15 {
                best_f = f1;
                best_x = x1.clone();
                stall = 0;
            } else {
                if f1 < best_f {
                    best_f = f1;
                    best_x = x1.clone();
                }
                stall += 1;
                if stall >= s.stall_iterations {
                    status = SolveStatus::Stalled;
                    break;
                }
            }

            if converged {
                status = SolveStatus::Converged;
                break;
            }
        }

        let (flow, objective) = match status {
            SolveStatus::StepCollapse | SolveStatus::Stalled => (best_x, best_f),
            _ => (x1, f1),
        };
        debug_assert!(
            !objective.is_finite() || validation::check_feasible(&self.network, &flow, false)
        );
        Ok(Solution {
            flow,
            objective,
            status,
            iterations: iterations_done,
        })
    }
}

/// Cosine-like optimality measure: `1 + (d . g1) / (|d| |g1|)` with
/// `d = (x0 - beta * g) - x1`. Approaches zero as the proximal direction
/// aligns with the anti-gradient at the new point.
fn proximal_cosine(
    obj: &dyn Objective,
    x0: &SparseVec,
    x1: &SparseVec,
    g: &SparseVec,
    beta: f64,
) -> f64 {
    let mut d = x0.clone();
    d.axpy(-beta, g);
    d.sub_assign(x1);
    let g1 = obj.gradient(x1);
    let denom = (d.squared_norm() * g1.squared_norm()).sqrt();
    if denom > 0.0 {
        1.0 + d.dot(&g1) / denom
    } else {
        0.0
    }
}
