use network_mcnf::{
    Arc, BprObjective, Commodity, IterationRecord, KleinrockObjective, Network, Objective,
    Settings, SolveStatus, Solver, SparseVec, TelemetrySink,
    validation::{max_conservation_violation, max_nonnegativity_violation},
};
use std::sync::{Arc as Shared, Mutex};

struct SharedSink(Shared<Mutex<Vec<IterationRecord>>>);

impl TelemetrySink for SharedSink {
    fn record(&mut self, row: &IterationRecord) {
        self.0.lock().unwrap().push(row.clone());
    }
}

fn braess_net() -> Network {
    // Two routes plus a crossover; small enough to reason about, rich
    // enough to exercise the inner refinements.
    Network::new(
        4,
        vec![
            Arc::new(0, 1, 1.0, 4.0),
            Arc::new(0, 2, 2.0, 4.0),
            Arc::new(1, 2, 0.5, 4.0),
            Arc::new(1, 3, 2.0, 4.0),
            Arc::new(2, 3, 1.0, 4.0),
        ],
        vec![Commodity::new(0, 3, 2.0), Commodity::new(0, 3, 1.0)],
    )
    .unwrap()
}

/// Property 1: the final iterate is feasible.
#[test]
fn test_final_iterate_is_feasible() {
    let net = braess_net();
    let obj = Box::new(KleinrockObjective::new(&net));
    let mut solver = Solver::new(net.clone(), obj, Settings::default());
    let solution = solver.solve().unwrap();

    assert!(solution.objective.is_finite());
    assert!(max_conservation_violation(&net, &solution.flow) <= 1e-6);
    assert!(max_nonnegativity_violation(&solution.flow) <= 1e-6);
}

/// Property 2: accepted iterates descend monotonically.
#[test]
fn test_objective_descends_across_iterations() {
    let rows = Shared::new(Mutex::new(Vec::new()));
    let net = braess_net();
    let obj = Box::new(KleinrockObjective::new(&net));
    let mut solver = Solver::new(net, obj, Settings::default())
        .with_telemetry(Box::new(SharedSink(Shared::clone(&rows))));
    solver.solve().unwrap();

    let rows = rows.lock().unwrap();
    assert!(!rows.is_empty());
    for pair in rows.windows(2) {
        assert!(
            pair[1].objective <= pair[0].objective + 1e-9,
            "objective rose from {} to {}",
            pair[0].objective,
            pair[1].objective
        );
    }
}

/// Properties 3 and 4: reduction round-trips exactly and the full gradient
/// replicates the reduced one across commodities.
#[test]
fn test_reduction_round_trip_and_gradient_consistency() {
    let net = braess_net();
    let k = net.num_commodities();
    let objectives: Vec<Box<dyn Objective>> = vec![
        Box::new(BprObjective::new(&net)),
        Box::new(KleinrockObjective::new(&net)),
    ];

    let mut x = SparseVec::new(net.flow_len());
    for &i in &[0usize, 3, 4, 5, 8] {
        x.insert(i, 0.25 + i as f64 * 0.125);
    }

    for obj in &objectives {
        let red = obj.reducible().expect("both objectives reduce");
        let y = red.reduce(&x);
        let robj = red.reduced_objective();

        assert_eq!(obj.value(&x), robj.value(&y), "value must round-trip");

        let g = obj.gradient(&x);
        let gr = robj.gradient(&y);
        for a in 0..net.num_arcs() {
            for c in 0..k {
                assert_eq!(
                    g.get(a * k + c),
                    gr.get(a),
                    "gradient entry ({a}, {c}) must match the reduced gradient"
                );
            }
        }
    }
}

/// Property 7: starting at a known optimum, one outer iteration leaves the
/// objective unchanged and the solver reports convergence.
#[test]
fn test_idempotent_at_optimum() {
    let net = Network::new(
        2,
        vec![Arc::new(0, 1, 1.0, 10.0)],
        vec![Commodity::new(0, 1, 5.0)],
    )
    .unwrap();
    let obj = BprObjective::new(&net);
    let mut optimum = SparseVec::new(net.flow_len());
    optimum.insert(0, 5.0);
    let f_star = obj.value(&optimum);

    let mut solver = Solver::new(net, Box::new(obj), Settings::default());
    let solution = solver.solve().unwrap();
    assert_eq!(solution.status, SolveStatus::Converged);
    assert!((solution.objective - f_star).abs() <= 1e-7 * f_star.max(1.0));
}
