use crate::{
    error::{McnfError, Result},
    sparse::SparseVec,
    types::Network,
};
use clarabel::{
    algebra::CscMatrix,
    solver::{
        DefaultSettings, DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
        SupportedConeT,
    },
};
use faer::sparse::{SparseColMat, Triplet};

/// Reusable quadratic-projection shell for one network.
///
/// The constraint skeleton (node-arc incidence equalities, capacity rows,
/// non-negativity) is assembled once; successive per-commodity solves mutate
/// only the linear objective and the conservation RHS window. Callers must
/// zero the window again before handing the session to the next commodity.
///
/// Capacity rows exist in the skeleton regardless of the toggle; a disabled
/// toggle marks them with an infinite bound and marker rows are dropped at
/// assembly, so the same shell serves both configurations.
pub struct QpSession {
    vars: usize,
    conservation_rows: usize,
    /// Row of each arc's capacity constraint; `None` when the bound is the
    /// inactive (infinite) marker.
    capacity_row: Vec<Option<usize>>,
    p: CscMatrix<f64>,
    a: CscMatrix<f64>,
    q: Vec<f64>,
    b: Vec<f64>,
    cones: Vec<SupportedConeT<f64>>,
    settings: DefaultSettings<f64>,
    /// Reused by parsimonious proximal sweeps to assemble the output flow.
    entry_scratch: Vec<(usize, f64)>,
}

impl QpSession {
    pub fn new(network: &Network, include_capacity: bool) -> Result<Self> {
        let vars = network.num_arcs();
        let vertices = network.num_vertices();

        let bounds: Vec<f64> = network
            .arcs()
            .iter()
            .map(|arc| if include_capacity { arc.cap } else { f64::INFINITY })
            .collect();
        let mut capacity_row = vec![None; vars];
        let mut n_cap = 0;
        for (arc, bound) in bounds.iter().enumerate() {
            if bound.is_finite() {
                capacity_row[arc] = Some(vertices + n_cap);
                n_cap += 1;
            }
        }

        let n_rows = vertices + n_cap + vars;
        let mut triplets = Vec::with_capacity(2 * vars + n_cap + vars);
        for (a, arc) in network.arcs().iter().enumerate() {
            triplets.push(Triplet::new(arc.head, a, -1.0));
            triplets.push(Triplet::new(arc.tail, a, 1.0));
        }
        for (a, row) in capacity_row.iter().enumerate() {
            if let Some(row) = row {
                triplets.push(Triplet::new(*row, a, 1.0));
            }
        }
        for a in 0..vars {
            triplets.push(Triplet::new(vertices + n_cap + a, a, -1.0));
        }

        let matrix = SparseColMat::<usize, f64>::try_new_from_triplets(n_rows, vars, &triplets)
            .map_err(|e| McnfError::QpInfeasible {
                reason: format!("failed to assemble constraint skeleton: {e:?}"),
            })?;

        // Convert to Clarabel's CSC layout via faer's symbolic accessors.
        let (symbolic, values) = matrix.as_ref().parts();
        let colptr: Vec<usize> = symbolic.col_ptr().to_vec();
        let rowval: Vec<usize> = symbolic.row_idx().to_vec();
        let nzval: Vec<f64> = values.to_vec();
        let a = CscMatrix::new(n_rows, vars, colptr, rowval, nzval);

        // Fixed quadratic diagonal 2I on the arc variables.
        let p = CscMatrix::new(
            vars,
            vars,
            (0..=vars).collect(),
            (0..vars).collect(),
            vec![2.0; vars],
        );

        let mut b = vec![0.0; n_rows];
        for (arc, row) in capacity_row.iter().enumerate() {
            if let Some(row) = row {
                b[*row] = bounds[arc];
            }
        }

        let mut cones = Vec::new();
        if vertices > 0 {
            cones.push(SupportedConeT::ZeroConeT(vertices));
        }
        if n_cap + vars > 0 {
            cones.push(SupportedConeT::NonnegativeConeT(n_cap + vars));
        }

        let settings = DefaultSettingsBuilder::default()
            .verbose(false)
            .tol_feas(1e-9)
            .tol_gap_abs(1e-9)
            .tol_gap_rel(1e-9)
            .build()
            .map_err(|e| McnfError::QpInfeasible {
                reason: format!("failed to build solver settings: {e}"),
            })?;

        Ok(Self {
            vars,
            conservation_rows: vertices,
            capacity_row,
            p,
            a,
            q: vec![0.0; vars],
            b,
            cones,
            settings,
            entry_scratch: Vec::new(),
        })
    }

    /// Replace the linear objective coefficients.
    pub fn set_linear(&mut self, c: &[f64]) {
        assert_eq!(c.len(), self.vars, "linear term dimension mismatch");
        self.q.copy_from_slice(c);
    }

    /// Overwrite conservation RHS entries. Pairs must be undone (set back to
    /// zero) before the session is handed to the next commodity.
    pub fn set_rhs_window(&mut self, pairs: &[(usize, f64)]) {
        for &(row, value) in pairs {
            assert!(
                row < self.conservation_rows,
                "rhs row {row} outside the conservation block"
            );
            self.b[row] = value;
        }
    }

    /// Update one arc's capacity bound; a no-op when the arc's row carries
    /// the inactive marker.
    pub fn set_capacity_rhs(&mut self, arc: usize, bound: f64) {
        if let Some(row) = self.capacity_row[arc] {
            self.b[row] = bound;
        }
    }

    /// Solve the current shell; returns the per-arc flow of one commodity.
    pub fn solve(&mut self) -> Result<Vec<f64>> {
        let mut solver = DefaultSolver::new(
            &self.p,
            &self.q,
            &self.a,
            &self.b,
            &self.cones,
            self.settings.clone(),
        )
        .map_err(|e| McnfError::QpInfeasible {
            reason: format!("failed to create solver: {e}"),
        })?;
        solver.solve();

        match solver.solution.status {
            SolverStatus::Solved | SolverStatus::AlmostSolved => Ok(solver.solution.x.clone()),
            status => Err(McnfError::QpInfeasible {
                reason: format!("solver returned {status:?}"),
            }),
        }
    }
}

/// One proximal step: for each commodity in fixed order, project
/// `x0_k - beta * g_k` onto that commodity's conservation polytope through
/// the shared session, and stitch the per-commodity flows back together.
///
/// Capacity rows are kept jointly feasible by giving each commodity the
/// residual capacity left by the others (the aggregate is updated after
/// every solve). `parsimonious` reuses the session's assembly buffer instead
/// of allocating per call.
pub fn proximal_step(
    session: &mut QpSession,
    network: &Network,
    x0: &SparseVec,
    grad: &SparseVec,
    beta: f64,
    parsimonious: bool,
) -> Result<SparseVec> {
    let arcs = network.num_arcs();
    let k_count = network.num_commodities();
    assert_eq!(x0.len(), arcs * k_count, "iterate dimension mismatch");
    assert_eq!(grad.len(), arcs * k_count, "gradient dimension mismatch");

    // Per-commodity views of the iterate and the gradient.
    let mut x0_k: Vec<Vec<(usize, f64)>> = vec![Vec::new(); k_count];
    for (i, v) in x0.iter() {
        x0_k[i % k_count].push((i / k_count, v));
    }
    let mut g_k: Vec<Vec<(usize, f64)>> = vec![Vec::new(); k_count];
    for (i, v) in grad.iter() {
        g_k[i % k_count].push((i / k_count, v));
    }

    // Aggregate flow, maintained across the commodity sweep for the residual
    // capacity bounds.
    let mut aggregate = vec![0.0; arcs];
    for (i, v) in x0.iter() {
        aggregate[i / k_count] += v;
    }

    let caps: Vec<f64> = network.arcs().iter().map(|a| a.cap).collect();
    let mut linear = vec![0.0; arcs];
    let mut entries = if parsimonious {
        std::mem::take(&mut session.entry_scratch)
    } else {
        Vec::new()
    };

    for k in 0..k_count {
        // min x'x + c'x with c = 2 beta g - 2 x0 reproduces ||x - (x0 - beta g)||^2.
        for &(a, g) in &g_k[k] {
            linear[a] = 2.0 * beta * g;
        }
        for &(a, v) in &x0_k[k] {
            linear[a] -= 2.0 * v;
        }
        session.set_linear(&linear);

        let commodity = &network.commodities()[k];
        session.set_rhs_window(&[
            (commodity.origin, -commodity.demand),
            (commodity.destination, commodity.demand),
        ]);

        for &(a, v) in &x0_k[k] {
            aggregate[a] -= v;
        }
        for a in 0..arcs {
            session.set_capacity_rhs(a, (caps[a] - aggregate[a]).max(0.0));
        }

        let solved = session.solve();

        session.set_rhs_window(&[(commodity.origin, 0.0), (commodity.destination, 0.0)]);
        for &(a, _) in &g_k[k] {
            linear[a] = 0.0;
        }
        for &(a, _) in &x0_k[k] {
            linear[a] = 0.0;
        }

        let flow = solved?;
        for (a, &v) in flow.iter().enumerate() {
            if v > 1e-10 {
                aggregate[a] += v;
                entries.push((a * k_count + k, v));
            }
        }
    }

    let out = SparseVec::from_entry_buffer(arcs * k_count, &mut entries);
    if parsimonious {
        session.entry_scratch = entries;
    }
    Ok(out)
}
