use std::time::Duration;

/// One outer-iteration report row.
///
/// Rows are advisory: sinks must not influence convergence. The
/// shortest-path-only driver leaves the proximal fields at their defaults.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: usize,
    /// Proximal solves needed by the step-acceptance loop.
    pub proximal_solves: usize,
    pub beta: f64,
    /// Whether the line search against the previous iterate fired.
    pub line_search: bool,
    pub lambda: f64,
    /// First and last step fraction of the inner refinement block.
    pub tau_first: f64,
    pub tau_last: f64,
    pub cosine: f64,
    /// Objective after the line search, before the inner refinements.
    pub objective_after_search: f64,
    pub objective: f64,
    pub elapsed: Duration,
}

/// Row-oriented sink injected into the solver.
pub trait TelemetrySink {
    fn record(&mut self, row: &IterationRecord);
}

/// Discards every row.
#[derive(Debug, Default)]
pub struct NullTelemetry;

impl TelemetrySink for NullTelemetry {
    fn record(&mut self, _row: &IterationRecord) {}
}

/// Collects rows in memory; convenient for tests and post-run inspection.
#[derive(Debug, Default)]
pub struct MemoryTelemetry {
    pub rows: Vec<IterationRecord>,
}

impl MemoryTelemetry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetrySink for MemoryTelemetry {
    fn record(&mut self, row: &IterationRecord) {
        self.rows.push(row.clone());
    }
}
