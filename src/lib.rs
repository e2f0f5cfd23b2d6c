//! Convex multi-commodity network-flow optimization library
//!
//! This library minimizes separable convex arc-cost functions over a flow
//! polytope (per-commodity conservation, non-negativity, optional shared
//! capacities). The outer loop combines proximal projection steps solved as
//! convex quadratic subproblems, shortest-path direction finding, and
//! one-dimensional section searches over aggregate flows.

pub mod error;
pub mod objective;
pub mod qp;
pub mod section_search;
pub mod settings;
pub mod shortest_path;
pub mod solver;
pub mod sparse;
pub mod telemetry;
pub mod types;
pub mod validation;

// Re-export main types and functions
pub use error::{McnfError, Result};
pub use objective::{BprObjective, KleinrockObjective, LinearObjective, Objective, Reducible};
pub use settings::{ObjectiveKind, Settings};
pub use solver::{Solution, SolveStatus, Solver};
pub use sparse::SparseVec;
pub use telemetry::{IterationRecord, MemoryTelemetry, NullTelemetry, TelemetrySink};
pub use types::{Arc, Commodity, Network, VertexId};
