use crate::{
    error::{McnfError, Result},
    objective::{BprObjective, KleinrockObjective, Objective},
    types::Network,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Objective selected by the `Function` key.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectiveKind {
    #[default]
    Bpr,
    Kleinrock,
}

impl ObjectiveKind {
    /// Instantiate the selected objective over a network.
    pub fn build(self, network: &Network) -> Box<dyn Objective> {
        match self {
            ObjectiveKind::Bpr => Box::new(BprObjective::new(network)),
            ObjectiveKind::Kleinrock => Box::new(KleinrockObjective::new(network)),
        }
    }
}

/// Solver configuration with the documented defaults.
///
/// `set` accepts the host configuration's key names verbatim, so a key-value
/// collaborator maps one line per key. Parse failures are reported to the
/// caller and never reach the solver.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Settings {
    /// Convergence threshold on the cosine test.
    pub optimality_epsilon: f64,
    /// Factor applied to `||x||` when (re)initializing the step.
    pub initial_beta: f64,
    /// Step multiplier when the acceptance loop shrinks beta.
    pub beta_down_factor: f64,
    /// Reserved; parsed but not consumed.
    pub beta_up_factor: f64,
    /// Reset beta at the start of every outer iteration.
    pub reset_beta: bool,
    /// Enable the line search against the previous iterate.
    pub line_search: bool,
    /// Golden variant of the section search (general otherwise).
    pub golden_search: bool,
    /// Enable the inner shortest-path refinement block.
    pub shortest_path: bool,
    /// Enable the QP-based proximal step (shortest-path-only driver
    /// otherwise).
    pub socp: bool,
    /// Keep shared arc-capacity rows active in the QP shell.
    pub capacity_constraints: bool,
    /// Inner shortest-path refinements per outer iteration.
    pub sp_iterations_per_socp: usize,
    /// Outer iteration cap for the shortest-path-only driver.
    pub sp_iterations: usize,
    /// Section / line search iteration count.
    pub line_search_iterations: usize,
    /// 0 = none, 1 = reuse QP scratch, 2 = additionally reuse SP scratch.
    pub memory_parsimony: u8,
    /// Objective selected when the host builds it from configuration.
    pub function: ObjectiveKind,
    /// Outer iteration cap for the proximal drivers.
    pub max_iterations: usize,
    /// Beta below this floor without a descent reports a step collapse.
    pub beta_floor: f64,
    /// Outer iterations without improvement before reporting a stall.
    pub stall_iterations: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            optimality_epsilon: 1e-7,
            initial_beta: 10.0,
            beta_down_factor: 0.5,
            beta_up_factor: 1.1,
            reset_beta: false,
            line_search: true,
            golden_search: true,
            shortest_path: true,
            socp: true,
            capacity_constraints: true,
            sp_iterations_per_socp: 10,
            sp_iterations: 500,
            line_search_iterations: 20,
            memory_parsimony: 0,
            function: ObjectiveKind::Bpr,
            max_iterations: 200,
            beta_floor: 1e-12,
            stall_iterations: 50,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one `key = value` pair using the documented key names.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "optimality epsilon" => self.optimality_epsilon = parse_real(key, value)?,
            "initial beta" => self.initial_beta = parse_real(key, value)?,
            "beta down factor" => self.beta_down_factor = parse_real(key, value)?,
            "beta up factor" => self.beta_up_factor = parse_real(key, value)?,
            "to reset beta" => self.reset_beta = parse_bool(key, value)?,
            "to do line search" => self.line_search = parse_bool(key, value)?,
            "to do golden search" => self.golden_search = parse_bool(key, value)?,
            "to do shortest path" => self.shortest_path = parse_bool(key, value)?,
            "to do SOCP" => self.socp = parse_bool(key, value)?,
            "to include capacity constraints" => {
                self.capacity_constraints = parse_bool(key, value)?;
            }
            "SP iterations per SOCP" => self.sp_iterations_per_socp = parse_count(key, value)?,
            "SP iterations" => self.sp_iterations = parse_count(key, value)?,
            "line search iterations" => self.line_search_iterations = parse_count(key, value)?,
            "memory parsimony level" => {
                self.memory_parsimony = parse_count(key, value)?.min(u8::MAX as usize) as u8;
            }
            "Function" => {
                self.function = match value.trim() {
                    "bpr" => ObjectiveKind::Bpr,
                    "kleinrock" => ObjectiveKind::Kleinrock,
                    _ => {
                        return Err(McnfError::InvalidSetting {
                            key: key.to_string(),
                            value: value.to_string(),
                        });
                    }
                };
            }
            "max iterations" => self.max_iterations = parse_count(key, value)?,
            "beta floor" => self.beta_floor = parse_real(key, value)?,
            "stall iterations" => self.stall_iterations = parse_count(key, value)?,
            _ => return Err(McnfError::UnknownSetting(key.to_string())),
        }
        Ok(())
    }

    /// Apply a sequence of `(key, value)` pairs.
    pub fn apply<'a, I>(&mut self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Whether the QP session should reuse its per-commodity scratch.
    pub fn parsimonious_qp(&self) -> bool {
        self.memory_parsimony >= 1
    }

    /// Whether the shortest-path oracle should reuse its tree scratch.
    pub fn parsimonious_sp(&self) -> bool {
        self.memory_parsimony >= 2
    }
}

fn parse_real(key: &str, value: &str) -> Result<f64> {
    value
        .trim()
        .parse()
        .map_err(|_| McnfError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_count(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| McnfError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "yes" | "true" => Ok(true),
        "no" | "false" => Ok(false),
        _ => Err(McnfError::InvalidSetting {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
