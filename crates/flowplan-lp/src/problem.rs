//! LP construction surface: variables, range constraints, objective.
//!
//! Coefficients accumulate: repeated `add_coefficient` calls on the same
//! (constraint, variable) pair sum instead of overwriting, so callers can
//! wire the same variable into a constraint from several sites.

use std::collections::BTreeMap;

/// Handle to a decision variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(pub(crate) usize);

/// Handle to a constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CtrId(pub(crate) usize);

/// Objective direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Minimize,
    Maximize,
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Proven optimal.
    Optimal,
    /// Feasible point found but optimality not proven (iteration cap).
    Feasible,
    /// No feasible point exists.
    Infeasible,
    /// Objective unbounded over the feasible region.
    Unbounded,
    /// Numerical trouble; no usable result.
    Abnormal,
}

impl SolveStatus {
    pub fn is_success(self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible)
    }
}

/// Basis status of a constraint at termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasisStatus {
    /// Slack basic: the constraint is not tight.
    Basic,
    /// Activity at the lower bound.
    AtLowerBound,
    /// Activity at the upper bound.
    AtUpperBound,
    /// Equality constraint.
    Fixed,
    /// Unbounded on both sides (relaxed away).
    Free,
}

#[derive(Debug, Clone)]
pub(crate) struct VarDef {
    pub lb: f64,
    pub ub: f64,
    pub obj: f64,
    #[allow(dead_code)]
    pub name: String,
}

#[derive(Debug, Clone)]
pub(crate) struct CtrDef {
    pub lo: f64,
    pub hi: f64,
    #[allow(dead_code)]
    pub name: String,
    /// Row coefficients keyed by variable index; BTreeMap for
    /// deterministic iteration.
    pub coefs: BTreeMap<usize, f64>,
}

/// A linear program under construction. Instances are scoped to one solve
/// and released by drop on every exit path.
#[derive(Debug, Clone)]
pub struct Problem {
    pub(crate) direction: Direction,
    pub(crate) vars: Vec<VarDef>,
    pub(crate) ctrs: Vec<CtrDef>,
}

impl Problem {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            vars: Vec::new(),
            ctrs: Vec::new(),
        }
    }

    /// Add a decision variable with bounds `[lb, ub]` (either may be
    /// infinite; `lb == ub` pins the variable).
    pub fn add_var(&mut self, lb: f64, ub: f64, name: impl Into<String>) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarDef {
            lb,
            ub,
            obj: 0.0,
            name: name.into(),
        });
        id
    }

    /// Add a range constraint `lo <= row <= hi`.
    pub fn add_constraint(&mut self, lo: f64, hi: f64, name: impl Into<String>) -> CtrId {
        let id = CtrId(self.ctrs.len());
        self.ctrs.push(CtrDef {
            lo,
            hi,
            name: name.into(),
            coefs: BTreeMap::new(),
        });
        id
    }

    /// Accumulate `v` onto the (ctr, var) coefficient.
    pub fn add_coefficient(&mut self, ctr: CtrId, var: VarId, v: f64) {
        *self.ctrs[ctr.0].coefs.entry(var.0).or_insert(0.0) += v;
    }

    /// Current accumulated coefficient of `var` in `ctr`.
    pub fn coefficient(&self, ctr: CtrId, var: VarId) -> f64 {
        self.ctrs[ctr.0].coefs.get(&var.0).copied().unwrap_or(0.0)
    }

    /// Set the objective coefficient of a variable (overwrite).
    pub fn set_objective(&mut self, var: VarId, v: f64) {
        self.vars[var.0].obj = v;
    }

    /// Replace the bounds of a constraint (used to relax dangling links).
    pub fn set_constraint_bounds(&mut self, ctr: CtrId, lo: f64, hi: f64) {
        self.ctrs[ctr.0].lo = lo;
        self.ctrs[ctr.0].hi = hi;
    }

    pub fn var_count(&self) -> usize {
        self.vars.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.ctrs.len()
    }

    /// Solve with the natural pivot order.
    pub fn solve(&self) -> Solution {
        crate::simplex::solve(self, None)
    }

    /// Re-solve with each seed permuting the pivot scan order and return
    /// the best successful result; deterministic for a given seed list.
    pub fn solve_with_seeds(&self, seeds: &[u64]) -> Solution {
        let mut best = self.solve();
        for &seed in seeds {
            let candidate = crate::simplex::solve(self, Some(seed));
            best = pick_better(best, candidate, self.direction);
        }
        best
    }
}

fn pick_better(a: Solution, b: Solution, direction: Direction) -> Solution {
    match (a.status.is_success(), b.status.is_success()) {
        (true, false) => a,
        (false, true) => b,
        (false, false) => a,
        (true, true) => {
            let better = match direction {
                Direction::Minimize => b.objective < a.objective - 1e-9,
                Direction::Maximize => b.objective > a.objective + 1e-9,
            };
            // Prefer a proven optimum over a capped feasible point.
            let upgrade = a.status == SolveStatus::Feasible && b.status == SolveStatus::Optimal;
            if better || (upgrade && (b.objective - a.objective).abs() <= 1e-9) {
                b
            } else {
                a
            }
        }
    }
}

/// Result of a solve. Querying values on a failed solve returns zeros.
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolveStatus,
    /// Objective value in the user's direction.
    pub objective: f64,
    pub(crate) var_values: Vec<f64>,
    pub(crate) ctr_duals: Vec<f64>,
    pub(crate) ctr_activity: Vec<f64>,
    pub(crate) ctr_basis: Vec<BasisStatus>,
}

impl Solution {
    pub(crate) fn failed(status: SolveStatus, vars: usize, ctrs: usize) -> Self {
        Self {
            status,
            objective: 0.0,
            var_values: vec![0.0; vars],
            ctr_duals: vec![0.0; ctrs],
            ctr_activity: vec![0.0; ctrs],
            ctr_basis: vec![BasisStatus::Free; ctrs],
        }
    }

    /// Primal value of a variable.
    pub fn value(&self, var: VarId) -> f64 {
        self.var_values[var.0]
    }

    /// Shadow price: change in objective per unit change of the
    /// constraint's binding bound.
    pub fn dual(&self, ctr: CtrId) -> f64 {
        self.ctr_duals[ctr.0]
    }

    /// Row activity at the solution point.
    pub fn activity(&self, ctr: CtrId) -> f64 {
        self.ctr_activity[ctr.0]
    }

    pub fn basis_status(&self, ctr: CtrId) -> BasisStatus {
        self.ctr_basis[ctr.0]
    }
}

// ===========================================================================
// Tests
// ===========================================================================
