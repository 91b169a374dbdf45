//! Linear-programming layer for the flowplan planner.
//!
//! [`Problem`] is the construction surface: variables with bounds, range
//! constraints, accumulating coefficients, and an objective direction.
//! [`Problem::solve`] runs a bounded two-phase primal simplex and returns a
//! [`Solution`] carrying primal values, constraint duals, and basis
//! statuses. [`Problem::solve_with_seeds`] re-solves with seed-permuted
//! pivot orders and deterministically returns the best result.
//!
//! The [`scc`] module provides strongly-connected-component detection used
//! by infeasibility diagnosis.

pub mod problem;
pub mod scc;
mod simplex;

pub use problem::{BasisStatus, CtrId, Direction, Problem, Solution, SolveStatus, VarId};
