//! The two analytical engines of the flowplan planner.
//!
//! [`cost`] runs the global cost LP once per mod pack and exposes the
//! per-object cost oracle consumed by the production solver. [`table`]
//! solves one production page: a hierarchical LP over recipe rows and
//! links, with SCC + slack infeasibility diagnosis. [`flow`] aggregates
//! per-table goods flows after a solve, and [`handoff`] provides the
//! background-executor contract for UI callers.

pub mod cost;
pub mod flow;
pub mod handoff;
pub mod table;

pub use cost::{AnalysisSet, CostAnalysis, CostSource, UnitCosts};
pub use flow::calculate_flow;
pub use handoff::{solve_detached, DetachedResult};
pub use table::{solve, SolveError, SolveOutcome};
