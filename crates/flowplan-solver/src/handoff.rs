//! Background-executor contract for table solves.
//!
//! The UI moves off its thread before invoking the LP and returns after
//! the solver completes; the core only promises that a solve runs to
//! completion on some worker and that a panic surfaces as a warning
//! string instead of unwinding into the caller. No concurrent mutation
//! crosses the boundary: the arena is borrowed exclusively for the whole
//! solve.

use crate::cost::CostSource;
use crate::table::{solve, SolveError, SolveOutcome};
use flowplan_core::catalog::Catalog;
use flowplan_model::project::ProjectSettings;
use flowplan_model::table::{PlanArena, TableKey};
use std::panic::AssertUnwindSafe;

/// Result of a detached solve: the outcome, a terminal error, or a
/// panic converted into a user-visible warning.
#[derive(Debug)]
pub enum DetachedResult {
    Done(SolveOutcome),
    Failed(SolveError),
    Panicked(String),
}

impl DetachedResult {
    /// The user-visible message, if any.
    pub fn message(&self) -> Option<String> {
        match self {
            DetachedResult::Done(outcome) => outcome.message.clone(),
            DetachedResult::Failed(err) => Some(err.to_string()),
            DetachedResult::Panicked(msg) => Some(msg.clone()),
        }
    }
}

/// Run a table solve on a scoped worker thread and join it. Exceptions
/// in the solver become a warning string; partial mutations never leak
/// because output commits happen only after the LP succeeds.
pub fn solve_detached(
    arena: &mut PlanArena,
    catalog: &Catalog,
    root: TableKey,
    costs: &(dyn CostSource + Sync),
    settings: &ProjectSettings,
) -> DetachedResult {
    let outcome = std::thread::scope(|scope| {
        let handle = scope.spawn(|| {
            std::panic::catch_unwind(AssertUnwindSafe(|| {
                solve(arena, catalog, root, costs, settings)
            }))
        });
        handle.join()
    });

    match outcome {
        Ok(Ok(Ok(result))) => DetachedResult::Done(result),
        Ok(Ok(Err(err))) => DetachedResult::Failed(err),
        Ok(Err(panic)) | Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown solver error".to_string());
            tracing::error!(%message, "table solve panicked on worker thread");
            DetachedResult::Panicked(format!("solver error: {message}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::UnitCosts;
    use flowplan_core::catalog::{CatalogBuilder, EntitySpec, RecipeSpec};
    use flowplan_core::entity::{AllowedEffects, CrafterCaps};
    use flowplan_core::goods::Item;
    use flowplan_core::recipe::{Ingredient, Product};
    use flowplan_model::table::LinkAlgorithm;

    #[test]
    fn detached_solve_matches_inline() {
        let mut b = CatalogBuilder::new();
        let ore = b.register_item(
            "ore",
            Item {
                stack_size: 50,
                fuel_value: 0.0,
                fuel_result: None,
                place_result: None,
                misc_source: None,
                module: None,
            },
        );
        let plate = b.register_item(
            "plate",
            Item {
                stack_size: 50,
                fuel_value: 0.0,
                fuel_result: None,
                place_result: None,
                misc_source: None,
                module: None,
            },
        );
        let furnace = b.register_entity(
            "furnace",
            EntitySpec {
                items_to_place: vec![plate],
                crafter: Some(CrafterCaps {
                    crafting_speed: 1.0,
                    base_productivity: 0.0,
                    module_slots: 0,
                    allowed_effects: AllowedEffects::all(),
                    power: 0.1,
                    is_lab: false,
                }),
                ..EntitySpec::default()
            },
        );
        let smelt = b.register_recipe(
            "plate",
            RecipeSpec {
                ingredients: vec![Ingredient::new(ore, 1.0)],
                products: vec![Product::simple(plate, 1.0)],
                time: 2.0,
                crafters: vec![furnace],
                ..RecipeSpec::default()
            },
        );
        let catalog = b.build().unwrap();

        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, plate, 1.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, smelt, furnace);

        let result = solve_detached(
            &mut arena,
            &catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        );
        assert!(matches!(result, DetachedResult::Done(_)));
        assert!(result.message().is_none());
        assert!((arena.rows[row].recipes_per_second - 1.0).abs() < 1e-6);
    }
}
