//! The production table solver: one hierarchical LP per page solve.
//!
//! Setup collects enabled rows and all links, clearing stale outputs.
//! Each row becomes a non-negative rate variable, each link a range
//! constraint; coefficients accumulate through owner-chain link
//! resolution. When the LP is infeasible, diagnosis locates deadlock
//! loops through SCC detection, re-solves with slack variables, and
//! attributes the mismatch to specific links and rows. Outputs are
//! committed only after a solve succeeds.

use crate::cost::CostSource;
use crate::flow;
use flowplan_core::catalog::Catalog;
use flowplan_core::params;
use flowplan_lp::scc::{cycle_break_candidates, DiGraph};
use flowplan_lp::{BasisStatus, CtrId, Direction, Problem, SolveStatus, VarId};
use flowplan_model::project::ProjectSettings;
use flowplan_model::table::{
    LinkAlgorithm, LinkFlags, LinkKey, PlanArena, RowKey, RowLinks, RowWarnings, TableKey,
};
use std::collections::{BTreeMap, HashMap};

const SOLVE_SEEDS: [u64; 2] = [3, 17];
const RATE_EPS: f64 = 1e-9;
const BUILT_EPS: f64 = 1e-7;

// ---------------------------------------------------------------------------
// Errors and outcome
// ---------------------------------------------------------------------------

/// Terminal solve failures, surfaced to the user as strings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SolveError {
    #[error("failed to solve the production table: deadlock loops")]
    DeadlockLoops,
    #[error("failed to solve the production table: numerical errors")]
    NumericalErrors,
    #[error("Unaccounted error: MODEL_{0}")]
    Unaccounted(String),
}

/// A successful solve, with an optional informational message.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SolveOutcome {
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Setup pre-pass
// ---------------------------------------------------------------------------

/// Rows and links collected for one solve, in deterministic document
/// order. Running setup twice with no edits yields identical sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveSet {
    pub rows: Vec<RowKey>,
    pub links: Vec<LinkKey>,
}

/// Recursively collect enabled rows and all links under `root`, clearing
/// solve outputs. Disabled rows are zeroed along with their subtrees.
pub fn setup(
    arena: &mut PlanArena,
    catalog: &Catalog,
    settings: &ProjectSettings,
    root: TableKey,
) -> SolveSet {
    let mut set = SolveSet {
        rows: Vec::new(),
        links: Vec::new(),
    };
    setup_table(arena, catalog, settings, root, &mut set);
    set
}

fn setup_table(
    arena: &mut PlanArena,
    catalog: &Catalog,
    settings: &ProjectSettings,
    table: TableKey,
    set: &mut SolveSet,
) {
    let link_keys = arena.tables[table].links.clone();
    let mut desired = false;
    for link_key in link_keys {
        let link = &mut arena.links[link_key];
        link.flags.clear();
        link.link_flow = 0.0;
        link.dual_value = 0.0;
        link.not_matched_flow = 0.0;
        link.captured_recipes.clear();
        if link.amount != 0.0 {
            desired = true;
        }
        set.links.push(link_key);
    }
    arena.tables[table].contains_desired_products = desired;

    let row_keys = arena.tables[table].rows.clone();
    for row_key in row_keys {
        if !arena.rows[row_key].enabled {
            clear_disabled(arena, row_key);
            continue;
        }
        let (recipe, crafter, fuel, modules, beacons) = {
            let row = &arena.rows[row_key];
            (
                row.recipe,
                row.crafter,
                row.fuel,
                row.modules.clone(),
                row.beacons.clone(),
            )
        };
        let parameters = params::calculate(
            catalog,
            recipe,
            crafter,
            fuel,
            &modules,
            beacons.as_ref(),
            settings.research_speed_bonus,
        );
        let row = &mut arena.rows[row_key];
        row.parameters = parameters;
        row.warnings.clear();
        row.links = RowLinks::default();
        set.rows.push(row_key);
        if let Some(sub) = arena.rows[row_key].subgroup {
            setup_table(arena, catalog, settings, sub, set);
        }
    }
}

fn clear_disabled(arena: &mut PlanArena, row_key: RowKey) {
    let row = &mut arena.rows[row_key];
    row.recipes_per_second = 0.0;
    row.warnings.clear();
    row.parameters = Default::default();
    row.links = RowLinks::default();
    let Some(sub) = row.subgroup else {
        return;
    };
    let link_keys = arena.tables[sub].links.clone();
    for link_key in link_keys {
        let link = &mut arena.links[link_key];
        link.flags.clear();
        link.link_flow = 0.0;
        link.dual_value = 0.0;
        link.not_matched_flow = 0.0;
        link.captured_recipes.clear();
    }
    let row_keys = arena.tables[sub].rows.clone();
    for nested in row_keys {
        clear_disabled(arena, nested);
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Per-row (link, coefficient) contributions recorded during wiring so
/// the LP can be rebuilt for the slack re-solve without re-walking.
type Contributions = Vec<Vec<(LinkKey, f64)>>;

fn wire_rows(arena: &mut PlanArena, catalog: &Catalog, set: &SolveSet) -> Contributions {
    // Seed consumption/production bits from the link amount sign.
    for &link_key in &set.links {
        let link = &mut arena.links[link_key];
        if link.amount > 0.0 {
            link.flags.insert(LinkFlags::HAS_CONSUMPTION);
        } else if link.amount < 0.0 {
            link.flags.insert(LinkFlags::HAS_PRODUCTION);
        }
    }

    let mut contributions: Contributions = Vec::with_capacity(set.rows.len());
    for &row_key in &set.rows {
        let (owner, recipe_id, fuel, productivity, fuel_per_recipe) = {
            let row = &arena.rows[row_key];
            (
                row.owner,
                row.recipe,
                row.fuel,
                row.parameters.productivity,
                row.parameters.fuel_usage_per_second_per_recipe,
            )
        };
        let recipe = catalog.recipe(recipe_id);

        let mut row_links = RowLinks::default();
        let mut contribs: Vec<(LinkKey, f64)> = Vec::new();
        let mut produced: Vec<LinkKey> = Vec::new();

        for product in &recipe.products {
            let link = arena.find_link(owner, product.goods);
            row_links.products.push(link);
            if let Some(link) = link {
                contribs.push((link, product.amount_with_productivity(productivity)));
                produced.push(link);
            }
        }
        for (idx, ing) in recipe.ingredients.iter().enumerate() {
            let goods = arena.rows[row_key].ingredient_goods(idx, ing.goods);
            let link = arena.find_link(owner, goods);
            row_links.ingredients.push(link);
            if let Some(link) = link {
                contribs.push((link, -ing.amount));
            }
        }
        if let Some(fuel_goods) = fuel {
            if fuel_per_recipe.is_finite() {
                let link = arena.find_link(owner, fuel_goods);
                row_links.fuel = link;
                if let Some(link) = link {
                    contribs.push((link, -fuel_per_recipe));
                }
                if let Some(spent) = catalog.goods(fuel_goods).fuel_result() {
                    let link = arena.find_link(owner, spent);
                    row_links.spent_fuel = link;
                    if let Some(link) = link {
                        contribs.push((link, fuel_per_recipe));
                        produced.push(link);
                    }
                }
            }
        }

        for &(link_key, coef) in &contribs {
            let link = &mut arena.links[link_key];
            if produced.contains(&link_key) && coef > 0.0 {
                link.flags.insert(LinkFlags::HAS_PRODUCTION);
            } else {
                link.flags.insert(LinkFlags::HAS_CONSUMPTION);
            }
            if !link.captured_recipes.contains(&row_key) {
                link.captured_recipes.push(row_key);
            }
        }
        arena.rows[row_key].links = row_links;
        contributions.push(contribs);
    }
    contributions
}

// ---------------------------------------------------------------------------
// LP construction
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct SlackPlan {
    deadlocks: Vec<usize>,
    splits: Vec<usize>,
}

/// Slack variables by link slot, iterated in link order.
type SlackVars = BTreeMap<usize, (Option<VarId>, Option<VarId>)>;

#[allow(clippy::type_complexity)]
fn build_problem(
    arena: &PlanArena,
    costs: &dyn CostSource,
    set: &SolveSet,
    contributions: &Contributions,
    relaxed: &[bool],
    slacks: Option<&SlackPlan>,
) -> (Problem, Vec<VarId>, Vec<CtrId>, SlackVars) {
    let mut lp = Problem::new(Direction::Minimize);

    let mut vars = Vec::with_capacity(set.rows.len());
    for &row_key in &set.rows {
        let row = &arena.rows[row_key];
        let recipe_time = row.parameters.recipe_time;
        let (lb, ub) = if row.fixed_buildings > 0.0 && recipe_time.is_finite() && recipe_time > 0.0
        {
            let pinned = row.fixed_buildings / recipe_time;
            (pinned, pinned)
        } else {
            (0.0, f64::INFINITY)
        };
        let var = lp.add_var(lb, ub, "recipe-rate");
        lp.set_objective(var, costs.recipe_base_cost(row.recipe));
        vars.push(var);
    }

    let mut link_index: HashMap<LinkKey, usize> = HashMap::new();
    let mut ctrs = Vec::with_capacity(set.links.len());
    for (k, &link_key) in set.links.iter().enumerate() {
        let link = &arena.links[link_key];
        let (lo, hi) = if relaxed[k] {
            (f64::NEG_INFINITY, f64::INFINITY)
        } else {
            match link.algorithm {
                LinkAlgorithm::Match => (link.amount, link.amount),
                LinkAlgorithm::AllowOverProduction => (link.amount, f64::INFINITY),
                LinkAlgorithm::AllowOverConsumption => (f64::NEG_INFINITY, link.amount),
            }
        };
        ctrs.push(lp.add_constraint(lo, hi, "link"));
        link_index.insert(link_key, k);
    }

    for (i, contribs) in contributions.iter().enumerate() {
        for &(link_key, coef) in contribs {
            if let Some(&k) = link_index.get(&link_key) {
                lp.add_coefficient(ctrs[k], vars[i], coef);
            }
        }
    }

    let mut slack_vars = SlackVars::new();
    if let Some(plan) = slacks {
        let cost_magnitude = |k: usize| {
            let goods = arena.links[set.links[k]].goods;
            let cost = costs.goods_cost(goods).abs();
            if cost.is_finite() && cost > RATE_EPS {
                cost
            } else {
                1.0
            }
        };
        for &k in &plan.deadlocks {
            let neg = lp.add_var(0.0, f64::INFINITY, "neg-slack");
            lp.add_coefficient(ctrs[k], neg, cost_magnitude(k));
            lp.set_objective(neg, 1.0);
            slack_vars.entry(k).or_insert((None, None)).1 = Some(neg);
        }
        for &k in &plan.splits {
            let pos = lp.add_var(0.0, f64::INFINITY, "pos-slack");
            lp.add_coefficient(ctrs[k], pos, -cost_magnitude(k));
            lp.set_objective(pos, 1.0);
            slack_vars.entry(k).or_insert((None, None)).0 = Some(pos);
        }
    }

    (lp, vars, ctrs, slack_vars)
}

// ---------------------------------------------------------------------------
// Infeasibility diagnosis
// ---------------------------------------------------------------------------

fn diagnose(arena: &PlanArena, set: &SolveSet) -> SlackPlan {
    let link_index: HashMap<LinkKey, usize> = set
        .links
        .iter()
        .enumerate()
        .map(|(k, &l)| (l, k))
        .collect();

    // Links are nodes; each row connects its inputs to its outputs.
    let mut graph = DiGraph::new(set.links.len());
    for &row_key in &set.rows {
        let links = &arena.rows[row_key].links;
        let sources: Vec<usize> = links
            .ingredients
            .iter()
            .chain([&links.fuel])
            .filter_map(|l| l.and_then(|l| link_index.get(&l).copied()))
            .collect();
        let targets: Vec<usize> = links
            .products
            .iter()
            .chain([&links.spent_fuel])
            .filter_map(|l| l.and_then(|l| link_index.get(&l).copied()))
            .collect();
        for &s in &sources {
            for &t in &targets {
                if s != t {
                    graph.add_edge(s, t);
                }
            }
        }
    }

    let mut plan = SlackPlan::default();
    for component in graph.strongly_connected_components() {
        for candidate in cycle_break_candidates(&graph, &component) {
            if !plan.deadlocks.contains(&candidate) {
                plan.deadlocks.push(candidate);
            }
        }
    }

    for &row_key in &set.rows {
        let links = &arena.rows[row_key].links;
        let outputs: Vec<usize> = links
            .products
            .iter()
            .chain([&links.spent_fuel])
            .filter_map(|l| l.and_then(|l| link_index.get(&l).copied()))
            .collect();
        let mut distinct = outputs.clone();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() > 1 {
            for k in distinct {
                if !plan.splits.contains(&k) {
                    plan.splits.push(k);
                }
            }
        }
    }
    plan.deadlocks.sort_unstable();
    plan.splits.sort_unstable();
    plan
}

// ---------------------------------------------------------------------------
// Commit
// ---------------------------------------------------------------------------

fn commit(
    arena: &mut PlanArena,
    set: &SolveSet,
    vars: &[VarId],
    ctrs: &[CtrId],
    solution: &flowplan_lp::Solution,
) {
    for (i, &row_key) in set.rows.iter().enumerate() {
        let rate = solution.value(vars[i]);
        arena.rows[row_key].recipes_per_second = if rate.abs() < RATE_EPS {
            0.0
        } else {
            rate.max(0.0)
        };
    }
    for (k, &link_key) in set.links.iter().enumerate() {
        let dual = solution.dual(ctrs[k]);
        let basis = solution.basis_status(ctrs[k]);
        let link = &mut arena.links[link_key];
        link.dual_value = dual;
        let slack_basic = matches!(basis, BasisStatus::Basic | BasisStatus::Free);
        if slack_basic
            && (link.not_matched_flow != 0.0 || link.algorithm != LinkAlgorithm::Match)
        {
            link.flags.insert(LinkFlags::NOT_MATCHED);
        }
    }
}

fn apply_slack_results(
    arena: &mut PlanArena,
    set: &SolveSet,
    slack_vars: &SlackVars,
    solution: &flowplan_lp::Solution,
) {
    for (&k, &(pos, neg)) in slack_vars {
        let pos_value = pos.map(|v| solution.value(v)).unwrap_or(0.0);
        let neg_value = neg.map(|v| solution.value(v)).unwrap_or(0.0);
        let not_matched = pos_value - neg_value;
        if not_matched.abs() <= RATE_EPS {
            continue;
        }
        let link_key = set.links[k];
        let warning = if not_matched > 0.0 {
            RowWarnings::OVERPRODUCTION_REQUIRED
        } else {
            RowWarnings::DEADLOCK_CANDIDATE
        };
        {
            let link = &mut arena.links[link_key];
            link.not_matched_flow = not_matched;
            link.flags.insert(LinkFlags::NOT_MATCHED);
            link.flags.insert(LinkFlags::RECURSIVE_NOT_MATCHED);
        }
        // Up the ownership chain: every enclosing subgroup row carries
        // the warning.
        let mut table = arena.links[link_key].owner;
        while let Some(owner_row) = arena.tables[table].owner {
            arena.rows[owner_row].warnings.insert(warning);
            table = arena.rows[owner_row].owner;
        }
    }

    // Across rows: any row touching a recursively-unmatched link inherits
    // the matching warning.
    for &row_key in &set.rows {
        let touched: Vec<LinkKey> = arena.rows[row_key].links.iter().collect();
        for link_key in touched {
            let link = &arena.links[link_key];
            if !link.flags.contains(LinkFlags::RECURSIVE_NOT_MATCHED) {
                continue;
            }
            let warning = if link.not_matched_flow > 0.0 {
                RowWarnings::OVERPRODUCTION_REQUIRED
            } else {
                RowWarnings::DEADLOCK_CANDIDATE
            };
            arena.rows[row_key].warnings.insert(warning);
        }
    }
}

// ---------------------------------------------------------------------------
// Built-count check
// ---------------------------------------------------------------------------

fn check_built_count(arena: &mut PlanArena, table: TableKey) -> bool {
    let row_keys = arena.tables[table].rows.clone();
    let mut any = false;
    for row_key in row_keys {
        if !arena.rows[row_key].enabled {
            continue;
        }
        let mut exceeded = false;
        if let Some(sub) = arena.rows[row_key].subgroup {
            exceeded |= check_built_count(arena, sub);
        }
        let row = &arena.rows[row_key];
        if let Some(built) = row.built_buildings {
            if row.building_count() > built + BUILT_EPS {
                exceeded = true;
            }
        }
        if exceeded {
            arena.rows[row_key]
                .warnings
                .insert(RowWarnings::EXCEEDS_BUILT_COUNT);
            any = true;
        }
    }
    any
}

// ---------------------------------------------------------------------------
// Solve entry point
// ---------------------------------------------------------------------------

/// Solve one production page. On success, row rates, link duals, flags,
/// and table flows are committed; the outcome may carry an informational
/// message. Terminal failures return a [`SolveError`] and leave no
/// partial mutations beyond the cleared setup state.
pub fn solve(
    arena: &mut PlanArena,
    catalog: &Catalog,
    root: TableKey,
    costs: &dyn CostSource,
    settings: &ProjectSettings,
) -> Result<SolveOutcome, SolveError> {
    let set = setup(arena, catalog, settings, root);
    let contributions = wire_rows(arena, catalog, &set);

    // Links without both sides are relaxed away; links touching nothing
    // are deleted after the solve.
    let mut relaxed = vec![false; set.links.len()];
    let mut delete_list: Vec<LinkKey> = Vec::new();
    for (k, &link_key) in set.links.iter().enumerate() {
        let link = &mut arena.links[link_key];
        let has_production = link.flags.contains(LinkFlags::HAS_PRODUCTION);
        let has_consumption = link.flags.contains(LinkFlags::HAS_CONSUMPTION);
        if !(has_production && has_consumption) {
            relaxed[k] = true;
            link.flags.insert(LinkFlags::NOT_MATCHED);
            if !has_production && !has_consumption {
                delete_list.push(link_key);
            }
        }
    }

    tracing::debug!(
        rows = set.rows.len(),
        links = set.links.len(),
        "production table LP built"
    );

    let (lp, vars, ctrs, _) = build_problem(arena, costs, &set, &contributions, &relaxed, None);
    let solution = lp.solve_with_seeds(&SOLVE_SEEDS);

    if solution.status.is_success() {
        commit(arena, &set, &vars, &ctrs, &solution);
    } else {
        tracing::warn!(status = ?solution.status, "table solve failed; diagnosing");
        let plan = diagnose(arena, &set);
        let (lp, vars, ctrs, slack_vars) =
            build_problem(arena, costs, &set, &contributions, &relaxed, Some(&plan));
        let relaxed_solution = lp.solve_with_seeds(&SOLVE_SEEDS);
        if !relaxed_solution.status.is_success() {
            return Err(match relaxed_solution.status {
                SolveStatus::Infeasible => SolveError::DeadlockLoops,
                SolveStatus::Abnormal => SolveError::NumericalErrors,
                status => SolveError::Unaccounted(format!("{status:?}")),
            });
        }
        commit(arena, &set, &vars, &ctrs, &relaxed_solution);
        apply_slack_results(arena, &set, &slack_vars, &relaxed_solution);
    }

    for link_key in delete_list {
        arena.remove_link(link_key);
    }

    let exceeded = check_built_count(arena, root);
    flow::calculate_flow(arena, catalog, root);

    Ok(SolveOutcome {
        message: exceeded
            .then(|| "requires more buildings than are currently built".to_string()),
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::UnitCosts;
    use flowplan_core::catalog::{Catalog, CatalogBuilder, EntitySpec, RecipeSpec};
    use flowplan_core::entity::{AllowedEffects, CrafterCaps, EnergyKind, EntityEnergy};
    use flowplan_core::goods::Item;
    use flowplan_core::id::{EntityId, GoodsId, RecipeId};
    use flowplan_core::recipe::{Ingredient, Product};

    const EPS: f64 = 1e-6;

    fn plain_item() -> Item {
        Item {
            stack_size: 50,
            fuel_value: 0.0,
            fuel_result: None,
            place_result: None,
            misc_source: None,
            module: None,
        }
    }

    struct Fixture {
        catalog: Catalog,
        smelt: RecipeId,
        furnace: EntityId,
        ore: GoodsId,
        plate: GoodsId,
    }

    fn smelting_fixture(energy: EnergyKind, fuels: Vec<&str>) -> Fixture {
        let mut b = CatalogBuilder::new();
        let ore = b.register_item("iron-ore", plain_item());
        let plate = b.register_item("iron-plate", plain_item());
        let fuel_ids: Vec<GoodsId> = fuels
            .iter()
            .map(|name| {
                b.register_item(
                    name,
                    Item {
                        fuel_value: 4.0,
                        ..plain_item()
                    },
                )
            })
            .collect();
        let furnace = b.register_entity(
            "furnace",
            EntitySpec {
                items_to_place: vec![plate],
                energy: EntityEnergy {
                    kind: energy,
                    effectivity: 1.0,
                    fuels: fuel_ids,
                    ..EntityEnergy::void()
                },
                crafter: Some(CrafterCaps {
                    crafting_speed: 1.0,
                    base_productivity: 0.0,
                    module_slots: 2,
                    allowed_effects: AllowedEffects::all(),
                    power: 0.15,
                    is_lab: false,
                }),
                ..EntitySpec::default()
            },
        );
        let smelt = b.register_recipe(
            "iron-plate",
            RecipeSpec {
                ingredients: vec![Ingredient::new(ore, 1.0)],
                products: vec![Product::simple(plate, 1.0)],
                time: 3.5,
                crafters: vec![furnace],
                ..RecipeSpec::default()
            },
        );
        Fixture {
            catalog: b.build().unwrap(),
            smelt,
            furnace,
            ore,
            plate,
        }
    }

    #[test]
    fn single_recipe_page() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, f.plate, 1.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, f.smelt, f.furnace);

        let outcome = solve(
            &mut arena,
            &f.catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        )
        .unwrap();
        assert_eq!(outcome.message, None);
        assert!((arena.rows[row].recipes_per_second - 1.0).abs() < EPS);
        assert!(arena.rows[row].warnings.is_empty());

        let flow = &arena.tables[root].flow;
        assert_eq!(flow.len(), 2);
        assert_eq!(flow[0].goods, f.ore);
        assert!((flow[0].amount + 1.0).abs() < EPS);
        assert_eq!(flow[1].goods, f.plate);
        assert!((flow[1].amount - 1.0).abs() < EPS);
    }

    #[test]
    fn fuel_consumption_appears_in_flow() {
        let f = smelting_fixture(EnergyKind::SolidFuel, vec!["coal"]);
        let coal = f.catalog.goods_id("coal").unwrap();
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, f.plate, 1.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, f.smelt, f.furnace);
        arena.rows[row].fuel = Some(coal);

        solve(
            &mut arena,
            &f.catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        )
        .unwrap();
        // 150 kW on 4 MJ fuel: 0.15 * 3.5 / 4 = 0.13125 per recipe.
        let params = arena.rows[row].parameters;
        assert!((params.fuel_usage_per_second_per_recipe - 0.13125).abs() < EPS);

        let flow = &arena.tables[root].flow;
        let coal_entry = flow.iter().find(|e| e.goods == coal).unwrap();
        assert!((coal_entry.amount + 0.13125).abs() < EPS);
    }

    #[test]
    fn deadlock_detected_and_attributed() {
        // A: 1 B -> 1 A; B: 1 A -> 1 B; demand 1 A/s.
        let mut b = CatalogBuilder::new();
        let good_a = b.register_item("alpha", plain_item());
        let good_b = b.register_item("beta", plain_item());
        let crafter = b.register_entity(
            "assembler",
            EntitySpec {
                items_to_place: vec![good_a],
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
        let recipe_a = b.register_recipe(
            "make-alpha",
            RecipeSpec {
                ingredients: vec![Ingredient::new(good_b, 1.0)],
                products: vec![Product::simple(good_a, 1.0)],
                time: 1.0,
                crafters: vec![crafter],
                ..RecipeSpec::default()
            },
        );
        let recipe_b = b.register_recipe(
            "make-beta",
            RecipeSpec {
                ingredients: vec![Ingredient::new(good_a, 1.0)],
                products: vec![Product::simple(good_b, 1.0)],
                time: 1.0,
                crafters: vec![crafter],
                ..RecipeSpec::default()
            },
        );
        let catalog = b.build().unwrap();

        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, good_a, 1.0, LinkAlgorithm::Match);
        arena.add_link(root, good_b, 0.0, LinkAlgorithm::Match);
        let row_a = arena.add_row(root, recipe_a, crafter);
        let row_b = arena.add_row(root, recipe_b, crafter);

        let outcome = solve(
            &mut arena,
            &catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        );
        // The relaxed solve succeeds and attributes the loop.
        assert!(outcome.is_ok());
        assert!(arena.rows[row_a]
            .warnings
            .contains(RowWarnings::DEADLOCK_CANDIDATE));
        assert!(arena.rows[row_b]
            .warnings
            .contains(RowWarnings::DEADLOCK_CANDIDATE));
        // At least one loop link records a negative unmatched flow.
        let any_negative = arena
            .links
            .values()
            .any(|l| l.not_matched_flow < -EPS && l.flags.contains(LinkFlags::RECURSIVE_NOT_MATCHED));
        assert!(any_negative);
    }

    #[test]
    fn overproduction_branch_without_warnings() {
        // C: 1 X -> 2 Y + 1 Z; only Y is demanded.
        let mut b = CatalogBuilder::new();
        let x = b.register_item("x", plain_item());
        let y = b.register_item("y", plain_item());
        let z = b.register_item("z", plain_item());
        let crafter = b.register_entity(
            "splitter",
            EntitySpec {
                items_to_place: vec![x],
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
        let split = b.register_recipe(
            "split",
            RecipeSpec {
                ingredients: vec![Ingredient::new(x, 1.0)],
                products: vec![Product::simple(y, 2.0), Product::simple(z, 1.0)],
                time: 1.0,
                crafters: vec![crafter],
                ..RecipeSpec::default()
            },
        );
        let catalog = b.build().unwrap();

        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, y, 1.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, split, crafter);

        let outcome = solve(
            &mut arena,
            &catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        )
        .unwrap();
        assert_eq!(outcome.message, None);
        assert!((arena.rows[row].recipes_per_second - 0.5).abs() < EPS);
        assert!(arena.rows[row].warnings.is_empty());

        let flow = &arena.tables[root].flow;
        let z_entry = flow.iter().find(|e| e.goods == z).unwrap();
        assert!((z_entry.amount - 0.5).abs() < EPS);
    }

    #[test]
    fn fixed_buildings_pin_rate() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, f.plate, 0.0, LinkAlgorithm::AllowOverProduction);
        let row = arena.add_row(root, f.smelt, f.furnace);
        arena.rows[row].fixed_buildings = 7.0;

        solve(
            &mut arena,
            &f.catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        )
        .unwrap();
        // 7 buildings at 3.5 s per craft = 2 recipes per second.
        assert!((arena.rows[row].recipes_per_second - 2.0).abs() < EPS);
    }

    #[test]
    fn built_count_exceeded_message() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, f.plate, 1.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, f.smelt, f.furnace);
        arena.rows[row].built_buildings = Some(2.0);

        let outcome = solve(
            &mut arena,
            &f.catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        )
        .unwrap();
        // Needs 3.5 buildings but only 2 are built.
        assert_eq!(
            outcome.message.as_deref(),
            Some("requires more buildings than are currently built")
        );
        assert!(arena.rows[row]
            .warnings
            .contains(RowWarnings::EXCEEDS_BUILT_COUNT));
    }

    #[test]
    fn disabled_row_cleared_and_skipped() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, f.plate, 0.0, LinkAlgorithm::AllowOverConsumption);
        let row = arena.add_row(root, f.smelt, f.furnace);
        arena.rows[row].enabled = false;
        arena.rows[row].recipes_per_second = 99.0;

        solve(
            &mut arena,
            &f.catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        )
        .unwrap();
        assert_eq!(arena.rows[row].recipes_per_second, 0.0);
    }

    #[test]
    fn dangling_link_deleted() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        // Link on a goods nothing produces or consumes.
        let stray = f.catalog.goods_id("iron-ore").unwrap();

        let mut arena = PlanArena::new();
        let root = arena.new_table();
        let stray_link = arena.add_link(root, stray, 0.0, LinkAlgorithm::Match);
        // No rows at all: the ore link has neither side.
        solve(
            &mut arena,
            &f.catalog,
            root,
            &UnitCosts,
            &ProjectSettings::default(),
        )
        .unwrap();
        assert!(!arena.links.contains_key(stray_link));
        assert!(arena.tables[root].links.is_empty());
    }

    #[test]
    fn setup_is_idempotent() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, f.plate, 1.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, f.smelt, f.furnace);
        let sub = arena.add_subgroup(row);
        arena.add_row(sub, f.smelt, f.furnace);

        let settings = ProjectSettings::default();
        let first = setup(&mut arena, &f.catalog, &settings, root);
        let second = setup(&mut arena, &f.catalog, &settings, root);
        assert_eq!(first, second);
        assert!(arena.tables[root].contains_desired_products);
    }

    #[test]
    fn productivity_reduces_required_rate() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, f.plate, 1.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, f.smelt, f.furnace);

        let settings = ProjectSettings::default();
        solve(&mut arena, &f.catalog, root, &UnitCosts, &settings).unwrap();
        let base_rate = arena.rows[row].recipes_per_second;

        // Raise productivity through the crafter side by re-solving with
        // a manual parameter override after setup: emulate a productivity
        // module by rebuilding the catalog with base productivity.
        let mut b = CatalogBuilder::new();
        let ore = b.register_item("iron-ore", plain_item());
        let plate = b.register_item("iron-plate", plain_item());
        let furnace = b.register_entity(
            "furnace",
            EntitySpec {
                items_to_place: vec![plate],
                crafter: Some(CrafterCaps {
                    crafting_speed: 1.0,
                    base_productivity: 0.5,
                    module_slots: 0,
                    allowed_effects: AllowedEffects::all(),
                    power: 0.15,
                    is_lab: false,
                }),
                ..EntitySpec::default()
            },
        );
        let smelt = b.register_recipe(
            "iron-plate",
            RecipeSpec {
                ingredients: vec![Ingredient::new(ore, 1.0)],
                products: vec![Product::simple(plate, 1.0)],
                time: 3.5,
                crafters: vec![furnace],
                ..RecipeSpec::default()
            },
        );
        let catalog = b.build().unwrap();
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        arena.add_link(root, plate, 1.0, LinkAlgorithm::Match);
        let boosted_row = arena.add_row(root, smelt, furnace);
        solve(&mut arena, &catalog, root, &UnitCosts, &settings).unwrap();
        let boosted_rate = arena.rows[boosted_row].recipes_per_second;

        assert!(boosted_rate < base_rate - EPS);
        assert!((boosted_rate - 1.0 / 1.5).abs() < EPS);
    }

    #[test]
    fn solver_is_deterministic() {
        let f = smelting_fixture(EnergyKind::Electric, vec![]);
        let run = || {
            let mut arena = PlanArena::new();
            let root = arena.new_table();
            arena.add_link(root, f.plate, 1.0, LinkAlgorithm::Match);
            let row = arena.add_row(root, f.smelt, f.furnace);
            solve(
                &mut arena,
                &f.catalog,
                root,
                &UnitCosts,
                &ProjectSettings::default(),
            )
            .unwrap();
            (
                arena.rows[row].recipes_per_second,
                arena.tables[root].flow.clone(),
            )
        };
        let (rate_a, flow_a) = run();
        let (rate_b, flow_b) = run();
        assert_eq!(rate_a.to_bits(), rate_b.to_bits());
        assert_eq!(flow_a.len(), flow_b.len());
        for (a, b) in flow_a.iter().zip(flow_b.iter()) {
            assert_eq!(a.goods, b.goods);
            assert_eq!(a.amount.to_bits(), b.amount.to_bits());
        }
    }
}
