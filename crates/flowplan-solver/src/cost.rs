//! Cost analysis: a single global LP assigning a hypothetical cost to
//! every obtainable goods, from which per-recipe waste, importance, and
//! flow heuristics are derived.
//!
//! The LP maximizes total goods cost subject to one constraint per
//! recipe: products may not be worth more than ingredients plus fuel plus
//! a logistics cost. Tie-break constraints keep derived items no more
//! expensive than their source and hotter fluid variants no more
//! expensive than colder ones.

use flowplan_core::access::{science_pack_usage, Accessibility};
use flowplan_core::catalog::Catalog;
use flowplan_core::entity::EnergyKind;
use flowplan_core::goods::GoodsDef;
use flowplan_core::id::{GoodsId, Mapping, ObjectId, RecipeId};
use flowplan_core::recipe::Recipe;
use flowplan_lp::{Direction, Problem, VarId};
use flowplan_model::project::ProjectSettings;

// ---------------------------------------------------------------------------
// Cost model constants
// ---------------------------------------------------------------------------

pub const COST_LOWER_LIMIT: f64 = -10.0;
pub const COST_LIMIT_WHEN_GENERATES_ON_MAP: f64 = 1e4;
const COST_PER_SECOND: f64 = 0.1;
const COST_PER_MJ: f64 = 0.1;
const COST_PER_INGREDIENT_PER_SIZE: f64 = 0.04;
const COST_PER_PRODUCT_PER_SIZE: f64 = 0.02;
const COST_PER_ITEM: f64 = 0.02;
const COST_PER_FLUID: f64 = 0.001;
const COST_PER_POLLUTION: f64 = 0.01;
const MIN_RECIPE_SIZE: usize = 1;
const MINING_PENALTY_MAX_DENSITY: f64 = 2000.0;
const MINING_PENALTY_MAX_EXTRA: f64 = 10.0;

const SOLVE_SEEDS: [u64; 2] = [11, 23];

// ---------------------------------------------------------------------------
// Cost oracle
// ---------------------------------------------------------------------------

/// Objective-coefficient oracle consumed by the production table solver.
pub trait CostSource {
    /// Hypothetical cost of one unit of a goods. May be infinite.
    fn goods_cost(&self, goods: GoodsId) -> f64;

    /// Per-execution base cost of a recipe, used as the LP objective
    /// coefficient. Always finite and positive.
    fn recipe_base_cost(&self, recipe: RecipeId) -> f64;
}

/// Flat costs for tests and projects without a computed analysis.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitCosts;

impl CostSource for UnitCosts {
    fn goods_cost(&self, _goods: GoodsId) -> f64 {
        1.0
    }

    fn recipe_base_cost(&self, _recipe: RecipeId) -> f64 {
        1.0
    }
}

// ---------------------------------------------------------------------------
// Analysis output
// ---------------------------------------------------------------------------

/// Outputs of one cost analysis run. Written once, then read-only.
#[derive(Debug)]
pub struct CostAnalysis {
    /// Cost per object; `+inf` for inaccessible objects.
    pub cost: Mapping<ObjectId, f64>,
    /// Analysis flow per object (recipes and goods).
    pub flow: Mapping<ObjectId, f64>,
    pub recipe_cost: Mapping<RecipeId, f64>,
    pub recipe_product_cost: Mapping<RecipeId, f64>,
    /// `1 - product_cost / recipe_cost`, clamped to `[0, 1]`.
    pub recipe_waste_percentage: Mapping<RecipeId, f64>,
    /// Multi-use goods ordered by descending importance score.
    pub important_items: Vec<GoodsId>,
    /// Set when the LP failed outside milestone mode.
    pub warning: Option<String>,
    pub milestone_mode: bool,
    goods_cost: Mapping<GoodsId, f64>,
    /// Row objective coefficients for the production solver: ingredient
    /// cost plus positive-cost product and spent-fuel terms. Distinct
    /// from `recipe_cost`, which carries the fuel and logistics terms
    /// for waste accounting.
    recipe_base: Mapping<RecipeId, f64>,
}

impl CostSource for CostAnalysis {
    fn goods_cost(&self, goods: GoodsId) -> f64 {
        self.goods_cost[goods]
    }

    fn recipe_base_cost(&self, recipe: RecipeId) -> f64 {
        let cost = self.recipe_base[recipe];
        if cost.is_finite() && cost > 1e-3 {
            cost
        } else {
            1.0
        }
    }
}

impl CostAnalysis {
    /// Run the analysis. `milestone_mode` restricts eligibility to the
    /// next-milestone horizon and suppresses the failure warning (the
    /// unrestricted analysis reports it once already).
    pub fn compute(
        catalog: &Catalog,
        access: &dyn Accessibility,
        settings: &ProjectSettings,
        milestone_mode: bool,
    ) -> Self {
        let accessible = |object: ObjectId| {
            if milestone_mode {
                access.is_accessible_at_next_milestone(object)
            } else {
                access.is_accessible(object)
            }
        };

        let usage = science_pack_usage(catalog, access, settings.target_technology);
        let usage_of = |goods: GoodsId| {
            usage
                .iter()
                .find(|(g, _)| *g == goods)
                .map(|(_, amount)| *amount)
                .unwrap_or(0.0)
        };

        // ---- Build the LP ------------------------------------------------
        let mut lp = Problem::new(Direction::Maximize);
        let mut vars: Mapping<GoodsId, Option<VarId>> =
            Mapping::filled(catalog.goods_count(), None);
        for goods in catalog.all_goods() {
            if !accessible(goods.object) {
                continue;
            }
            let upper = goods
                .map_generated_amount
                .filter(|&amount| amount > 0.0)
                .map(|amount| COST_LIMIT_WHEN_GENERATES_ON_MAP / amount)
                .unwrap_or(f64::INFINITY);
            let var = lp.add_var(COST_LOWER_LIMIT, upper, goods.name.as_str());
            lp.set_objective(var, 1e-3 + usage_of(goods.id) / 1000.0);
            vars[goods.id] = Some(var);
        }

        let mut recipe_ctrs: Mapping<RecipeId, Option<flowplan_lp::CtrId>> =
            Mapping::filled(catalog.recipe_count(), None);
        let mut fuel_terms: Mapping<RecipeId, Option<(GoodsId, f64)>> =
            Mapping::filled(catalog.recipe_count(), None);
        for recipe in catalog.all_recipes() {
            if !recipe.enabled || !accessible(recipe.object) {
                continue;
            }
            let resolvable = recipe
                .ingredients
                .iter()
                .map(|i| i.goods)
                .chain(recipe.products.iter().map(|p| p.goods))
                .all(|g| vars[g].is_some());
            if !resolvable {
                continue;
            }
            let fuel = single_fuel(catalog, recipe, &accessible);
            let logistics =
                logistics_cost(catalog, recipe, &accessible, settings.pollution_cost_modifier);
            let ctr = lp.add_constraint(f64::NEG_INFINITY, logistics, recipe.name.as_str());
            for product in &recipe.products {
                if let Some(var) = vars[product.goods] {
                    lp.add_coefficient(ctr, var, product.amount);
                }
            }
            for ing in &recipe.ingredients {
                if let Some(var) = vars[ing.goods] {
                    lp.add_coefficient(ctr, var, -ing.amount);
                }
            }
            if let Some((fuel_goods, amount)) = fuel {
                if let Some(var) = vars[fuel_goods] {
                    lp.add_coefficient(ctr, var, -amount);
                    fuel_terms[recipe.id] = Some((fuel_goods, amount));
                }
            }
            recipe_ctrs[recipe.id] = Some(ctr);
        }

        // Derived items cannot cost more than their misc source.
        for goods in catalog.all_goods() {
            let Some(item) = goods.as_item() else { continue };
            let Some(source) = item.misc_source else { continue };
            if let (Some(item_var), Some(source_var)) = (vars[goods.id], vars[source]) {
                let ctr = lp.add_constraint(f64::NEG_INFINITY, 0.0, "misc-source");
                lp.add_coefficient(ctr, item_var, 1.0);
                lp.add_coefficient(ctr, source_var, -1.0);
            }
        }

        // Hotter variants of a fluid are never more expensive than colder
        // ones: cost is monotone non-increasing with temperature.
        for goods in catalog.all_goods() {
            let Some(fluid) = goods.as_fluid() else { continue };
            if fluid.variants.first() != Some(&goods.id) {
                continue; // handle each variant group once
            }
            for pair in fluid.variants.windows(2) {
                let (cold, hot) = (pair[0], pair[1]);
                if let (Some(cold_var), Some(hot_var)) = (vars[cold], vars[hot]) {
                    let ctr = lp.add_constraint(f64::NEG_INFINITY, 0.0, "fluid-temp");
                    lp.add_coefficient(ctr, hot_var, 1.0);
                    lp.add_coefficient(ctr, cold_var, -1.0);
                }
            }
        }

        tracing::debug!(
            vars = lp.var_count(),
            constraints = lp.constraint_count(),
            milestone_mode,
            "cost analysis LP built"
        );

        // ---- Solve and extract -------------------------------------------
        let solution = lp.solve_with_seeds(&SOLVE_SEEDS);
        let solved = solution.status.is_success();
        let warning = if solved || milestone_mode {
            None
        } else {
            tracing::warn!(status = ?solution.status, "cost analysis failed to solve");
            Some("cost analysis LP failed to solve; cost-based hints are unavailable".to_string())
        };

        let mut cost: Mapping<ObjectId, f64> =
            Mapping::filled(catalog.object_count(), f64::INFINITY);
        let mut goods_cost: Mapping<GoodsId, f64> =
            Mapping::filled(catalog.goods_count(), f64::INFINITY);
        for goods in catalog.all_goods() {
            if let Some(var) = vars[goods.id] {
                let value = if solved { solution.value(var) } else { 0.0 };
                cost[goods.object] = value;
                goods_cost[goods.id] = value;
            }
        }

        // Analysis flow: recipe duals, fanned out onto products.
        let mut flow: Mapping<ObjectId, f64> = Mapping::new(catalog.object_count());
        for recipe in catalog.all_recipes() {
            let Some(ctr) = recipe_ctrs[recipe.id] else {
                continue;
            };
            let recipe_flow = if solved {
                solution.dual(ctr).max(0.0)
            } else {
                0.0
            };
            flow[recipe.object] = recipe_flow;
            for product in &recipe.products {
                let product_obj = catalog.goods(product.goods).object;
                flow[product_obj] += recipe_flow * product.amount;
            }
        }

        // Entity cost: cheapest item that places it.
        for entity in catalog.all_entities() {
            let placed = entity
                .items_to_place
                .iter()
                .map(|&g| goods_cost[g])
                .fold(f64::INFINITY, f64::min);
            cost[entity.object] = placed;
        }

        // Technology cost: science-pack ingredient cost per unit.
        for tech in catalog.all_technologies() {
            cost[tech.object] = tech
                .ingredients
                .iter()
                .map(|i| goods_cost[i.goods] * i.amount)
                .sum();
        }

        // Per-recipe cost, product cost, waste, and the production-solver
        // objective coefficient.
        let mut recipe_cost: Mapping<RecipeId, f64> =
            Mapping::filled(catalog.recipe_count(), f64::INFINITY);
        let mut recipe_product_cost: Mapping<RecipeId, f64> =
            Mapping::new(catalog.recipe_count());
        let mut recipe_waste: Mapping<RecipeId, f64> = Mapping::new(catalog.recipe_count());
        let mut recipe_base: Mapping<RecipeId, f64> =
            Mapping::filled(catalog.recipe_count(), f64::INFINITY);
        for recipe in catalog.all_recipes() {
            if recipe_ctrs[recipe.id].is_none() {
                continue;
            }
            let ingredient_cost: f64 = recipe
                .ingredients
                .iter()
                .map(|i| goods_cost[i.goods] * i.amount)
                .sum();
            let fuel_cost = fuel_terms[recipe.id]
                .map(|(goods, amount)| goods_cost[goods] * amount)
                .unwrap_or(0.0);
            let logistics =
                logistics_cost(catalog, recipe, &accessible, settings.pollution_cost_modifier);
            let total = ingredient_cost + fuel_cost + logistics;
            recipe_cost[recipe.id] = total;
            cost[recipe.object] = total;

            let product_cost: f64 = recipe
                .products
                .iter()
                .map(|p| goods_cost[p.goods] * p.amount)
                .sum();
            recipe_product_cost[recipe.id] = product_cost;
            recipe_waste[recipe.id] = if total.is_finite() && total > 0.0 {
                (1.0 - product_cost / total).clamp(0.0, 1.0)
            } else {
                0.0
            };

            // Objective coefficient for the table solver: ingredients plus
            // positive-cost product and spent-fuel terms. Fuel and
            // logistics stay out of this quantity.
            let mut base = ingredient_cost;
            for product in &recipe.products {
                let value = goods_cost[product.goods];
                if value.is_finite() && value > 0.0 {
                    base += value * product.amount;
                }
            }
            if let Some((fuel_goods, amount)) = fuel_terms[recipe.id] {
                if let Some(spent) = catalog.goods(fuel_goods).fuel_result() {
                    let value = goods_cost[spent];
                    if value.is_finite() && value > 0.0 {
                        base += value * amount;
                    }
                }
            }
            recipe_base[recipe.id] = base;
        }

        let important_items =
            rank_important_items(catalog, &accessible, &goods_cost, &flow, &recipe_waste);

        tracing::info!(
            solved,
            important = important_items.len(),
            "cost analysis complete"
        );

        Self {
            cost,
            flow,
            recipe_cost,
            recipe_product_cost,
            recipe_waste_percentage: recipe_waste,
            important_items,
            warning,
            milestone_mode,
            goods_cost,
            recipe_base,
        }
    }

    /// Cost of an arbitrary catalog object; `+inf` when inaccessible.
    pub fn object_cost(&self, object: ObjectId) -> f64 {
        self.cost[object]
    }

    /// Human-readable cost, e.g. `"¥12.5"`, `"¥3.1k"`, or `"N/A"` for
    /// inaccessible objects.
    pub fn display_cost(&self, object: ObjectId) -> String {
        format_cost(self.cost[object])
    }
}

/// The two analyses a project holds: one over everything accessible and
/// one restricted to the current-milestones horizon. Constructed
/// explicitly after load; never mutated afterwards.
#[derive(Debug)]
pub struct AnalysisSet {
    pub full: CostAnalysis,
    pub at_milestones: CostAnalysis,
}

impl AnalysisSet {
    pub fn compute(
        catalog: &Catalog,
        access: &dyn Accessibility,
        settings: &ProjectSettings,
    ) -> Self {
        Self {
            full: CostAnalysis::compute(catalog, access, settings, false),
            at_milestones: CostAnalysis::compute(catalog, access, settings, true),
        }
    }

    /// The cost oracle for a given view.
    pub fn cost(&self, current_milestones: bool) -> &CostAnalysis {
        if current_milestones {
            &self.at_milestones
        } else {
            &self.full
        }
    }
}

fn format_cost(cost: f64) -> String {
    if !cost.is_finite() {
        return "N/A".to_string();
    }
    let sign = if cost < 0.0 { "-" } else { "" };
    let abs = cost.abs();
    let (value, suffix) = if abs >= 1e9 {
        (abs / 1e9, "G")
    } else if abs >= 1e6 {
        (abs / 1e6, "M")
    } else if abs >= 1e3 {
        (abs / 1e3, "k")
    } else {
        (abs, "")
    };
    format!("{sign}¥{value:.1}{suffix}")
}

// ---------------------------------------------------------------------------
// Fuel selection
// ---------------------------------------------------------------------------

/// The single fuel consumed by every eligible crafter of a recipe, as
/// (goods, units per execution). `None` when any crafter runs without
/// fuel goods (electric, void, heat, labor) or the crafters disagree.
fn single_fuel(
    catalog: &Catalog,
    recipe: &Recipe,
    accessible: &impl Fn(ObjectId) -> bool,
) -> Option<(GoodsId, f64)> {
    let mut result: Option<(GoodsId, f64)> = None;
    let mut seen_crafter = false;
    for &crafter_id in &recipe.crafters {
        let entity = catalog.entity(crafter_id);
        if !accessible(entity.object) {
            continue;
        }
        seen_crafter = true;
        if !entity.energy.burns_fuel() || entity.energy.fuels.len() != 1 {
            return None;
        }
        let fuel = entity.energy.fuels[0];
        let fuel_value = catalog.goods(fuel).fuel_value();
        let caps = entity.crafter()?;
        if fuel_value <= 0.0 {
            return None;
        }
        let amount = caps.power * recipe.time / (fuel_value * entity.energy.effectivity);
        result = match result {
            None => Some((fuel, amount)),
            Some((prev_fuel, _)) if prev_fuel != fuel => return None,
            Some((prev_fuel, prev_amount)) => Some((prev_fuel, prev_amount.min(amount))),
        };
    }
    if seen_crafter {
        result
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Logistics cost model
// ---------------------------------------------------------------------------

fn logistics_cost(
    catalog: &Catalog,
    recipe: &Recipe,
    accessible: &impl Fn(ObjectId) -> bool,
    pollution_cost_modifier: f64,
) -> f64 {
    let n_ing = recipe.ingredients.len();
    let n_prod = recipe.products.len();
    let size = MIN_RECIPE_SIZE.max((n_ing + n_prod) / 2) as f64;
    let size_usage = COST_PER_SECOND * recipe.time * size;
    let mut cost = size_usage
        * (1.0
            + COST_PER_INGREDIENT_PER_SIZE * n_ing as f64
            + COST_PER_PRODUCT_PER_SIZE * n_prod as f64);

    // Cheapest eligible crafter sets the power and pollution floor.
    let mut min_power = f64::INFINITY;
    let mut min_emissions = f64::INFINITY;
    for &crafter_id in &recipe.crafters {
        let entity = catalog.entity(crafter_id);
        if !accessible(entity.object) {
            continue;
        }
        let power = match entity.energy.kind {
            EnergyKind::Void => 0.0,
            _ => entity.crafter().map(|c| c.power).unwrap_or(0.0),
        };
        min_power = min_power.min(power);
        min_emissions = min_emissions.min(entity.energy.emissions);
    }
    if !min_power.is_finite() {
        min_power = 0.0;
    }
    if !min_emissions.is_finite() {
        min_emissions = 0.0;
    }
    cost += COST_PER_MJ * min_power * recipe.time;

    for ing in &recipe.ingredients {
        cost += flow_unit_cost(catalog, ing.goods) * ing.amount;
    }
    for product in &recipe.products {
        cost += flow_unit_cost(catalog, product.goods) * product.amount;
    }

    if let Some(source) = recipe.source_entity {
        let entity = catalog.entity(source);
        if entity.map_generated {
            let total_output: f64 = recipe.products.iter().map(|p| p.amount).sum();
            if total_output > 0.0 {
                let density = entity.map_gen_density / total_output;
                let rarity = (MINING_PENALTY_MAX_DENSITY / density).ln().max(0.0);
                let penalty = 1.0 + rarity.min(MINING_PENALTY_MAX_EXTRA);
                cost *= penalty;
            }
        }
    }

    cost + min_emissions * COST_PER_POLLUTION * recipe.time * pollution_cost_modifier
}

fn flow_unit_cost(catalog: &Catalog, goods: GoodsId) -> f64 {
    match catalog.goods(goods).def {
        GoodsDef::Item(_) => COST_PER_ITEM,
        GoodsDef::Fluid(_) => COST_PER_FLUID,
        GoodsDef::Special(_) => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Importance ranking
// ---------------------------------------------------------------------------

fn rank_important_items(
    catalog: &Catalog,
    accessible: &impl Fn(ObjectId) -> bool,
    goods_cost: &Mapping<GoodsId, f64>,
    flow: &Mapping<ObjectId, f64>,
    waste: &Mapping<RecipeId, f64>,
) -> Vec<GoodsId> {
    let mut scored: Vec<(GoodsId, f64)> = catalog
        .all_goods()
        .filter(|g| g.usages.len() >= 2)
        .map(|g| {
            let clean_usages = g
                .usages
                .iter()
                .filter(|&&r| {
                    accessible(catalog.recipe(r).object) && waste[r] == 0.0
                })
                .count() as f64;
            let cost = goods_cost[g.id];
            let score = if cost.is_finite() {
                flow[g.object] * cost * clean_usages
            } else {
                0.0
            };
            (g.id, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.into_iter().map(|(g, _)| g).collect()
}

// ===========================================================================
// Tests
// ===========================================================================
