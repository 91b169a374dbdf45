//! Post-solve flow aggregation: per-table production/consumption sums,
//! rolled up across subgroup boundaries and sorted for display.
//!
//! A goods balanced by a matched link stays local to its table; goods
//! without a matched link propagate their net flow to the parent. An
//! unmatched link pushes its imbalance onto the nearest enclosing matched
//! link, which is flagged so the UI can show where the mismatch surfaced.

use flowplan_core::catalog::Catalog;
use flowplan_core::id::GoodsId;
use flowplan_model::table::{FlowEntry, LinkFlags, PlanArena, TableKey};
use std::collections::BTreeMap;

const FLOW_EPS: f64 = 1e-9;

/// Fluids are compared in 50-unit stacks so display ordering tracks
/// visual magnitude rather than raw units.
const FLUID_STACK: f64 = 50.0;

/// Recompute `table.flow` for the whole tree rooted at `table`.
pub fn calculate_flow(arena: &mut PlanArena, catalog: &Catalog, table: TableKey) {
    aggregate(arena, catalog, table);
}

fn aggregate(arena: &mut PlanArena, catalog: &Catalog, table: TableKey) {
    let row_keys = arena.tables[table].rows.clone();
    let mut production: BTreeMap<GoodsId, f64> = BTreeMap::new();
    let mut consumption: BTreeMap<GoodsId, f64> = BTreeMap::new();

    for row_key in row_keys {
        if !arena.rows[row_key].enabled {
            continue;
        }
        // Subgroups fold in first so nested balances are already settled.
        if let Some(sub) = arena.rows[row_key].subgroup {
            aggregate(arena, catalog, sub);
            let folded: Vec<FlowEntry> = arena.tables[sub]
                .flow
                .iter()
                .filter(|entry| match entry.link {
                    // A matched link settles its goods inside the subgroup.
                    Some(link) => !arena.links[link].is_matched(),
                    None => true,
                })
                .copied()
                .collect();
            for entry in folded {
                if entry.amount > 0.0 {
                    *production.entry(entry.goods).or_insert(0.0) += entry.amount;
                } else {
                    *consumption.entry(entry.goods).or_insert(0.0) -= entry.amount;
                }
            }
        }

        let row = &arena.rows[row_key];
        let rps = row.recipes_per_second;
        if rps <= 0.0 {
            continue;
        }
        let recipe = catalog.recipe(row.recipe);
        for product in &recipe.products {
            *production.entry(product.goods).or_insert(0.0) +=
                rps * product.amount_with_productivity(row.parameters.productivity);
        }
        for (idx, ing) in recipe.ingredients.iter().enumerate() {
            let goods = row.ingredient_goods(idx, ing.goods);
            *consumption.entry(goods).or_insert(0.0) += rps * ing.amount;
        }
        let fuel_per_recipe = row.parameters.fuel_usage_per_second_per_recipe;
        if let Some(fuel) = row.fuel {
            if fuel_per_recipe.is_finite() {
                *consumption.entry(fuel).or_insert(0.0) += fuel_per_recipe * rps;
                if let Some(spent) = catalog.goods(fuel).fuel_result() {
                    *production.entry(spent).or_insert(0.0) += fuel_per_recipe * rps;
                }
            }
        }
    }

    // Record link flow and route unmatched imbalances to the nearest
    // enclosing matched link.
    let link_keys = arena.tables[table].links.clone();
    for link_key in link_keys {
        let goods = arena.links[link_key].goods;
        let prod = production.get(&goods).copied().unwrap_or(0.0);
        let cons = consumption.get(&goods).copied().unwrap_or(0.0);
        arena.links[link_key].link_flow = prod;

        if arena.links[link_key].is_matched() {
            continue;
        }
        if (prod - cons).abs() <= FLOW_EPS {
            continue;
        }
        let parent = arena.tables[table]
            .owner
            .map(|row| arena.rows[row].owner);
        if let Some(parent_table) = parent {
            if let Some(enclosing) = arena.find_link(parent_table, goods) {
                if arena.links[enclosing].is_matched() {
                    arena.links[enclosing]
                        .flags
                        .insert(LinkFlags::CHILD_NOT_MATCHED);
                    arena.links[enclosing].flags.insert(LinkFlags::NOT_MATCHED);
                }
            }
        }
    }

    // Build the sorted flow array.
    let mut goods_seen: Vec<GoodsId> = production.keys().copied().collect();
    for goods in consumption.keys() {
        if !goods_seen.contains(goods) {
            goods_seen.push(*goods);
        }
    }
    let mut entries: Vec<FlowEntry> = goods_seen
        .into_iter()
        .filter_map(|goods| {
            let net = production.get(&goods).copied().unwrap_or(0.0)
                - consumption.get(&goods).copied().unwrap_or(0.0);
            if net.abs() <= FLOW_EPS {
                return None;
            }
            Some(FlowEntry {
                goods,
                amount: net,
                link: arena.tables[table].link_map.get(&goods).copied(),
            })
        })
        .collect();
    entries.sort_by(|a, b| {
        sort_amount(catalog, a)
            .total_cmp(&sort_amount(catalog, b))
            .then(a.goods.cmp(&b.goods))
    });
    arena.tables[table].flow = entries;
}

fn sort_amount(catalog: &Catalog, entry: &FlowEntry) -> f64 {
    if catalog.goods(entry.goods).is_fluid() {
        entry.amount / FLUID_STACK
    } else {
        entry.amount
    }
}

// ===========================================================================
// Tests
// ===========================================================================
