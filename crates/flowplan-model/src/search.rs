//! Search and predicate facade: pure functions over the object graph.

use crate::table::{PlanArena, TableKey};
use flowplan_core::catalog::Catalog;
use flowplan_core::id::GoodsId;

/// A tokenized text query. An object matches when its localized name
/// contains every token, case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    tokens: Vec<String>,
}

impl SearchQuery {
    pub fn new(query: &str) -> Self {
        Self {
            tokens: query
                .split_whitespace()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.tokens.is_empty() {
            return true;
        }
        let lower = name.to_lowercase();
        self.tokens.iter().all(|t| lower.contains(t.as_str()))
    }
}

/// Whether any row or link in the table (or its subgroups) matches the
/// query against recipe, entity, fuel, ingredient, and product names.
pub fn table_matches(
    arena: &PlanArena,
    catalog: &Catalog,
    table: TableKey,
    query: &SearchQuery,
) -> bool {
    if query.is_empty() {
        return true;
    }
    let t = &arena.tables[table];
    for &link in &t.links {
        if query.matches(&catalog.goods(arena.links[link].goods).locale_name) {
            return true;
        }
    }
    for &row_key in &t.rows {
        let row = &arena.rows[row_key];
        let recipe = catalog.recipe(row.recipe);
        if query.matches(&recipe.locale_name) {
            return true;
        }
        if query.matches(&catalog.entity(row.crafter).locale_name) {
            return true;
        }
        if let Some(fuel) = row.fuel {
            if query.matches(&catalog.goods(fuel).locale_name) {
                return true;
            }
        }
        for ing in &recipe.ingredients {
            if query.matches(&catalog.goods(ing.goods).locale_name) {
                return true;
            }
        }
        for product in &recipe.products {
            if query.matches(&catalog.goods(product.goods).locale_name) {
                return true;
            }
        }
        if let Some(sub) = row.subgroup {
            if table_matches(arena, catalog, sub, query) {
                return true;
            }
        }
    }
    false
}

/// Whether burning this goods leaves a spent-fuel product behind.
pub fn has_spent_fuel(catalog: &Catalog, goods: GoodsId) -> bool {
    catalog.goods(goods).fuel_result().is_some()
}

// ===========================================================================
// Tests
// ===========================================================================
