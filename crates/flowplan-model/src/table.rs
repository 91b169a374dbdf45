//! Production tables, recipe rows, and links.
//!
//! All project nodes live in slotmap arenas inside [`PlanArena`]; upward
//! pointers (row -> owner table, table -> owner row) are plain keys, so
//! there are no ownership cycles. Link resolution walks the owner chain.

use flowplan_core::id::{EntityId, GoodsId, RecipeId};
use flowplan_core::params::{BeaconConfig, ModuleInstall, RecipeParameters};
use slotmap::{new_key_type, SlotMap};
use std::collections::{BTreeMap, HashMap};

new_key_type! {
    /// Identifies a production table in the arena.
    pub struct TableKey;

    /// Identifies a recipe row in the arena.
    pub struct RowKey;

    /// Identifies a production link in the arena.
    pub struct LinkKey;
}

// ---------------------------------------------------------------------------
// Flags
// ---------------------------------------------------------------------------

/// Per-link state bits written by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkFlags(pub u16);

impl LinkFlags {
    pub const HAS_CONSUMPTION: LinkFlags = LinkFlags(1 << 0);
    pub const HAS_PRODUCTION: LinkFlags = LinkFlags(1 << 1);
    pub const NOT_MATCHED: LinkFlags = LinkFlags(1 << 2);
    pub const RECURSIVE_NOT_MATCHED: LinkFlags = LinkFlags(1 << 3);
    pub const CHILD_NOT_MATCHED: LinkFlags = LinkFlags(1 << 4);

    pub fn contains(self, other: LinkFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: LinkFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: LinkFlags) {
        self.0 &= !other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// Per-row warning bits written by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowWarnings(pub u8);

impl RowWarnings {
    pub const OVERPRODUCTION_REQUIRED: RowWarnings = RowWarnings(1 << 0);
    pub const DEADLOCK_CANDIDATE: RowWarnings = RowWarnings(1 << 1);
    pub const EXCEEDS_BUILT_COUNT: RowWarnings = RowWarnings(1 << 2);

    pub fn contains(self, other: RowWarnings) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: RowWarnings) {
        self.0 |= other.0;
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// How a link balances production against consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LinkAlgorithm {
    /// Production must equal consumption plus the link amount.
    Match,
    /// Producers may exceed the demand.
    AllowOverProduction,
    /// Consumers may exceed the supply.
    AllowOverConsumption,
}

/// A user-declared balance constraint at a goods inside a table.
///
/// `amount` is signed: positive demands consumption from outside the
/// table, negative allows surplus supply, zero balances exactly.
#[derive(Debug, Clone)]
pub struct ProductionLink {
    pub goods: GoodsId,
    pub amount: f64,
    pub algorithm: LinkAlgorithm,
    pub owner: TableKey,

    // Solve outputs; committed only after a solve completes.
    pub link_flow: f64,
    pub dual_value: f64,
    pub not_matched_flow: f64,
    pub flags: LinkFlags,
    /// Rows contributing to this link during the current solve.
    pub captured_recipes: Vec<RowKey>,
}

impl ProductionLink {
    fn new(owner: TableKey, goods: GoodsId, amount: f64, algorithm: LinkAlgorithm) -> Self {
        Self {
            goods,
            amount,
            algorithm,
            owner,
            link_flow: 0.0,
            dual_value: 0.0,
            not_matched_flow: 0.0,
            flags: LinkFlags::default(),
            captured_recipes: Vec::new(),
        }
    }

    /// Whether the solver matched this link exactly.
    pub fn is_matched(&self) -> bool {
        !self.flags.contains(LinkFlags::NOT_MATCHED)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Resolved link pointers for one row, refreshed each solve.
#[derive(Debug, Clone, Default)]
pub struct RowLinks {
    pub ingredients: Vec<Option<LinkKey>>,
    pub products: Vec<Option<LinkKey>>,
    pub fuel: Option<LinkKey>,
    pub spent_fuel: Option<LinkKey>,
}

impl RowLinks {
    /// Every resolved link, in ingredient/product/fuel order.
    pub fn iter(&self) -> impl Iterator<Item = LinkKey> + '_ {
        self.ingredients
            .iter()
            .chain(self.products.iter())
            .chain([&self.fuel, &self.spent_fuel])
            .filter_map(|l| *l)
    }
}

/// One recipe line in a production table.
#[derive(Debug, Clone)]
pub struct RecipeRow {
    pub recipe: RecipeId,
    pub crafter: EntityId,
    pub fuel: Option<GoodsId>,
    pub modules: Vec<ModuleInstall>,
    pub beacons: Option<BeaconConfig>,
    /// Chosen temperature variant per ingredient index, for ingredients
    /// with variants.
    pub variant_choice: BTreeMap<usize, GoodsId>,
    /// Nested table expanded under this row.
    pub subgroup: Option<TableKey>,
    pub enabled: bool,
    /// User-pinned building count; 0 means unpinned.
    pub fixed_buildings: f64,
    /// Buildings actually constructed, for the built-count check.
    pub built_buildings: Option<f64>,
    pub owner: TableKey,

    // Solve outputs.
    pub recipes_per_second: f64,
    pub warnings: RowWarnings,
    pub parameters: RecipeParameters,
    pub links: RowLinks,
}

impl RecipeRow {
    /// Buildings needed to sustain the solved rate.
    pub fn building_count(&self) -> f64 {
        if self.parameters.recipe_time.is_finite() {
            self.recipes_per_second * self.parameters.recipe_time
        } else {
            0.0
        }
    }

    /// The goods consumed for ingredient `index`, honoring the chosen
    /// temperature variant.
    pub fn ingredient_goods(&self, index: usize, declared: GoodsId) -> GoodsId {
        self.variant_choice.get(&index).copied().unwrap_or(declared)
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// An aggregated flow line: net production (positive) or consumption
/// (negative) of a goods at this table level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowEntry {
    pub goods: GoodsId,
    pub amount: f64,
    pub link: Option<LinkKey>,
}

/// An ordered list of recipe rows plus the links scoped to this level.
#[derive(Debug, Clone, Default)]
pub struct ProductionTable {
    pub rows: Vec<RowKey>,
    pub links: Vec<LinkKey>,
    /// O(1) link resolution within this table.
    pub link_map: HashMap<GoodsId, LinkKey>,
    /// The row this table is the subgroup of, if nested.
    pub owner: Option<RowKey>,
    /// Whether any link demands a non-zero amount. Set by solver setup.
    pub contains_desired_products: bool,
    /// Sorted per-table flow, written by the flow aggregator.
    pub flow: Vec<FlowEntry>,
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

/// Arena holding every project node with stable keys.
#[derive(Debug, Default)]
pub struct PlanArena {
    pub tables: SlotMap<TableKey, ProductionTable>,
    pub rows: SlotMap<RowKey, RecipeRow>,
    pub links: SlotMap<LinkKey, ProductionLink>,
}

impl PlanArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root-level table.
    pub fn new_table(&mut self) -> TableKey {
        self.tables.insert(ProductionTable::default())
    }

    /// Append a recipe row to a table.
    pub fn add_row(&mut self, table: TableKey, recipe: RecipeId, crafter: EntityId) -> RowKey {
        let row = self.rows.insert(RecipeRow {
            recipe,
            crafter,
            fuel: None,
            modules: Vec::new(),
            beacons: None,
            variant_choice: BTreeMap::new(),
            subgroup: None,
            enabled: true,
            fixed_buildings: 0.0,
            built_buildings: None,
            owner: table,
            recipes_per_second: 0.0,
            warnings: RowWarnings::default(),
            parameters: RecipeParameters::default(),
            links: RowLinks::default(),
        });
        self.tables[table].rows.push(row);
        row
    }

    /// Create (or expand) the subgroup table nested under a row.
    pub fn add_subgroup(&mut self, row: RowKey) -> TableKey {
        if let Some(existing) = self.rows[row].subgroup {
            return existing;
        }
        let table = self.tables.insert(ProductionTable {
            owner: Some(row),
            ..ProductionTable::default()
        });
        self.rows[row].subgroup = Some(table);
        table
    }

    /// Declare a link at a table. An existing link on the same goods is
    /// updated in place.
    pub fn add_link(
        &mut self,
        table: TableKey,
        goods: GoodsId,
        amount: f64,
        algorithm: LinkAlgorithm,
    ) -> LinkKey {
        if let Some(&existing) = self.tables[table].link_map.get(&goods) {
            let link = &mut self.links[existing];
            link.amount = amount;
            link.algorithm = algorithm;
            return existing;
        }
        let key = self
            .links
            .insert(ProductionLink::new(table, goods, amount, algorithm));
        let t = &mut self.tables[table];
        t.links.push(key);
        t.link_map.insert(goods, key);
        key
    }

    /// Delete a link from its owning table.
    pub fn remove_link(&mut self, link: LinkKey) {
        let Some(data) = self.links.remove(link) else {
            return;
        };
        if let Some(table) = self.tables.get_mut(data.owner) {
            table.links.retain(|&l| l != link);
            table.link_map.remove(&data.goods);
        }
    }

    /// Resolve a goods to a link by walking the owner chain outward from
    /// `table` until a match is found or the root is reached.
    pub fn find_link(&self, table: TableKey, goods: GoodsId) -> Option<LinkKey> {
        let mut current = Some(table);
        while let Some(key) = current {
            let t = &self.tables[key];
            if let Some(&link) = t.link_map.get(&goods) {
                return Some(link);
            }
            current = t.owner.map(|row| self.rows[row].owner);
        }
        None
    }

    /// The chain of tables from `table` up to the root, inclusive.
    pub fn owner_chain(&self, table: TableKey) -> Vec<TableKey> {
        let mut chain = vec![table];
        let mut current = table;
        while let Some(row) = self.tables[current].owner {
            current = self.rows[row].owner;
            chain.push(current);
        }
        chain
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn goods(i: u32) -> GoodsId {
        GoodsId(i)
    }

    #[test]
    fn link_flags_bit_ops() {
        let mut flags = LinkFlags::default();
        assert!(!flags.contains(LinkFlags::NOT_MATCHED));
        flags.insert(LinkFlags::NOT_MATCHED);
        flags.insert(LinkFlags::HAS_PRODUCTION);
        assert!(flags.contains(LinkFlags::NOT_MATCHED));
        assert!(flags.contains(LinkFlags::HAS_PRODUCTION));
        flags.remove(LinkFlags::NOT_MATCHED);
        assert!(!flags.contains(LinkFlags::NOT_MATCHED));
        flags.clear();
        assert_eq!(flags, LinkFlags::default());
    }

    #[test]
    fn add_rows_preserves_order() {
        let mut arena = PlanArena::new();
        let table = arena.new_table();
        let r1 = arena.add_row(table, RecipeId(0), EntityId(0));
        let r2 = arena.add_row(table, RecipeId(1), EntityId(0));
        assert_eq!(arena.tables[table].rows, vec![r1, r2]);
        assert_eq!(arena.rows[r1].owner, table);
    }

    #[test]
    fn link_map_resolves_locally() {
        let mut arena = PlanArena::new();
        let table = arena.new_table();
        let link = arena.add_link(table, goods(3), 1.0, LinkAlgorithm::Match);
        assert_eq!(arena.find_link(table, goods(3)), Some(link));
        assert_eq!(arena.find_link(table, goods(4)), None);
    }

    #[test]
    fn find_link_walks_owner_chain() {
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        let outer_link = arena.add_link(root, goods(7), 0.0, LinkAlgorithm::Match);
        let row = arena.add_row(root, RecipeId(0), EntityId(0));
        let sub = arena.add_subgroup(row);
        let subrow = arena.add_row(sub, RecipeId(1), EntityId(0));
        let subsub = arena.add_subgroup(subrow);
        // Resolves through two levels of nesting.
        assert_eq!(arena.find_link(subsub, goods(7)), Some(outer_link));
        // An inner link shadows the outer one.
        let inner = arena.add_link(sub, goods(7), 2.0, LinkAlgorithm::Match);
        assert_eq!(arena.find_link(subsub, goods(7)), Some(inner));
        assert_eq!(arena.find_link(root, goods(7)), Some(outer_link));
    }

    #[test]
    fn add_link_updates_existing() {
        let mut arena = PlanArena::new();
        let table = arena.new_table();
        let first = arena.add_link(table, goods(1), 1.0, LinkAlgorithm::Match);
        let second = arena.add_link(table, goods(1), 5.0, LinkAlgorithm::AllowOverProduction);
        assert_eq!(first, second);
        assert_eq!(arena.links[first].amount, 5.0);
        assert_eq!(arena.tables[table].links.len(), 1);
    }

    #[test]
    fn remove_link_clears_table_entries() {
        let mut arena = PlanArena::new();
        let table = arena.new_table();
        let link = arena.add_link(table, goods(1), 1.0, LinkAlgorithm::Match);
        arena.remove_link(link);
        assert!(arena.tables[table].links.is_empty());
        assert!(arena.tables[table].link_map.is_empty());
        assert_eq!(arena.find_link(table, goods(1)), None);
    }

    #[test]
    fn owner_chain_lists_tables_inward_out() {
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        let row = arena.add_row(root, RecipeId(0), EntityId(0));
        let sub = arena.add_subgroup(row);
        assert_eq!(arena.owner_chain(sub), vec![sub, root]);
        assert_eq!(arena.owner_chain(root), vec![root]);
    }

    #[test]
    fn subgroup_created_once() {
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        let row = arena.add_row(root, RecipeId(0), EntityId(0));
        let a = arena.add_subgroup(row);
        let b = arena.add_subgroup(row);
        assert_eq!(a, b);
    }

    #[test]
    fn variant_choice_falls_back_to_declared() {
        let mut arena = PlanArena::new();
        let root = arena.new_table();
        let row = arena.add_row(root, RecipeId(0), EntityId(0));
        assert_eq!(arena.rows[row].ingredient_goods(0, goods(9)), goods(9));
        arena.rows[row].variant_choice.insert(0, goods(4));
        assert_eq!(arena.rows[row].ingredient_goods(0, goods(4)), goods(4));
    }
}
