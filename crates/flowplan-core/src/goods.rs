//! Goods: anything a recipe can consume or produce. A closed set of three
//! kinds (item, fluid, special) dispatched by enum match.

use crate::id::{EntityId, GoodsId, ObjectId, RecipeId};
use serde::{Deserialize, Serialize};

/// An inventory item. Stackable, optionally burnable as fuel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub stack_size: u32,
    /// Energy released when burned, in MJ. Zero for non-fuels.
    pub fuel_value: f64,
    /// What burning this item leaves behind (e.g. depleted fuel cells).
    pub fuel_result: Option<GoodsId>,
    /// The entity placed when this item is built in the world.
    pub place_result: Option<EntityId>,
    /// Non-recipe source this item is derived from (e.g. pumped from).
    /// A derived item can never cost more than its source.
    pub misc_source: Option<GoodsId>,
    /// Module effect bundle, for items usable as modules.
    pub module: Option<crate::entity::ModuleSpec>,
}

/// A fluid at a specific temperature. Fluids sharing an `original_name`
/// form a temperature-variant group, sorted ascending by temperature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fluid {
    pub original_name: String,
    pub temperature: f64,
    pub temperature_range: (f64, f64),
    /// MJ per degree per unit.
    pub heat_capacity: f64,
    /// MJ released when consumed as fluid fuel.
    pub heat_value: f64,
    /// All temperature variants of this fluid, ascending by temperature.
    /// Populated by the catalog builder; includes self.
    pub variants: Vec<GoodsId>,
}

/// A virtual goods such as electricity or research progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Special {
    pub is_power: bool,
    pub is_research: bool,
}

/// The kind-specific payload of a goods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GoodsDef {
    Item(Item),
    Fluid(Fluid),
    Special(Special),
}

/// A catalog goods: stable ids, display name, kind payload, and the
/// cross-reference lists resolved at catalog build time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goods {
    pub id: GoodsId,
    pub object: ObjectId,
    pub name: String,
    pub locale_name: String,
    pub def: GoodsDef,
    /// Units of this goods generated per map source, when map-generated.
    pub map_generated_amount: Option<f64>,
    /// Recipes consuming this goods. Resolved by the catalog builder.
    pub usages: Vec<RecipeId>,
    /// Recipes producing this goods. Resolved by the catalog builder.
    pub production: Vec<RecipeId>,
}

impl Goods {
    pub fn is_fluid(&self) -> bool {
        matches!(self.def, GoodsDef::Fluid(_))
    }

    pub fn is_item(&self) -> bool {
        matches!(self.def, GoodsDef::Item(_))
    }

    pub fn as_item(&self) -> Option<&Item> {
        match &self.def {
            GoodsDef::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn as_fluid(&self) -> Option<&Fluid> {
        match &self.def {
            GoodsDef::Fluid(fluid) => Some(fluid),
            _ => None,
        }
    }

    /// MJ released when this goods is consumed as fuel. Zero if not a fuel.
    pub fn fuel_value(&self) -> f64 {
        match &self.def {
            GoodsDef::Item(item) => item.fuel_value,
            GoodsDef::Fluid(fluid) => fluid.heat_value,
            GoodsDef::Special(_) => 0.0,
        }
    }

    /// What burning this goods leaves behind, if anything.
    pub fn fuel_result(&self) -> Option<GoodsId> {
        match &self.def {
            GoodsDef::Item(item) => item.fuel_result,
            _ => None,
        }
    }
}
