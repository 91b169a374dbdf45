//! Recipes and technologies. A technology is recipe-shaped (science-pack
//! ingredients consumed over time) plus the unlock graph.

use crate::id::{EntityId, GoodsId, ObjectId, RecipeId, TechId};
use serde::{Deserialize, Serialize};

/// A recipe input. When the goods has temperature variants, the acceptable
/// variants are listed and the user picks one per production row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub goods: GoodsId,
    pub amount: f64,
    /// Acceptable temperature variants, ascending. Empty when the goods
    /// has no variants or the recipe accepts only `goods` itself.
    pub variants: Vec<GoodsId>,
}

impl Ingredient {
    pub fn new(goods: GoodsId, amount: f64) -> Self {
        Self {
            goods,
            amount,
            variants: Vec::new(),
        }
    }
}

/// A recipe output. `amount` is the expected yield; `productivity_amount`
/// is the portion subject to the productivity bonus after catalyst
/// deduction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub goods: GoodsId,
    pub amount: f64,
    pub productivity_amount: f64,
}

impl Product {
    /// Expected yield: `probability * (amount_min + amount_max) / 2`.
    /// `catalyst` units re-enter the recipe as an ingredient and are not
    /// subject to productivity.
    pub fn new(goods: GoodsId, probability: f64, amount_min: f64, amount_max: f64, catalyst: f64) -> Self {
        let amount = probability * (amount_min + amount_max) / 2.0;
        Self {
            goods,
            amount,
            productivity_amount: (amount - catalyst).max(0.0),
        }
    }

    /// Fixed-yield product with no catalyst portion.
    pub fn simple(goods: GoodsId, amount: f64) -> Self {
        Self {
            goods,
            amount,
            productivity_amount: amount,
        }
    }

    /// Yield at the given productivity bonus.
    pub fn amount_with_productivity(&self, productivity: f64) -> f64 {
        self.amount + self.productivity_amount * productivity
    }
}

/// A transformation executed by a crafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub object: ObjectId,
    pub name: String,
    pub locale_name: String,
    pub ingredients: Vec<Ingredient>,
    pub products: Vec<Product>,
    /// Seconds per execution at crafting speed 1. Must be positive unless
    /// `marker` is set.
    pub time: f64,
    pub enabled: bool,
    /// Marker recipes stand in for non-crafting transformations (e.g.
    /// launch slots); their time is overridden elsewhere.
    pub marker: bool,
    /// Modules this recipe admits. `None` means every module is allowed.
    pub allowed_modules: Option<Vec<GoodsId>>,
    /// Entities capable of executing this recipe.
    pub crafters: Vec<EntityId>,
    /// Map-generated source entity for extraction recipes (mining, pumping).
    pub source_entity: Option<EntityId>,
    pub main_product: Option<GoodsId>,
    /// Technologies whose completion unlocks this recipe.
    pub unlocked_by: Vec<TechId>,
}

impl Recipe {
    /// Whether the recipe declares `module` admissible. A `None` allowlist
    /// admits everything.
    pub fn admits_module(&self, module: GoodsId) -> bool {
        match &self.allowed_modules {
            None => true,
            Some(allowed) => allowed.contains(&module),
        }
    }
}

/// A researchable technology. Forms a DAG via `prerequisites`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Technology {
    pub id: TechId,
    pub object: ObjectId,
    pub name: String,
    pub locale_name: String,
    /// Science packs consumed per research unit.
    pub ingredients: Vec<Ingredient>,
    pub time: f64,
    /// Research units required to complete.
    pub count: f64,
    pub prerequisites: Vec<TechId>,
    pub unlock_recipes: Vec<RecipeId>,
}
