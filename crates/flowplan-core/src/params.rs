//! Per-row derived quantities: effective crafting time, productivity,
//! speed, and fuel consumption for a chosen (recipe, crafter, fuel,
//! modules, beacons) tuple.
//!
//! `calculate` is a pure function; it is called once per row before each
//! solve and has no side effects.

use crate::catalog::Catalog;
use crate::entity::{AllowedEffects, CrafterCaps, ModuleSpec};
use crate::id::{EntityId, GoodsId, RecipeId};
use crate::recipe::Recipe;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Configuration inputs
// ---------------------------------------------------------------------------

/// A module installed some number of times.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleInstall {
    pub module: GoodsId,
    pub count: u32,
}

/// A beacon arrangement affecting a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconConfig {
    pub beacon: EntityId,
    pub count: u32,
    pub modules: Vec<ModuleInstall>,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Derived quantities for one production row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RecipeParameters {
    /// Seconds per recipe execution after speed effects.
    pub recipe_time: f64,
    /// Total productivity bonus applied to non-catalyst product portions.
    pub productivity: f64,
    /// Sum of module, beacon, and research speed bonuses.
    pub speed_bonus: f64,
    /// Fuel units consumed per second per building. NaN when no fuel is
    /// resolvable; solvers must skip fuel terms in that case.
    pub fuel_usage_per_second_per_building: f64,
    /// Fuel units consumed per recipe execution.
    pub fuel_usage_per_second_per_recipe: f64,
    /// Pollution emitted per recipe execution.
    pub pollution: f64,
}

impl Default for RecipeParameters {
    fn default() -> Self {
        Self {
            recipe_time: 0.0,
            productivity: 0.0,
            speed_bonus: 0.0,
            fuel_usage_per_second_per_building: f64::NAN,
            fuel_usage_per_second_per_recipe: f64::NAN,
            pollution: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Module acceptance
// ---------------------------------------------------------------------------

/// A module fits a crafter iff every non-zero effect is permitted by the
/// crafter's allowed effects. Recipes may further restrict via their own
/// module list, and modules via limitation/blacklist sets; all must agree.
pub fn module_accepted(
    spec: &ModuleSpec,
    effects: AllowedEffects,
    recipe: &Recipe,
    module: GoodsId,
) -> bool {
    if spec.speed != 0.0 && !effects.speed {
        return false;
    }
    if spec.productivity != 0.0 && !effects.productivity {
        return false;
    }
    if spec.consumption != 0.0 && !effects.consumption {
        return false;
    }
    if spec.pollution != 0.0 && !effects.pollution {
        return false;
    }
    if !recipe.admits_module(module) {
        return false;
    }
    if !spec.limitation.is_empty() && !spec.limitation.contains(&recipe.id) {
        return false;
    }
    if spec.blacklist.contains(&recipe.id) {
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

fn module_spec(catalog: &Catalog, module: GoodsId) -> Option<ModuleSpec> {
    catalog
        .goods(module)
        .as_item()
        .and_then(|item| item.module.clone())
}

/// Compute derived quantities for a `(recipe, crafter, fuel, modules,
/// beacons)` tuple. `research_speed_bonus` applies to labs only.
pub fn calculate(
    catalog: &Catalog,
    recipe_id: RecipeId,
    crafter_id: EntityId,
    fuel: Option<GoodsId>,
    modules: &[ModuleInstall],
    beacons: Option<&BeaconConfig>,
    research_speed_bonus: f64,
) -> RecipeParameters {
    let recipe = catalog.recipe(recipe_id);
    let entity = catalog.entity(crafter_id);
    let Some(caps) = entity.crafter() else {
        return RecipeParameters::default();
    };

    let (speed_bonus, productivity) =
        effect_totals(catalog, recipe, caps, modules, beacons, research_speed_bonus);

    let crafting_speed = caps.crafting_speed * (1.0 + speed_bonus);
    let recipe_time = if crafting_speed > 0.0 {
        recipe.time / crafting_speed
    } else {
        f64::INFINITY
    };

    let (per_building, per_recipe) = fuel_usage(catalog, entity, caps, fuel, recipe_time);

    RecipeParameters {
        recipe_time,
        productivity,
        speed_bonus,
        fuel_usage_per_second_per_building: per_building,
        fuel_usage_per_second_per_recipe: per_recipe,
        pollution: entity.energy.emissions * recipe_time,
    }
}

fn effect_totals(
    catalog: &Catalog,
    recipe: &Recipe,
    caps: &CrafterCaps,
    modules: &[ModuleInstall],
    beacons: Option<&BeaconConfig>,
    research_speed_bonus: f64,
) -> (f64, f64) {
    let mut speed = 0.0;
    let mut productivity = caps.base_productivity;

    for install in modules {
        let Some(spec) = module_spec(catalog, install.module) else {
            continue;
        };
        if !module_accepted(&spec, caps.allowed_effects, recipe, install.module) {
            continue;
        }
        speed += spec.speed * install.count as f64;
        productivity += spec.productivity * install.count as f64;
    }

    if let Some(config) = beacons {
        if let Some(beacon_caps) = catalog.entity(config.beacon).beacon() {
            let mut beacon_speed = 0.0;
            for install in &config.modules {
                let Some(spec) = module_spec(catalog, install.module) else {
                    continue;
                };
                // Beacons transmit speed only; productivity modules do not
                // fit beacon slots.
                beacon_speed += spec.speed * install.count as f64;
            }
            speed += config.count as f64 * beacon_caps.efficiency * beacon_speed;
        }
    }

    if caps.is_lab {
        speed += research_speed_bonus;
    }

    (speed, productivity)
}

fn fuel_usage(
    catalog: &Catalog,
    entity: &crate::entity::Entity,
    caps: &CrafterCaps,
    fuel: Option<GoodsId>,
    recipe_time: f64,
) -> (f64, f64) {
    if !entity.energy.burns_fuel() {
        return (f64::NAN, f64::NAN);
    }
    let Some(fuel) = fuel else {
        return (f64::NAN, f64::NAN);
    };
    let fuel_value = catalog.goods(fuel).fuel_value();
    if fuel_value <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let per_building = caps.power / (fuel_value * entity.energy.effectivity);
    (per_building, per_building * recipe_time)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBuilder, EntitySpec, RecipeSpec};
    use crate::entity::{EnergyKind, EntityEnergy};
    use crate::goods::Item;
    use crate::recipe::{Ingredient, Product};

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
        recipe: RecipeId,
        furnace: EntityId,
        coal: GoodsId,
        speed_module: GoodsId,
    }

    fn fixture(crafting_speed: f64, fuel_kind: EnergyKind) -> Fixture {
        let mut b = CatalogBuilder::new();
        let ore = b.register_item("iron-ore", plain_item());
        let plate = b.register_item("iron-plate", plain_item());
        let coal = b.register_item(
            "coal",
            Item {
                fuel_value: 4.0,
                ..plain_item()
            },
        );
        let speed_module = b.register_item(
            "speed-module",
            Item {
                module: Some(ModuleSpec::speed_only(0.2)),
                ..plain_item()
            },
        );
        let furnace = b.register_entity(
            "furnace",
            EntitySpec {
                items_to_place: vec![plate],
                energy: EntityEnergy {
                    kind: fuel_kind,
                    effectivity: 1.0,
                    fuels: vec![coal],
                    ..EntityEnergy::void()
                },
                crafter: Some(CrafterCaps {
                    crafting_speed,
                    base_productivity: 0.0,
                    module_slots: 2,
                    allowed_effects: AllowedEffects::all(),
                    power: 0.15,
                    is_lab: false,
                }),
                ..EntitySpec::default()
            },
        );
        let recipe = b.register_recipe(
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
            recipe,
            furnace,
            coal,
            speed_module,
        }
    }

    #[test]
    fn base_recipe_time() {
        let f = fixture(1.0, EnergyKind::Electric);
        let p = calculate(&f.catalog, f.recipe, f.furnace, None, &[], None, 0.0);
        assert_eq!(p.recipe_time, 3.5);
        assert_eq!(p.productivity, 0.0);
        assert!(p.fuel_usage_per_second_per_recipe.is_nan());
    }

    #[test]
    fn crafting_speed_divides_time() {
        let f = fixture(2.0, EnergyKind::Electric);
        let p = calculate(&f.catalog, f.recipe, f.furnace, None, &[], None, 0.0);
        assert_eq!(p.recipe_time, 1.75);
    }

    #[test]
    fn speed_modules_stack() {
        let f = fixture(1.0, EnergyKind::Electric);
        let installs = [ModuleInstall {
            module: f.speed_module,
            count: 2,
        }];
        let p = calculate(&f.catalog, f.recipe, f.furnace, None, &installs, None, 0.0);
        assert!((p.speed_bonus - 0.4).abs() < 1e-12);
        assert!((p.recipe_time - 3.5 / 1.4).abs() < 1e-12);
    }

    #[test]
    fn solid_fuel_consumption_per_recipe() {
        // 150 kW burner, 4 MJ fuel: 0.15 / 4 * 3.5 = 0.13125 per recipe.
        let f = fixture(1.0, EnergyKind::SolidFuel);
        let p = calculate(&f.catalog, f.recipe, f.furnace, Some(f.coal), &[], None, 0.0);
        assert!((p.fuel_usage_per_second_per_building - 0.0375).abs() < 1e-12);
        assert!((p.fuel_usage_per_second_per_recipe - 0.13125).abs() < 1e-12);
    }

    #[test]
    fn fuel_unresolvable_yields_nan() {
        let f = fixture(1.0, EnergyKind::SolidFuel);
        let p = calculate(&f.catalog, f.recipe, f.furnace, None, &[], None, 0.0);
        assert!(p.fuel_usage_per_second_per_recipe.is_nan());
    }

    #[test]
    fn module_rejected_by_effect_set() {
        let spec = ModuleSpec::speed_only(0.5);
        let mut effects = AllowedEffects::all();
        effects.speed = false;
        let f = fixture(1.0, EnergyKind::Electric);
        let recipe = f.catalog.recipe(f.recipe);
        assert!(!module_accepted(&spec, effects, recipe, f.speed_module));
        assert!(module_accepted(
            &spec,
            AllowedEffects::all(),
            recipe,
            f.speed_module
        ));
    }

    #[test]
    fn module_rejected_by_recipe_allowlist() {
        let f = fixture(1.0, EnergyKind::Electric);
        let spec = ModuleSpec::speed_only(0.5);
        let recipe = f.catalog.recipe(f.recipe).clone();
        let mut restricted = recipe.clone();
        restricted.allowed_modules = Some(vec![]);
        assert!(!module_accepted(
            &spec,
            AllowedEffects::all(),
            &restricted,
            f.speed_module
        ));
        // Intersection: both crafter effects and recipe list must admit.
        let mut effects = AllowedEffects::all();
        effects.speed = false;
        assert!(!module_accepted(&spec, effects, &recipe, f.speed_module));
    }

    #[test]
    fn beacon_speed_applies() {
        let mut b = CatalogBuilder::new();
        let ore = b.register_item("ore", plain_item());
        let plate = b.register_item("plate", plain_item());
        let speed_module = b.register_item(
            "speed-module",
            Item {
                module: Some(ModuleSpec::speed_only(0.5)),
                ..plain_item()
            },
        );
        let beacon = b.register_entity(
            "beacon",
            EntitySpec {
                items_to_place: vec![plate],
                beacon: Some(crate::entity::BeaconCaps {
                    efficiency: 0.5,
                    module_slots: 2,
                }),
                ..EntitySpec::default()
            },
        );
        let assembler = b.register_entity(
            "assembler",
            EntitySpec {
                items_to_place: vec![plate],
                crafter: Some(CrafterCaps {
                    crafting_speed: 1.0,
                    base_productivity: 0.0,
                    module_slots: 4,
                    allowed_effects: AllowedEffects::all(),
                    power: 0.1,
                    is_lab: false,
                }),
                ..EntitySpec::default()
            },
        );
        let recipe = b.register_recipe(
            "plate",
            RecipeSpec {
                ingredients: vec![Ingredient::new(ore, 1.0)],
                products: vec![Product::simple(plate, 1.0)],
                time: 2.0,
                crafters: vec![assembler],
                ..RecipeSpec::default()
            },
        );
        let catalog = b.build().unwrap();
        let config = BeaconConfig {
            beacon,
            count: 2,
            modules: vec![ModuleInstall {
                module: speed_module,
                count: 2,
            }],
        };
        let p = calculate(&catalog, recipe, assembler, None, &[], Some(&config), 0.0);
        // 2 beacons * 0.5 efficiency * (2 * 0.5 speed) = 1.0 bonus.
        assert!((p.speed_bonus - 1.0).abs() < 1e-12);
        assert!((p.recipe_time - 1.0).abs() < 1e-12);
    }

    #[test]
    fn lab_gets_research_speed_bonus() {
        let mut b = CatalogBuilder::new();
        let pack = b.register_item("science-pack", plain_item());
        let lab = b.register_entity(
            "lab",
            EntitySpec {
                items_to_place: vec![pack],
                crafter: Some(CrafterCaps {
                    crafting_speed: 1.0,
                    base_productivity: 0.0,
                    module_slots: 2,
                    allowed_effects: AllowedEffects::all(),
                    power: 0.06,
                    is_lab: true,
                }),
                ..EntitySpec::default()
            },
        );
        let research = b.register_recipe(
            "research",
            RecipeSpec {
                ingredients: vec![Ingredient::new(pack, 1.0)],
                time: 60.0,
                crafters: vec![lab],
                ..RecipeSpec::default()
            },
        );
        let catalog = b.build().unwrap();
        let p = calculate(&catalog, research, lab, None, &[], None, 0.5);
        assert!((p.recipe_time - 40.0).abs() < 1e-12);
    }
}
