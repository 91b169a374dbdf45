//! Entities: buildings that can be placed in the world. A closed set of
//! kinds; crafter and beacon capabilities live in optional capability
//! structs rather than subtypes.

use crate::id::{EntityId, GoodsId, ObjectId};
use serde::{Deserialize, Serialize};

/// How an entity is powered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnergyKind {
    /// Consumes nothing (offshore pumps, free-running structures).
    Void,
    Electric,
    /// Heated through heat pipes.
    Heat,
    /// Burns item fuel.
    SolidFuel,
    /// Burns fluid fuel.
    FluidFuel,
    /// Consumes a hot fluid for its stored heat.
    FluidHeat,
    /// Powered by hand (early-game crafting).
    Labor,
}

/// Energy specification owned by an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEnergy {
    pub kind: EnergyKind,
    /// Pollution emitted per second at full load.
    pub emissions: f64,
    /// Constant draw in MW, paid even when idle.
    pub drain: f64,
    /// Fuel-to-work conversion efficiency, 1.0 = lossless.
    pub effectivity: f64,
    /// Upper bound on fuel units consumed per second, 0 = unlimited.
    pub fuel_consumption_limit: f64,
    /// Fluid temperature the entity can work with, for FluidHeat kinds.
    pub working_temperature: Option<(f64, f64)>,
    /// Fluid temperature accepted at the input.
    pub accepted_temperature: Option<(f64, f64)>,
    /// Goods burnable by this entity.
    pub fuels: Vec<GoodsId>,
}

impl EntityEnergy {
    pub fn void() -> Self {
        Self {
            kind: EnergyKind::Void,
            emissions: 0.0,
            drain: 0.0,
            effectivity: 1.0,
            fuel_consumption_limit: 0.0,
            working_temperature: None,
            accepted_temperature: None,
            fuels: Vec::new(),
        }
    }

    /// Whether this energy source consumes fuel goods at all.
    pub fn burns_fuel(&self) -> bool {
        matches!(
            self.kind,
            EnergyKind::SolidFuel | EnergyKind::FluidFuel | EnergyKind::FluidHeat
        )
    }
}

/// Module effects a crafter will accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedEffects {
    pub speed: bool,
    pub productivity: bool,
    pub consumption: bool,
    pub pollution: bool,
}

impl AllowedEffects {
    pub fn all() -> Self {
        Self {
            speed: true,
            productivity: true,
            consumption: true,
            pollution: true,
        }
    }

    pub fn none() -> Self {
        Self {
            speed: false,
            productivity: false,
            consumption: false,
            pollution: false,
        }
    }
}

/// Effect bundle carried by a module item. Zero effects are "not present"
/// for acceptance checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub speed: f64,
    pub productivity: f64,
    pub consumption: f64,
    pub pollution: f64,
    /// Recipes this module may be used with. Empty = unrestricted.
    pub limitation: Vec<crate::id::RecipeId>,
    /// Recipes this module must not be used with.
    pub blacklist: Vec<crate::id::RecipeId>,
}

impl ModuleSpec {
    pub fn speed_only(speed: f64) -> Self {
        Self {
            speed,
            productivity: 0.0,
            consumption: 0.0,
            pollution: 0.0,
            limitation: Vec::new(),
            blacklist: Vec::new(),
        }
    }
}

/// Capability struct for entities that execute recipes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrafterCaps {
    pub crafting_speed: f64,
    /// Built-in productivity bonus.
    pub base_productivity: f64,
    pub module_slots: u32,
    pub allowed_effects: AllowedEffects,
    /// Working power draw in MW.
    pub power: f64,
    /// Labs get the project-wide research speed bonus.
    pub is_lab: bool,
}

/// Capability struct for beacons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeaconCaps {
    /// Fraction of each module effect transmitted to neighbors.
    pub efficiency: f64,
    pub module_slots: u32,
}

/// The closed set of entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Crafter,
    Inserter,
    Accumulator,
    Belt,
    Reactor,
    Beacon,
    Container,
}

/// A placeable building.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub object: ObjectId,
    pub name: String,
    pub locale_name: String,
    pub kind: EntityKind,
    pub energy: EntityEnergy,
    /// Items that place this entity. Either non-empty or the entity is
    /// map-generated.
    pub items_to_place: Vec<GoodsId>,
    pub map_generated: bool,
    /// Resource density for map-generated entities.
    pub map_gen_density: f64,
    /// Footprint edge length in tiles, used by the logistics cost model.
    pub size: u32,
    pub crafter: Option<CrafterCaps>,
    pub beacon: Option<BeaconCaps>,
}

impl Entity {
    pub fn crafter(&self) -> Option<&CrafterCaps> {
        self.crafter.as_ref()
    }

    pub fn beacon(&self) -> Option<&BeaconCaps> {
        self.beacon.as_ref()
    }
}
