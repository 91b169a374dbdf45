//! The object catalog: built once after data load, immutable afterwards.
//!
//! Three-phase lifecycle mirroring the loader pipeline: registration ->
//! mutation -> finalization. `build()` validates every cross-reference,
//! groups fluid temperature variants, and resolves usage/production lists,
//! producing a frozen [`Catalog`] that is thread-safe to share.

use crate::entity::{Entity, EntityKind};
use crate::goods::{Fluid, Goods, GoodsDef, Item, Special};
use crate::id::{EntityId, GoodsId, ObjectId, RecipeId, TechId};
use crate::recipe::{Ingredient, Product, Recipe, Technology};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised while finalizing the catalog. All are fatal to data load.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("recipe {recipe} references unknown goods {goods:?}")]
    UnknownGoods { recipe: String, goods: GoodsId },
    #[error("recipe {recipe} references unknown entity {entity:?}")]
    UnknownEntity { recipe: String, entity: EntityId },
    #[error("recipe {0} has non-positive time and is not a marker")]
    NonPositiveTime(String),
    #[error("entity {0} is neither map-generated nor placeable by any item")]
    UnplaceableEntity(String),
    #[error("entity {0} has negative map-generation density")]
    NegativeDensity(String),
    #[error("technology {tech} references unknown recipe {recipe:?}")]
    UnknownUnlock { tech: String, recipe: RecipeId },
}

// ---------------------------------------------------------------------------
// Registration payloads
// ---------------------------------------------------------------------------

/// Recipe payload for registration. Ids are assigned by the builder.
#[derive(Debug, Clone)]
pub struct RecipeSpec {
    pub ingredients: Vec<Ingredient>,
    pub products: Vec<Product>,
    pub time: f64,
    pub enabled: bool,
    pub marker: bool,
    pub allowed_modules: Option<Vec<GoodsId>>,
    pub crafters: Vec<EntityId>,
    pub source_entity: Option<EntityId>,
    pub main_product: Option<GoodsId>,
}

impl Default for RecipeSpec {
    fn default() -> Self {
        Self {
            ingredients: Vec::new(),
            products: Vec::new(),
            time: 1.0,
            enabled: true,
            marker: false,
            allowed_modules: None,
            crafters: Vec::new(),
            source_entity: None,
            main_product: None,
        }
    }
}

/// Entity payload for registration.
#[derive(Debug, Clone)]
pub struct EntitySpec {
    pub kind: EntityKind,
    pub energy: crate::entity::EntityEnergy,
    pub items_to_place: Vec<GoodsId>,
    pub map_generated: bool,
    pub map_gen_density: f64,
    pub size: u32,
    pub crafter: Option<crate::entity::CrafterCaps>,
    pub beacon: Option<crate::entity::BeaconCaps>,
}

impl Default for EntitySpec {
    fn default() -> Self {
        Self {
            kind: EntityKind::Crafter,
            energy: crate::entity::EntityEnergy::void(),
            items_to_place: Vec::new(),
            map_generated: false,
            map_gen_density: 0.0,
            size: 3,
            crafter: None,
            beacon: None,
        }
    }
}

/// Technology payload for registration.
#[derive(Debug, Clone, Default)]
pub struct TechnologySpec {
    pub ingredients: Vec<Ingredient>,
    pub time: f64,
    pub count: f64,
    pub prerequisites: Vec<TechId>,
    pub unlock_recipes: Vec<RecipeId>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`Catalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    goods: Vec<Goods>,
    goods_by_name: HashMap<String, GoodsId>,
    recipes: Vec<Recipe>,
    recipes_by_name: HashMap<String, RecipeId>,
    entities: Vec<Entity>,
    entities_by_name: HashMap<String, EntityId>,
    technologies: Vec<Technology>,
    technologies_by_name: HashMap<String, TechId>,
    objects: Vec<ObjectRef>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_object(&mut self, target: ObjectRef) -> ObjectId {
        let id = ObjectId(self.objects.len() as u32);
        self.objects.push(target);
        id
    }

    fn register_goods(&mut self, name: &str, def: GoodsDef) -> GoodsId {
        let id = GoodsId(self.goods.len() as u32);
        let object = self.next_object(ObjectRef::Goods(id));
        self.goods.push(Goods {
            id,
            object,
            name: name.to_string(),
            locale_name: name.to_string(),
            def,
            map_generated_amount: None,
            usages: Vec::new(),
            production: Vec::new(),
        });
        self.goods_by_name.insert(name.to_string(), id);
        id
    }

    pub fn register_item(&mut self, name: &str, item: Item) -> GoodsId {
        self.register_goods(name, GoodsDef::Item(item))
    }

    pub fn register_fluid(&mut self, name: &str, fluid: Fluid) -> GoodsId {
        self.register_goods(name, GoodsDef::Fluid(fluid))
    }

    pub fn register_special(&mut self, name: &str, special: Special) -> GoodsId {
        self.register_goods(name, GoodsDef::Special(special))
    }

    pub fn register_recipe(&mut self, name: &str, spec: RecipeSpec) -> RecipeId {
        let id = RecipeId(self.recipes.len() as u32);
        let object = self.next_object(ObjectRef::Recipe(id));
        self.recipes.push(Recipe {
            id,
            object,
            name: name.to_string(),
            locale_name: name.to_string(),
            ingredients: spec.ingredients,
            products: spec.products,
            time: spec.time,
            enabled: spec.enabled,
            marker: spec.marker,
            allowed_modules: spec.allowed_modules,
            crafters: spec.crafters,
            source_entity: spec.source_entity,
            main_product: spec.main_product,
            unlocked_by: Vec::new(),
        });
        self.recipes_by_name.insert(name.to_string(), id);
        id
    }

    pub fn register_entity(&mut self, name: &str, spec: EntitySpec) -> EntityId {
        let id = EntityId(self.entities.len() as u32);
        let object = self.next_object(ObjectRef::Entity(id));
        self.entities.push(Entity {
            id,
            object,
            name: name.to_string(),
            locale_name: name.to_string(),
            kind: spec.kind,
            energy: spec.energy,
            items_to_place: spec.items_to_place,
            map_generated: spec.map_generated,
            map_gen_density: spec.map_gen_density,
            size: spec.size,
            crafter: spec.crafter,
            beacon: spec.beacon,
        });
        self.entities_by_name.insert(name.to_string(), id);
        id
    }

    pub fn register_technology(&mut self, name: &str, spec: TechnologySpec) -> TechId {
        let id = TechId(self.technologies.len() as u32);
        let object = self.next_object(ObjectRef::Technology(id));
        self.technologies.push(Technology {
            id,
            object,
            name: name.to_string(),
            locale_name: name.to_string(),
            ingredients: spec.ingredients,
            time: spec.time,
            count: spec.count,
            prerequisites: spec.prerequisites,
            unlock_recipes: spec.unlock_recipes,
        });
        self.technologies_by_name.insert(name.to_string(), id);
        id
    }

    pub fn goods_id(&self, name: &str) -> Option<GoodsId> {
        self.goods_by_name.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipes_by_name.get(name).copied()
    }

    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.entities_by_name.get(name).copied()
    }

    /// Phase 2: mutate a registered recipe by name.
    pub fn mutate_recipe<F>(&mut self, name: &str, f: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&mut Recipe),
    {
        let id = self
            .recipes_by_name
            .get(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        f(&mut self.recipes[id.0 as usize]);
        Ok(())
    }

    /// Phase 2: mutate a registered goods by name.
    pub fn mutate_goods<F>(&mut self, name: &str, f: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&mut Goods),
    {
        let id = self
            .goods_by_name
            .get(name)
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))?;
        f(&mut self.goods[id.0 as usize]);
        Ok(())
    }

    /// Phase 3: validate, resolve cross-references, and freeze.
    pub fn build(mut self) -> Result<Catalog, CatalogError> {
        let goods_len = self.goods.len();
        let entity_len = self.entities.len();

        for recipe in &self.recipes {
            for ing in &recipe.ingredients {
                if ing.goods.0 as usize >= goods_len {
                    return Err(CatalogError::UnknownGoods {
                        recipe: recipe.name.clone(),
                        goods: ing.goods,
                    });
                }
            }
            for product in &recipe.products {
                if product.goods.0 as usize >= goods_len {
                    return Err(CatalogError::UnknownGoods {
                        recipe: recipe.name.clone(),
                        goods: product.goods,
                    });
                }
            }
            for &crafter in &recipe.crafters {
                if crafter.0 as usize >= entity_len {
                    return Err(CatalogError::UnknownEntity {
                        recipe: recipe.name.clone(),
                        entity: crafter,
                    });
                }
            }
            if recipe.time <= 0.0 && !recipe.marker {
                return Err(CatalogError::NonPositiveTime(recipe.name.clone()));
            }
        }

        for entity in &self.entities {
            if entity.map_generated {
                if entity.map_gen_density < 0.0 {
                    return Err(CatalogError::NegativeDensity(entity.name.clone()));
                }
            } else if entity.items_to_place.is_empty() {
                return Err(CatalogError::UnplaceableEntity(entity.name.clone()));
            }
        }

        let recipe_len = self.recipes.len();
        for tech in &self.technologies {
            for &recipe in &tech.unlock_recipes {
                if recipe.0 as usize >= recipe_len {
                    return Err(CatalogError::UnknownUnlock {
                        tech: tech.name.clone(),
                        recipe,
                    });
                }
            }
        }

        // Group fluid temperature variants by original name, ascending.
        let mut variant_groups: HashMap<String, Vec<(f64, GoodsId)>> = HashMap::new();
        for goods in &self.goods {
            if let GoodsDef::Fluid(fluid) = &goods.def {
                variant_groups
                    .entry(fluid.original_name.clone())
                    .or_default()
                    .push((fluid.temperature, goods.id));
            }
        }
        for group in variant_groups.values_mut() {
            group.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        }
        for goods in &mut self.goods {
            if let GoodsDef::Fluid(fluid) = &mut goods.def {
                if let Some(group) = variant_groups.get(&fluid.original_name) {
                    fluid.variants = group.iter().map(|&(_, id)| id).collect();
                }
            }
        }

        // Resolve usage and production lists.
        for recipe in &self.recipes {
            for ing in &recipe.ingredients {
                let usages = &mut self.goods[ing.goods.0 as usize].usages;
                if !usages.contains(&recipe.id) {
                    usages.push(recipe.id);
                }
            }
            for product in &recipe.products {
                let production = &mut self.goods[product.goods.0 as usize].production;
                if !production.contains(&recipe.id) {
                    production.push(recipe.id);
                }
            }
        }

        // Resolve which technologies unlock each recipe.
        for tech in &self.technologies {
            for &recipe in &tech.unlock_recipes {
                let unlocked_by = &mut self.recipes[recipe.0 as usize].unlocked_by;
                if !unlocked_by.contains(&tech.id) {
                    unlocked_by.push(tech.id);
                }
            }
        }

        Ok(Catalog {
            goods: self.goods,
            goods_by_name: self.goods_by_name,
            recipes: self.recipes,
            recipes_by_name: self.recipes_by_name,
            entities: self.entities,
            entities_by_name: self.entities_by_name,
            technologies: self.technologies,
            technologies_by_name: self.technologies_by_name,
            objects: self.objects,
        })
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// What an [`ObjectId`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectRef {
    Goods(GoodsId),
    Recipe(RecipeId),
    Entity(EntityId),
    Technology(TechId),
}

/// Immutable object catalog. Frozen after [`CatalogBuilder::build`];
/// has no `&mut self` methods.
#[derive(Debug)]
pub struct Catalog {
    goods: Vec<Goods>,
    goods_by_name: HashMap<String, GoodsId>,
    recipes: Vec<Recipe>,
    recipes_by_name: HashMap<String, RecipeId>,
    entities: Vec<Entity>,
    entities_by_name: HashMap<String, EntityId>,
    technologies: Vec<Technology>,
    technologies_by_name: HashMap<String, TechId>,
    objects: Vec<ObjectRef>,
}

impl Catalog {
    pub fn goods(&self, id: GoodsId) -> &Goods {
        &self.goods[id.0 as usize]
    }

    pub fn recipe(&self, id: RecipeId) -> &Recipe {
        &self.recipes[id.0 as usize]
    }

    pub fn entity(&self, id: EntityId) -> &Entity {
        &self.entities[id.0 as usize]
    }

    pub fn technology(&self, id: TechId) -> &Technology {
        &self.technologies[id.0 as usize]
    }

    pub fn object_ref(&self, id: ObjectId) -> ObjectRef {
        self.objects[id.0 as usize]
    }

    pub fn goods_id(&self, name: &str) -> Option<GoodsId> {
        self.goods_by_name.get(name).copied()
    }

    pub fn recipe_id(&self, name: &str) -> Option<RecipeId> {
        self.recipes_by_name.get(name).copied()
    }

    pub fn entity_id(&self, name: &str) -> Option<EntityId> {
        self.entities_by_name.get(name).copied()
    }

    pub fn technology_id(&self, name: &str) -> Option<TechId> {
        self.technologies_by_name.get(name).copied()
    }

    pub fn goods_count(&self) -> usize {
        self.goods.len()
    }

    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn technology_count(&self) -> usize {
        self.technologies.len()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn all_goods(&self) -> impl Iterator<Item = &Goods> {
        self.goods.iter()
    }

    pub fn all_recipes(&self) -> impl Iterator<Item = &Recipe> {
        self.recipes.iter()
    }

    pub fn all_entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    pub fn all_technologies(&self) -> impl Iterator<Item = &Technology> {
        self.technologies.iter()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
