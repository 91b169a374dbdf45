//! Accessibility facade. Milestone and tech-unlock analysis is an external
//! collaborator; the engines consume it through this trait only.

use crate::catalog::Catalog;
use crate::id::{GoodsId, ObjectId, TechId};

/// Predicates over the object graph supplied by the milestone analyzer.
pub trait Accessibility {
    /// Whether the object is obtainable at all under current progression.
    fn is_accessible(&self, object: ObjectId) -> bool;

    /// Whether the object becomes obtainable at the next milestone.
    fn is_accessible_at_next_milestone(&self, object: ObjectId) -> bool {
        self.is_accessible(object)
    }

    /// Project-wide research speed bonus applied to labs.
    fn research_speed_bonus(&self) -> f64 {
        0.0
    }

    /// The milestone gating this object, if any.
    fn highest_milestone(&self, _object: ObjectId) -> Option<TechId> {
        None
    }
}

/// Everything accessible. Used by tests and ungated projects.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullAccess;

impl Accessibility for FullAccess {
    fn is_accessible(&self, _object: ObjectId) -> bool {
        true
    }
}

/// Science-pack demand per goods: either the ingredient demand of a single
/// target technology, or the `amount * count` sum across all accessible
/// technologies when no target is chosen.
pub fn science_pack_usage(
    catalog: &Catalog,
    access: &dyn Accessibility,
    target: Option<TechId>,
) -> Vec<(GoodsId, f64)> {
    let mut usage: Vec<(GoodsId, f64)> = Vec::new();
    let mut add = |goods: GoodsId, amount: f64| {
        if let Some(entry) = usage.iter_mut().find(|(g, _)| *g == goods) {
            entry.1 += amount;
        } else {
            usage.push((goods, amount));
        }
    };

    match target {
        Some(tech) => {
            for ing in &catalog.technology(tech).ingredients {
                add(ing.goods, ing.amount);
            }
        }
        None => {
            for tech in catalog.all_technologies() {
                if !access.is_accessible(tech.object) {
                    continue;
                }
                for ing in &tech.ingredients {
                    add(ing.goods, ing.amount * tech.count);
                }
            }
        }
    }
    usage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogBuilder, TechnologySpec};
    use crate::goods::Item;
    use crate::recipe::Ingredient;

    #[test]
    fn full_access_admits_everything() {
        assert!(FullAccess.is_accessible(ObjectId(0)));
        assert!(FullAccess.is_accessible_at_next_milestone(ObjectId(42)));
        assert_eq!(FullAccess.research_speed_bonus(), 0.0);
    }

    #[test]
    fn science_usage_sums_over_technologies() {
        let mut b = CatalogBuilder::new();
        let red = b.register_item(
            "red-science",
            Item {
                stack_size: 200,
                fuel_value: 0.0,
                fuel_result: None,
                place_result: None,
                misc_source: None,
                module: None,
            },
        );
        let t1 = b.register_technology(
            "automation",
            TechnologySpec {
                ingredients: vec![Ingredient::new(red, 1.0)],
                time: 10.0,
                count: 10.0,
                ..TechnologySpec::default()
            },
        );
        b.register_technology(
            "logistics",
            TechnologySpec {
                ingredients: vec![Ingredient::new(red, 1.0)],
                time: 10.0,
                count: 20.0,
                ..TechnologySpec::default()
            },
        );
        let catalog = b.build().unwrap();

        let all = science_pack_usage(&catalog, &FullAccess, None);
        assert_eq!(all, vec![(red, 30.0)]);

        let targeted = science_pack_usage(&catalog, &FullAccess, Some(t1));
        assert_eq!(targeted, vec![(red, 1.0)]);
    }
}
