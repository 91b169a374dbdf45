//! The project container: catalog handle, pages, and planner settings.
//!
//! The catalog is shared read-only (`Arc`) so background solves can read
//! it without copying; project entities are owned by the arena and
//! mutated only between solves.

use crate::table::{PlanArena, TableKey};
use flowplan_core::catalog::Catalog;
use flowplan_core::id::TechId;
use std::sync::Arc;

/// Planner-wide settings read by both engines.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ProjectSettings {
    /// Research speed bonus applied to labs.
    pub research_speed_bonus: f64,
    /// Scales the pollution term of the logistics cost model.
    pub pollution_cost_modifier: f64,
    /// Science-pack demand target; `None` sums over all accessible techs.
    pub target_technology: Option<TechId>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            research_speed_bonus: 0.0,
            pollution_cost_modifier: 1.0,
            target_technology: None,
        }
    }
}

/// A planning project: one catalog, many pages.
#[derive(Debug)]
pub struct Project {
    pub catalog: Arc<Catalog>,
    pub arena: PlanArena,
    pub pages: Vec<TableKey>,
    pub settings: ProjectSettings,
}

impl Project {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            arena: PlanArena::new(),
            pages: Vec::new(),
            settings: ProjectSettings::default(),
        }
    }

    /// Create an empty page (a root production table).
    pub fn add_page(&mut self) -> TableKey {
        let table = self.arena.new_table();
        self.pages.push(table);
        table
    }

    /// Remove a page and drop its table tree from the arena.
    pub fn remove_page(&mut self, page: TableKey) {
        self.pages.retain(|&p| p != page);
        let mut pending = vec![page];
        while let Some(table) = pending.pop() {
            let Some(data) = self.arena.tables.remove(table) else {
                continue;
            };
            for link in data.links {
                self.arena.links.remove(link);
            }
            for row in data.rows {
                if let Some(row_data) = self.arena.rows.remove(row) {
                    if let Some(sub) = row_data.subgroup {
                        pending.push(sub);
                    }
                }
            }
        }
    }
}
