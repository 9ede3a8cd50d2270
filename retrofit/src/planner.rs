//! # Uniqueness Widening Planner
//!
//! Pure computation over a [`CatalogSnapshot`]: which tables get the tenant
//! column, which unique constructs are widened and which foreign keys are
//! dropped and rebuilt. Nothing here touches a database, so a plan that fails
//! validation leaves the schema untouched.

use std::collections::BTreeMap;

use errors::RetrofitError;
use serde::Serialize;
use space_core::{ForeignKey, Table, TableFilter, UniqueConstruct};

use crate::catalog::CatalogSnapshot;

/// Outcome of planning one retrofit run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrofitPlan {
    /// Tables that receive the tenant column, its default and row security.
    pub target_tables: Vec<Table>,
    pub constructs_to_widen: Vec<UniqueConstruct>,
    /// Constructs whose key already ends with the tenant column.
    pub already_widened: Vec<UniqueConstruct>,
    /// De-duplicated by `(owning_table, name)`.
    pub foreign_keys_to_rebuild: Vec<ForeignKey>,
}

impl RetrofitPlan {
    /// True when a run would only re-issue idempotent primitives.
    pub fn is_settled(&self) -> bool {
        self.constructs_to_widen.is_empty() && self.foreign_keys_to_rebuild.is_empty()
    }
}

/// Computes the plan for `filter` over `snapshot`.
///
/// # Errors
///
/// [`RetrofitError::ScopeViolation`] when a foreign key is owned by a table
/// outside the filter but references a table inside it. The first offending
/// key in `(owning_table, name)` order is reported.
pub fn plan_retrofit(
    snapshot: &CatalogSnapshot,
    filter: &TableFilter,
    tenant_column: &str,
) -> Result<RetrofitPlan, RetrofitError> {
    let target_tables = snapshot.tables_matching(filter);
    let is_target = |table: &Table| target_tables.binary_search(table).is_ok();

    let mut foreign_keys = snapshot.foreign_keys_matching(filter);
    foreign_keys.sort_by(|a, b| (&a.owning_table, &a.name).cmp(&(&b.owning_table, &b.name)));

    if let Some(fk) = foreign_keys
        .iter()
        .find(|fk| !is_target(&fk.owning_table) && is_target(&fk.referenced_table))
    {
        return Err(RetrofitError::ScopeViolation {
            foreign_key: fk.name.clone(),
            owning_table: fk.owning_table.to_string(),
            referenced_table: fk.referenced_table.to_string(),
        });
    }

    let mut constructs: Vec<UniqueConstruct> = snapshot
        .unique_constructs_matching(filter)
        .into_iter()
        .filter(|c| is_target(&c.table))
        .collect();
    constructs.sort_by(|a, b| (&a.table, a.object_name()).cmp(&(&b.table, b.object_name())));

    let (already_widened, constructs_to_widen): (Vec<_>, Vec<_>) = constructs
        .into_iter()
        .partition(|c| c.is_widened_by(tenant_column));

    let mut rebuild: BTreeMap<(Table, String), ForeignKey> = BTreeMap::new();
    for construct in &constructs_to_widen {
        for fk in foreign_keys.iter().filter(|fk| {
            fk.referenced_table == construct.table && construct.key_matches(&fk.referenced_columns)
        }) {
            rebuild
                .entry((fk.owning_table.clone(), fk.name.clone()))
                .or_insert_with(|| fk.clone());
        }
    }

    Ok(RetrofitPlan {
        target_tables,
        constructs_to_widen,
        already_widened,
        foreign_keys_to_rebuild: rebuild.into_values().collect(),
    })
}
