//! Caller-supplied predicates selecting which tables take part in a retrofit.
//!
//! The engine never infers a filter. Only a [`Table`] (schema + name) is
//! available to the predicate; column-level detail is not.

use std::fmt;
use std::sync::Arc;

use crate::types::Table;

type Predicate = dyn Fn(&Table) -> bool + Send + Sync;

/// Composable `Table -> bool` predicate.
///
/// The named constructors compare case-insensitively, matching how the
/// reference deployment spells schema and table names in configuration.
#[derive(Clone)]
pub struct TableFilter {
    predicate: Arc<Predicate>,
}

impl TableFilter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Table) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    pub fn matches(&self, table: &Table) -> bool {
        (self.predicate)(table)
    }

    /// Accepts every table.
    pub fn everything() -> Self {
        Self::new(|_| true)
    }

    /// Rejects every table.
    pub fn nothing() -> Self {
        Self::new(|_| false)
    }

    /// True when every filter matches. An empty list matches everything.
    pub fn all(filters: Vec<TableFilter>) -> Self {
        Self::new(move |t| filters.iter().all(|f| f.matches(t)))
    }

    /// True when at least one filter matches. An empty list matches nothing.
    pub fn any(filters: Vec<TableFilter>) -> Self {
        Self::new(move |t| filters.iter().any(|f| f.matches(t)))
    }

    pub fn name_contains(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into().to_lowercase();
        Self::new(move |t| t.name.to_lowercase().contains(&phrase))
    }

    pub fn name_starts_with(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into().to_lowercase();
        Self::new(move |t| t.name.to_lowercase().starts_with(&phrase))
    }

    pub fn name_equals(name: impl Into<String>) -> Self {
        let name = name.into().to_lowercase();
        Self::new(move |t| t.name.to_lowercase() == name)
    }

    pub fn schema_contains(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into().to_lowercase();
        Self::new(move |t| t.schema.to_lowercase().contains(&phrase))
    }

    pub fn schema_starts_with(phrase: impl Into<String>) -> Self {
        let phrase = phrase.into().to_lowercase();
        Self::new(move |t| t.schema.to_lowercase().starts_with(&phrase))
    }

    pub fn schema_equals(schema: impl Into<String>) -> Self {
        let schema = schema.into().to_lowercase();
        Self::new(move |t| t.schema.to_lowercase() == schema)
    }

    /// Matches exactly one table, case-sensitively.
    pub fn table(table: Table) -> Self {
        Self::new(move |t| *t == table)
    }

    pub fn and(self, other: TableFilter) -> Self {
        Self::new(move |t| self.matches(t) && other.matches(t))
    }

    pub fn or(self, other: TableFilter) -> Self {
        Self::new(move |t| self.matches(t) || other.matches(t))
    }
}

impl std::ops::Not for TableFilter {
    type Output = TableFilter;

    fn not(self) -> Self::Output {
        TableFilter::new(move |t| !self.matches(t))
    }
}

impl Default for TableFilter {
    fn default() -> Self {
        Self::everything()
    }
}

impl fmt::Debug for TableFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableFilter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dbo(name: &str) -> Table {
        Table::new("dbo", name)
    }

    #[test]
    fn test_name_helpers_ignore_case() {
        assert!(TableFilter::name_contains("order").matches(&dbo("PurchaseOrders")));
        assert!(TableFilter::name_starts_with("purchase").matches(&dbo("PurchaseOrders")));
        assert!(TableFilter::name_equals("purchaseorders").matches(&dbo("PurchaseOrders")));
        assert!(!TableFilter::name_equals("Purchase").matches(&dbo("PurchaseOrders")));
    }

    #[test]
    fn test_schema_helpers_ignore_case() {
        let table = Table::new("SchemaA", "TableA");
        assert!(TableFilter::schema_equals("schemaa").matches(&table));
        assert!(TableFilter::schema_starts_with("SCH").matches(&table));
        assert!(TableFilter::schema_contains("maA").matches(&table));
        assert!(!TableFilter::schema_equals("SchemaB").matches(&table));
    }

    #[test]
    fn test_composition() {
        let filter = TableFilter::schema_equals("dbo")
            .and(!TableFilter::name_starts_with("__EF"))
            .or(TableFilter::table(Table::new("audit", "Log")));

        assert!(filter.matches(&dbo("Orders")));
        assert!(!filter.matches(&dbo("__EFMigrationsHistory")));
        assert!(filter.matches(&Table::new("audit", "Log")));
        assert!(!filter.matches(&Table::new("audit", "log")));
        assert!(!filter.matches(&Table::new("sales", "Orders")));
    }

    #[test]
    fn test_all_and_any() {
        let all = TableFilter::all(vec![
            TableFilter::schema_equals("dbo"),
            TableFilter::name_contains("a"),
        ]);
        assert!(all.matches(&dbo("TableA")));
        assert!(!all.matches(&dbo("Other")));
        assert!(TableFilter::all(vec![]).matches(&dbo("x")));

        let any = TableFilter::any(vec![
            TableFilter::name_equals("x"),
            TableFilter::name_equals("y"),
        ]);
        assert!(any.matches(&dbo("Y")));
        assert!(!any.matches(&dbo("z")));
        assert!(!TableFilter::any(vec![]).matches(&dbo("x")));
    }
}
