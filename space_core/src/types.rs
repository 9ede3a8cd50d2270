use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Relational system a schema lives in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    #[default]
    Postgres,
    #[serde(alias = "mssql")]
    #[strum(to_string = "sqlserver", serialize = "mssql")]
    SqlServer,
}

/// A table as returned by the system catalog.
///
/// Identity is the `(schema, name)` pair, compared case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
}

impl Table {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// One column of a unique construct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub descending: bool,
    /// Stored in the index payload only, not part of the uniqueness key.
    pub included: bool,
}

impl Column {
    pub fn key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
            included: false,
        }
    }

    pub fn descending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: true,
            included: false,
        }
    }

    pub fn included(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            descending: false,
            included: true,
        }
    }
}

/// A uniqueness guarantee on a table that is not its primary key.
///
/// `name` is the name of the backing index. When the guarantee is declared as
/// a constraint, `constraint_name` carries the constraint's own name, which is
/// what DDL must address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueConstruct {
    pub table: Table,
    pub name: String,
    pub columns: Vec<Column>,
    pub backed_by_constraint: bool,
    pub constraint_name: Option<String>,
    /// Predicate of a partial/filtered unique index, kept verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl UniqueConstruct {
    /// Columns taking part in the uniqueness key, in key order.
    pub fn key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.included)
    }

    /// Payload-only columns, in declaration order.
    pub fn included_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.included)
    }

    pub fn key_column_names(&self) -> Vec<&str> {
        self.key_columns().map(|c| c.name.as_str()).collect()
    }

    /// True when `tenant_column` is the last key column, the shape a widened
    /// construct has.
    pub fn is_widened_by(&self, tenant_column: &str) -> bool {
        self.key_columns()
            .last()
            .is_some_and(|c| c.name == tenant_column)
    }

    /// Key columns other than `tenant_column`, in key order.
    pub fn key_columns_except<'a>(
        &'a self,
        tenant_column: &'a str,
    ) -> impl Iterator<Item = &'a Column> + 'a {
        self.key_columns().filter(move |c| c.name != tenant_column)
    }

    /// Name DDL uses to drop and recreate this construct.
    pub fn object_name(&self) -> &str {
        match (self.backed_by_constraint, &self.constraint_name) {
            (true, Some(constraint)) => constraint,
            _ => &self.name,
        }
    }

    /// True when `columns` is the same set as this construct's key columns.
    pub fn key_matches(&self, columns: &[String]) -> bool {
        let mut key: Vec<&str> = self.key_column_names();
        let mut other: Vec<&str> = columns.iter().map(String::as_str).collect();
        key.sort_unstable();
        key.dedup();
        other.sort_unstable();
        other.dedup();
        key == other
    }
}

/// Referential action of a foreign key, preserved through a rebuild.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword sequence, identical on both supported backends.
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }

    /// Decodes PostgreSQL's `pg_constraint.confdeltype` / `confupdtype` codes.
    pub fn from_pg_code(code: &str) -> Self {
        match code {
            "r" => Self::Restrict,
            "c" => Self::Cascade,
            "n" => Self::SetNull,
            "d" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }

    /// Decodes SQL Server's `*_referential_action_desc` values.
    pub fn from_sqlserver_desc(desc: &str) -> Self {
        match desc {
            "CASCADE" => Self::Cascade,
            "SET_NULL" => Self::SetNull,
            "SET_DEFAULT" => Self::SetDefault,
            _ => Self::NoAction,
        }
    }
}

/// A foreign key. `owning_columns[i]` references `referenced_columns[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKey {
    pub name: String,
    pub owning_table: Table,
    pub owning_columns: Vec<String>,
    pub referenced_table: Table,
    pub referenced_columns: Vec<String>,
    #[serde(default)]
    pub on_delete: ReferentialAction,
    #[serde(default)]
    pub on_update: ReferentialAction,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn construct(columns: Vec<Column>) -> UniqueConstruct {
        UniqueConstruct {
            table: Table::new("public", "orders"),
            name: "ix_orders_number".to_string(),
            columns,
            backed_by_constraint: false,
            constraint_name: None,
            filter: None,
        }
    }

    #[test]
    fn test_table_display_and_identity() {
        let table = Table::new("dbo", "Orders");
        assert_eq!(table.to_string(), "dbo.Orders");
        assert_ne!(table, Table::new("dbo", "orders"));
        assert_eq!(table, Table::new("dbo", "Orders"));
    }

    #[test]
    fn test_key_columns_skip_included() {
        let c = construct(vec![
            Column::key("number"),
            Column::descending("placed_at"),
            Column::included("total"),
        ]);
        assert_eq!(c.key_column_names(), vec!["number", "placed_at"]);
        assert_eq!(c.included_columns().count(), 1);
        assert_eq!(
            c.key_columns_except("number")
                .map(|c| c.name.as_str())
                .collect::<Vec<_>>(),
            vec!["placed_at"]
        );
    }

    #[test]
    fn test_widened_only_when_tenant_column_is_last_key() {
        let widened = construct(vec![
            Column::key("number"),
            Column::key("tenant"),
            Column::included("total"),
        ]);
        assert!(widened.is_widened_by("tenant"));

        let tenant_first = construct(vec![Column::key("tenant"), Column::key("number")]);
        assert!(!tenant_first.is_widened_by("tenant"));

        let tenant_included = construct(vec![Column::key("number"), Column::included("tenant")]);
        assert!(!tenant_included.is_widened_by("tenant"));
    }

    #[test]
    fn test_key_matches_is_order_insensitive() {
        let c = construct(vec![Column::key("a"), Column::key("b")]);
        assert!(c.key_matches(&["b".to_string(), "a".to_string()]));
        assert!(!c.key_matches(&["a".to_string()]));
        assert!(!c.key_matches(&["a".to_string(), "b".to_string(), "c".to_string()]));
    }

    #[test]
    fn test_object_name_prefers_constraint() {
        let mut c = construct(vec![Column::key("a")]);
        assert_eq!(c.object_name(), "ix_orders_number");
        c.backed_by_constraint = true;
        c.constraint_name = Some("uq_orders_number".to_string());
        assert_eq!(c.object_name(), "uq_orders_number");
    }

    #[test]
    fn test_referential_action_codes() {
        assert_eq!(ReferentialAction::from_pg_code("c"), ReferentialAction::Cascade);
        assert_eq!(ReferentialAction::from_pg_code("a"), ReferentialAction::NoAction);
        assert_eq!(
            ReferentialAction::from_sqlserver_desc("SET_NULL"),
            ReferentialAction::SetNull
        );
        assert_eq!(ReferentialAction::SetDefault.as_sql(), "SET DEFAULT");
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("postgres".parse::<BackendKind>().unwrap(), BackendKind::Postgres);
        assert_eq!("SqlServer".parse::<BackendKind>().unwrap(), BackendKind::SqlServer);
        assert_eq!("mssql".parse::<BackendKind>().unwrap(), BackendKind::SqlServer);
        assert_eq!(BackendKind::SqlServer.to_string(), "sqlserver");
    }
}
