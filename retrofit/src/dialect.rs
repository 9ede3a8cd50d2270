//! Typed DDL builders, one per relational system.
//!
//! Every identifier is quoted by the dialect, never interpolated raw, so
//! catalog-supplied names cannot break out of the statement. The only
//! verbatim fragment is a filtered index predicate, which comes back from the
//! catalog already in the backend's own SQL.

use config::{AppRoleConfig, RetrofitOptions};
use space_core::{BackendKind, ForeignKey, ReferentialAction, Table, UniqueConstruct};

use crate::backend::DdlOperation;

/// Renders [`DdlOperation`]s into statement batches for one backend.
pub trait DdlDialect: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn quote_ident(&self, ident: &str) -> String;

    fn quote_literal(&self, value: &str) -> String;

    /// Parameterised statement the connection hook runs; binds the variable
    /// name then the tenant id.
    fn session_variable_statement(&self) -> &'static str;

    fn add_tenant_column(&self, table: &Table, options: &RetrofitOptions) -> Vec<String>;

    fn set_tenant_column_default(&self, table: &Table, options: &RetrofitOptions) -> Vec<String>;

    fn widen_unique_construct(
        &self,
        construct: &UniqueConstruct,
        options: &RetrofitOptions,
    ) -> Vec<String>;

    fn drop_foreign_key(&self, fk: &ForeignKey) -> Vec<String>;

    fn recreate_foreign_key(&self, fk: &ForeignKey, options: &RetrofitOptions) -> Vec<String>;

    fn install_row_security(&self, tables: &[Table], options: &RetrofitOptions) -> Vec<String>;

    fn ensure_application_role(&self, role: &AppRoleConfig) -> Vec<String>;

    fn qualified(&self, table: &Table) -> String {
        format!(
            "{}.{}",
            self.quote_ident(&table.schema),
            self.quote_ident(&table.name)
        )
    }

    /// Quotes a possibly schema-qualified object name such as `dbo.Policy`.
    fn quote_object_name(&self, name: &str) -> String {
        match name.split_once('.') {
            Some((schema, object)) => {
                format!("{}.{}", self.quote_ident(schema), self.quote_ident(object))
            }
            None => self.quote_ident(name),
        }
    }

    fn quote_list<'a, I>(&self, names: I) -> String
    where
        I: IntoIterator<Item = &'a str>,
        Self: Sized,
    {
        names
            .into_iter()
            .map(|n| self.quote_ident(n))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render(&self, operation: &DdlOperation, options: &RetrofitOptions) -> Vec<String>
    where
        Self: Sized,
    {
        match operation {
            DdlOperation::EnsureApplicationRole(role) => self.ensure_application_role(role),
            DdlOperation::AddTenantColumn(table) => self.add_tenant_column(table, options),
            DdlOperation::SetTenantColumnDefault(table) => {
                self.set_tenant_column_default(table, options)
            }
            DdlOperation::DropForeignKey(fk) => self.drop_foreign_key(fk),
            DdlOperation::WidenUniqueConstruct(construct) => {
                self.widen_unique_construct(construct, options)
            }
            DdlOperation::RecreateForeignKey(fk) => self.recreate_foreign_key(fk, options),
            DdlOperation::InstallRowSecurity(tables) => self.install_row_security(tables, options),
        }
    }
}

fn with_tenant<'a>(columns: &'a [String], tenant_column: &'a str) -> Vec<&'a str> {
    columns
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(tenant_column))
        .collect()
}

/// PostgreSQL: `uuid` tenant column, custom setting read through
/// `current_setting`, one forced row-level security policy per table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub const SESSION_VARIABLE_STATEMENT: &'static str = "SELECT set_config($1, $2, false)";

    fn session_value(&self, options: &RetrofitOptions) -> String {
        format!(
            "NULLIF(current_setting({}, true), '')::uuid",
            self.quote_literal(&options.session_variable)
        )
    }

    fn referential_actions(&self, fk: &ForeignKey) -> String {
        let on_delete = match fk.on_delete {
            // Limit the nulling to the original columns so the tenant column
            // keeps its value.
            ReferentialAction::SetNull | ReferentialAction::SetDefault => format!(
                "{} ({})",
                fk.on_delete.as_sql(),
                self.quote_list(fk.owning_columns.iter().map(String::as_str))
            ),
            action => action.as_sql().to_string(),
        };
        format!("ON DELETE {} ON UPDATE {}", on_delete, fk.on_update.as_sql())
    }
}

impl DdlDialect for PostgresDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn session_variable_statement(&self) -> &'static str {
        Self::SESSION_VARIABLE_STATEMENT
    }

    fn add_tenant_column(&self, table: &Table, options: &RetrofitOptions) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {} uuid NULL",
            self.qualified(table),
            self.quote_ident(&options.tenant_column)
        )]
    }

    fn set_tenant_column_default(&self, table: &Table, options: &RetrofitOptions) -> Vec<String> {
        let table = self.qualified(table);
        let column = self.quote_ident(&options.tenant_column);
        vec![
            format!("ALTER TABLE {table} ALTER COLUMN {column} DROP DEFAULT"),
            format!(
                "ALTER TABLE {table} ALTER COLUMN {column} SET DEFAULT {}",
                self.session_value(options)
            ),
        ]
    }

    fn widen_unique_construct(
        &self,
        construct: &UniqueConstruct,
        options: &RetrofitOptions,
    ) -> Vec<String> {
        let table = self.qualified(&construct.table);
        let included: Vec<&str> = construct
            .included_columns()
            .map(|c| c.name.as_str())
            .collect();
        let include = if included.is_empty() {
            String::new()
        } else {
            format!(" INCLUDE ({})", self.quote_list(included))
        };

        if construct.backed_by_constraint {
            let name = self.quote_ident(construct.object_name());
            let key = self.quote_list(
                construct
                    .key_columns_except(&options.tenant_column)
                    .map(|c| c.name.as_str())
                    .chain(std::iter::once(options.tenant_column.as_str())),
            );
            return vec![
                format!("ALTER TABLE {table} DROP CONSTRAINT IF EXISTS {name}"),
                format!("ALTER TABLE {table} ADD CONSTRAINT {name} UNIQUE ({key}){include}"),
            ];
        }

        let mut key: Vec<String> = construct
            .key_columns_except(&options.tenant_column)
            .map(|c| {
                let direction = if c.descending { " DESC" } else { "" };
                format!("{}{}", self.quote_ident(&c.name), direction)
            })
            .collect();
        key.push(self.quote_ident(&options.tenant_column));

        let predicate = construct
            .filter
            .as_deref()
            .map(|f| format!(" WHERE {f}"))
            .unwrap_or_default();

        vec![
            format!(
                "DROP INDEX IF EXISTS {}.{}",
                self.quote_ident(&construct.table.schema),
                self.quote_ident(&construct.name)
            ),
            format!(
                "CREATE UNIQUE INDEX {} ON {table} ({}){include}{predicate}",
                self.quote_ident(&construct.name),
                key.join(", ")
            ),
        ]
    }

    fn drop_foreign_key(&self, fk: &ForeignKey) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {}",
            self.qualified(&fk.owning_table),
            self.quote_ident(&fk.name)
        )]
    }

    fn recreate_foreign_key(&self, fk: &ForeignKey, options: &RetrofitOptions) -> Vec<String> {
        let mut statements = self.drop_foreign_key(fk);
        statements.push(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) {}",
            self.qualified(&fk.owning_table),
            self.quote_ident(&fk.name),
            self.quote_list(with_tenant(&fk.owning_columns, &options.tenant_column)),
            self.qualified(&fk.referenced_table),
            self.quote_list(with_tenant(&fk.referenced_columns, &options.tenant_column)),
            self.referential_actions(fk)
        ));
        statements
    }

    fn install_row_security(&self, tables: &[Table], options: &RetrofitOptions) -> Vec<String> {
        let policy = self.quote_ident(&options.policy_name);
        let predicate = format!(
            "{} = {}",
            self.quote_ident(&options.tenant_column),
            self.session_value(options)
        );
        let to_role = options
            .app_role
            .as_ref()
            .map(|role| format!(" TO {}", self.quote_ident(&role.name)))
            .unwrap_or_default();

        tables
            .iter()
            .flat_map(|table| {
                let table = self.qualified(table);
                [
                    format!("ALTER TABLE {table} ENABLE ROW LEVEL SECURITY"),
                    format!("ALTER TABLE {table} FORCE ROW LEVEL SECURITY"),
                    format!("DROP POLICY IF EXISTS {policy} ON {table}"),
                    format!(
                        "CREATE POLICY {policy} ON {table} AS PERMISSIVE FOR ALL{to_role} \
                         USING ({predicate}) WITH CHECK ({predicate})"
                    ),
                ]
            })
            .collect()
    }

    fn ensure_application_role(&self, role: &AppRoleConfig) -> Vec<String> {
        let name = self.quote_ident(&role.name);
        vec![
            format!(
                "DO $ownspace$ BEGIN \
                 IF NOT EXISTS (SELECT FROM pg_catalog.pg_roles WHERE rolname = {}) THEN \
                 CREATE ROLE {name}; \
                 END IF; \
                 END $ownspace$",
                self.quote_literal(&role.name)
            ),
            format!(
                "ALTER ROLE {name} WITH LOGIN NOBYPASSRLS PASSWORD {}",
                self.quote_literal(&role.password)
            ),
            format!("GRANT pg_read_all_data, pg_write_all_data TO {name}"),
        ]
    }
}

/// SQL Server: `UNIQUEIDENTIFIER` tenant column, `SESSION_CONTEXT` key, one
/// schema-bound security policy with a filter and an insert block predicate
/// per table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

impl SqlServerDialect {
    pub const SESSION_VARIABLE_STATEMENT: &'static str =
        "EXEC sp_set_session_context @key = @P1, @value = @P2, @read_only = 0";

    fn session_value(&self, options: &RetrofitOptions) -> String {
        format!(
            "CAST(SESSION_CONTEXT({}) AS UNIQUEIDENTIFIER)",
            self.quote_literal(&options.session_variable)
        )
    }

    fn object_id(&self, schema: &str, object: &str, kind: &str) -> String {
        format!(
            "OBJECT_ID({}, N'{kind}')",
            self.quote_literal(&format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(object)
            ))
        )
    }

    /// `df_{column}_{table}`, the name the tenant default is created under.
    pub fn default_constraint_name(table: &Table, options: &RetrofitOptions) -> String {
        format!("df_{}_{}", options.tenant_column, table.name)
    }

    fn action(action: ReferentialAction) -> &'static str {
        match action {
            // Not supported by SQL Server; NO ACTION is its equivalent.
            ReferentialAction::Restrict => ReferentialAction::NoAction.as_sql(),
            other => other.as_sql(),
        }
    }
}

impl DdlDialect for SqlServerDialect {
    fn kind(&self) -> BackendKind {
        BackendKind::SqlServer
    }

    fn quote_ident(&self, ident: &str) -> String {
        format!("[{}]", ident.replace(']', "]]"))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("N'{}'", value.replace('\'', "''"))
    }

    fn session_variable_statement(&self) -> &'static str {
        Self::SESSION_VARIABLE_STATEMENT
    }

    fn add_tenant_column(&self, table: &Table, options: &RetrofitOptions) -> Vec<String> {
        let qualified = self.qualified(table);
        vec![format!(
            "IF COL_LENGTH({}, {}) IS NULL ALTER TABLE {qualified} ADD {} UNIQUEIDENTIFIER NULL",
            self.quote_literal(&qualified),
            self.quote_literal(&options.tenant_column),
            self.quote_ident(&options.tenant_column)
        )]
    }

    fn set_tenant_column_default(&self, table: &Table, options: &RetrofitOptions) -> Vec<String> {
        let qualified = self.qualified(table);
        let drop_existing = format!(
            "DECLARE @df sysname = (SELECT dc.name FROM sys.default_constraints dc \
             JOIN sys.columns c ON c.object_id = dc.parent_object_id AND c.column_id = dc.parent_column_id \
             WHERE dc.parent_object_id = OBJECT_ID({}) AND c.name = {}); \
             IF @df IS NOT NULL BEGIN \
             DECLARE @drop nvarchar(max) = N'ALTER TABLE ' + {} + N' DROP CONSTRAINT ' + QUOTENAME(@df); \
             EXEC sp_executesql @drop; \
             END",
            self.quote_literal(&qualified),
            self.quote_literal(&options.tenant_column),
            self.quote_literal(&qualified)
        );
        vec![
            drop_existing,
            format!(
                "ALTER TABLE {qualified} ADD CONSTRAINT {} DEFAULT {} FOR {}",
                self.quote_ident(&Self::default_constraint_name(table, options)),
                self.session_value(options),
                self.quote_ident(&options.tenant_column)
            ),
        ]
    }

    fn widen_unique_construct(
        &self,
        construct: &UniqueConstruct,
        options: &RetrofitOptions,
    ) -> Vec<String> {
        let table = self.qualified(&construct.table);
        let mut key: Vec<String> = construct
            .key_columns_except(&options.tenant_column)
            .map(|c| {
                let direction = if c.descending { "DESC" } else { "ASC" };
                format!("{} {}", self.quote_ident(&c.name), direction)
            })
            .collect();
        key.push(format!("{} ASC", self.quote_ident(&options.tenant_column)));
        let key = key.join(", ");

        if construct.backed_by_constraint {
            let name = construct.object_name();
            return vec![
                format!(
                    "IF {} IS NOT NULL ALTER TABLE {table} DROP CONSTRAINT {}",
                    self.object_id(&construct.table.schema, name, "UQ"),
                    self.quote_ident(name)
                ),
                format!(
                    "ALTER TABLE {table} ADD CONSTRAINT {} UNIQUE ({key})",
                    self.quote_ident(name)
                ),
            ];
        }

        let included: Vec<&str> = construct
            .included_columns()
            .map(|c| c.name.as_str())
            .collect();
        let include = if included.is_empty() {
            String::new()
        } else {
            format!(" INCLUDE ({})", self.quote_list(included))
        };
        let predicate = construct
            .filter
            .as_deref()
            .map(|f| format!(" WHERE {f}"))
            .unwrap_or_default();
        let index = self.quote_ident(&construct.name);

        vec![
            format!("DROP INDEX IF EXISTS {index} ON {table}"),
            format!("CREATE UNIQUE INDEX {index} ON {table} ({key}){include}{predicate}"),
        ]
    }

    fn drop_foreign_key(&self, fk: &ForeignKey) -> Vec<String> {
        vec![format!(
            "IF {} IS NOT NULL ALTER TABLE {} DROP CONSTRAINT {}",
            self.object_id(&fk.owning_table.schema, &fk.name, "F"),
            self.qualified(&fk.owning_table),
            self.quote_ident(&fk.name)
        )]
    }

    fn recreate_foreign_key(&self, fk: &ForeignKey, options: &RetrofitOptions) -> Vec<String> {
        let mut statements = self.drop_foreign_key(fk);
        statements.push(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) \
             ON DELETE {} ON UPDATE {}",
            self.qualified(&fk.owning_table),
            self.quote_ident(&fk.name),
            self.quote_list(with_tenant(&fk.owning_columns, &options.tenant_column)),
            self.qualified(&fk.referenced_table),
            self.quote_list(with_tenant(&fk.referenced_columns, &options.tenant_column)),
            Self::action(fk.on_delete),
            Self::action(fk.on_update)
        ));
        statements
    }

    fn install_row_security(&self, tables: &[Table], options: &RetrofitOptions) -> Vec<String> {
        let policy = self.quote_object_name(&options.policy_name);
        let function = self.quote_object_name(&options.predicate_function);
        let column = self.quote_ident(&options.tenant_column);

        let mut statements = vec![
            format!("DROP SECURITY POLICY IF EXISTS {policy}"),
            format!(
                "CREATE OR ALTER FUNCTION {function}(@TenantId UNIQUEIDENTIFIER) \
                 RETURNS TABLE WITH SCHEMABINDING AS \
                 RETURN SELECT 1 AS fn_result WHERE @TenantId = {}",
                self.session_value(options)
            ),
        ];

        if tables.is_empty() {
            return statements;
        }

        let predicates: Vec<String> = tables
            .iter()
            .flat_map(|table| {
                let table = self.qualified(table);
                [
                    format!("ADD FILTER PREDICATE {function}({column}) ON {table}"),
                    format!("ADD BLOCK PREDICATE {function}({column}) ON {table} AFTER INSERT"),
                ]
            })
            .collect();

        statements.push(format!(
            "CREATE SECURITY POLICY {policy} {} WITH (STATE = ON, SCHEMABINDING = ON)",
            predicates.join(", ")
        ));
        statements
    }

    fn ensure_application_role(&self, _role: &AppRoleConfig) -> Vec<String> {
        Vec::new()
    }
}
