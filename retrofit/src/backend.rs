//! The seam between the backend-independent engine and one relational system.

use async_trait::async_trait;
use config::{AppRoleConfig, RetrofitOptions};
use errors::RetrofitError;
use space_core::{BackendKind, ForeignKey, Table, UniqueConstruct};
use strum::IntoStaticStr;

use crate::catalog::{ForeignKeyColumnRow, UniqueColumnRow};

/// One idempotent schema primitive. A backend renders each operation into a
/// statement batch through its [`crate::dialect::DdlDialect`].
#[derive(Debug, Clone, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum DdlOperation {
    EnsureApplicationRole(AppRoleConfig),
    AddTenantColumn(Table),
    SetTenantColumnDefault(Table),
    DropForeignKey(ForeignKey),
    WidenUniqueConstruct(UniqueConstruct),
    RecreateForeignKey(ForeignKey),
    InstallRowSecurity(Vec<Table>),
}

impl DdlOperation {
    /// Stable step name used in logs, metrics and errors.
    pub fn step(&self) -> &'static str {
        self.into()
    }

    /// Human-readable target of the operation.
    pub fn target(&self) -> String {
        match self {
            Self::EnsureApplicationRole(role) => role.name.clone(),
            Self::AddTenantColumn(table) | Self::SetTenantColumnDefault(table) => table.to_string(),
            Self::DropForeignKey(fk) | Self::RecreateForeignKey(fk) => {
                format!("{}.{}", fk.owning_table, fk.name)
            }
            Self::WidenUniqueConstruct(construct) => {
                format!("{}.{}", construct.table, construct.object_name())
            }
            Self::InstallRowSecurity(tables) => format!("{} tables", tables.len()),
        }
    }
}

/// A live connection to one relational system.
///
/// Catalog reads return the raw, unfiltered rows; grouping and filtering
/// happen in [`crate::catalog`] so every backend shares them.
#[async_trait]
pub trait SchemaBackend: Send {
    fn kind(&self) -> BackendKind;

    async fn read_tables(&mut self) -> Result<Vec<Table>, RetrofitError>;

    async fn read_unique_columns(&mut self) -> Result<Vec<UniqueColumnRow>, RetrofitError>;

    async fn read_foreign_key_columns(&mut self) -> Result<Vec<ForeignKeyColumnRow>, RetrofitError>;

    /// Executes `operations` in one transaction and returns the number of
    /// statements issued. Either every primitive commits or none does.
    async fn execute_atomic(
        &mut self,
        operations: &[DdlOperation],
        options: &RetrofitOptions,
    ) -> Result<usize, RetrofitError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_names() {
        let table = Table::new("public", "orders");
        assert_eq!(
            DdlOperation::AddTenantColumn(table.clone()).step(),
            "add_tenant_column"
        );
        assert_eq!(
            DdlOperation::InstallRowSecurity(vec![table]).step(),
            "install_row_security"
        );
    }
}
