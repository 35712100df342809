//! Administrative Catalog Operations
//!
//! Existence checking and database creation, both executed over a handle to
//! the bootstrap database. Neither operation retries; the caller releases
//! the handle regardless of outcome.

use tracing::info;

use crate::error::{ProvisionError, Result};
use crate::gateway::GatewayHandle;

/// Catalog query for the existence check. Returns at most one row per
/// database name, with indicator column `dbexists` = 1.
const EXISTS_STATEMENT: &str = "SELECT 1 AS dbexists FROM pg_database WHERE datname = $1";

/// Check whether `database_name` already exists on the server
///
/// Exactly two result shapes are accepted: zero rows (absent) and a single
/// row whose indicator equals 1 (present). Anything else means the catalog
/// returned something this tool does not understand, and is reported as an
/// invariant violation rather than coerced to a boolean.
pub async fn database_exists<H: GatewayHandle>(handle: &H, database_name: &str) -> Result<bool> {
    let indicators = handle.query_indicator(EXISTS_STATEMENT, database_name).await?;

    match indicators.as_slice() {
        [] => Ok(false),
        [Some(1)] => Ok(true),
        rows => Err(ProvisionError::invariant_violation(
            handle.database(),
            format!(
                "existence check for \"{database_name}\" returned an invalid result: {rows:?}"
            ),
        )),
    }
}

/// Issue the creation statement for `database_name`
///
/// On failure the error is annotated with the target database name and
/// propagated as-is in all other respects.
pub async fn create_database<H: GatewayHandle>(handle: &H, database_name: &str) -> Result<()> {
    let statement = format!("CREATE DATABASE \"{database_name}\"");

    match handle.execute(&statement).await {
        Ok(_) => {
            info!(database = %database_name, "database created");
            Ok(())
        }
        Err(ProvisionError::DdlExecution { detail, .. }) => {
            Err(ProvisionError::ddl_execution("database", database_name, detail))
        }
        Err(err) => Err(err),
    }
}
