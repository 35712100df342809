//! Evinit - Event-Store Database Provisioning
//!
//! Evinit provisions a new event-store database on a `PostgreSQL` server and
//! initializes its schema in one of two fixed roles: a **source** database
//! captures inserted events and emits change notifications, a **destination**
//! database stores events only.
//!
//! # Workflow
//! One provisioning pass per run, strictly sequential:
//! 1. Validate the request (database name grammar, table type)
//! 2. Check the administrative catalog for the name; abort if taken
//! 3. Issue the creation statement via the bootstrap database
//! 4. Build the events schema over a fresh connection to the new database
//!
//! There is no rollback of partially-applied DDL, no retry, and no support
//! for migrating an existing database. A failure mid-schema leaves the new
//! database with a partial schema; this is documented behavior.
//!
//! # Module Organization
//! - [`error`] - Error types and the stable error-kind taxonomy
//! - [`gateway`] - Connection descriptors and the gateway/handle traits
//! - [`catalog`] - Existence checking and database creation
//! - [`schema`] - Table types, DDL plans, and the schema builder
//! - [`provision`] - The orchestrator producing one result per run
//! - [`config`] - Configuration file loading and resolution

pub mod catalog;
pub mod config;
pub mod error;
pub mod gateway;
pub mod provision;
pub mod schema;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, ProvisionError, Result};
pub use gateway::{ConnectionDescriptor, Gateway, GatewayHandle, PgGateway, ADMIN_DATABASE};
pub use provision::{
    is_valid_database_name, Provisioner, ProvisioningRequest, ProvisioningResult,
};
pub use schema::{SchemaPlan, SqlTemplates, TableType};
