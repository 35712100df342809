//! Provisioning Orchestrator
//!
//! Sequences the workflow: validate the request, check that the target name
//! is free, create the database, build its schema. The steps run strictly in
//! order over the gateway; the bootstrap connection and the target-database
//! connection are never open at the same time, because the target does not
//! exist until creation succeeds.
//!
//! Exactly one [`ProvisioningResult`] is produced per run. This module is
//! the single place where a raised error becomes the final result.

use tracing::{error, info};

use crate::catalog::{create_database, database_exists};
use crate::error::{ErrorKind, ProvisionError, Result};
use crate::gateway::{ConnectionDescriptor, Gateway, GatewayHandle, ADMIN_DATABASE};
use crate::schema::{build_schema, SchemaPlan, SqlTemplates, TableType};

/// What to provision: a new database name and the role of its events table
#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    /// Name of the database to create; must be a valid unquoted identifier
    pub new_database: String,

    /// Role of the events table in the new database
    pub table_type: TableType,
}

impl ProvisioningRequest {
    #[must_use]
    pub fn new(new_database: impl Into<String>, table_type: TableType) -> Self {
        Self { new_database: new_database.into(), table_type }
    }

    /// Validate the request; runs before any network access
    pub fn validate(&self) -> Result<()> {
        if !is_valid_database_name(&self.new_database) {
            return Err(ProvisionError::validation(format!(
                "new-database is invalid: \"{}\"",
                self.new_database
            )));
        }
        Ok(())
    }
}

/// Whether `name` is a valid unquoted `PostgreSQL` identifier: first
/// character a letter or underscore, the rest letters, digits or underscores
#[must_use]
pub fn is_valid_database_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Terminal outcome of one provisioning run
#[derive(Debug, Clone)]
pub struct ProvisioningResult {
    /// Whether the full workflow completed
    pub succeeded: bool,

    /// One human-readable line describing success or the specific failure
    pub message: String,

    /// Error taxonomy kind, absent on success
    pub error_kind: Option<ErrorKind>,
}

impl ProvisioningResult {
    fn success(database: &str) -> Self {
        Self {
            succeeded: true,
            message: format!("Database \"{database}\" initialized successfully"),
            error_kind: None,
        }
    }

    fn failure(err: &ProvisionError) -> Self {
        Self { succeeded: false, message: err.message(), error_kind: Some(err.kind()) }
    }
}

/// Runs the provisioning workflow over a gateway
pub struct Provisioner<G: Gateway> {
    gateway: G,
    server: ConnectionDescriptor,
    templates: SqlTemplates,
}

impl<G: Gateway> Provisioner<G> {
    /// Create a provisioner for the server described by `server`
    ///
    /// The descriptor's `database` field is ignored; each step derives its
    /// own target from the same server parameters.
    #[must_use]
    pub fn new(gateway: G, server: ConnectionDescriptor, templates: SqlTemplates) -> Self {
        Self { gateway, server, templates }
    }

    /// Run one provisioning pass and produce the terminal result
    pub async fn run(&self, request: &ProvisioningRequest) -> ProvisioningResult {
        match self.provision(request).await {
            Ok(()) => {
                info!(database = %request.new_database, "provisioning completed");
                ProvisioningResult::success(&request.new_database)
            }
            Err(err) => {
                error!(database = %request.new_database, code = err.error_code(), "{err}");
                ProvisioningResult::failure(&err)
            }
        }
    }

    async fn provision(&self, request: &ProvisioningRequest) -> Result<()> {
        request.validate()?;

        let admin = self.server.with_database(ADMIN_DATABASE);

        // Existence check against the bootstrap database.
        info!(database = %request.new_database, "checking existence");
        let mut handle = self.gateway.acquire(&admin).await?;
        let existence = database_exists(&handle, &request.new_database).await;
        handle.release().await;
        if existence? {
            return Err(ProvisionError::already_exists(&request.new_database));
        }

        // Creation, also via the bootstrap database.
        info!(database = %request.new_database, "creating database");
        let mut handle = self.gateway.acquire(&admin).await?;
        let created = create_database(&handle, &request.new_database).await;
        handle.release().await;
        created?;

        // Schema build runs over a fresh handle to the new database.
        info!(database = %request.new_database, table_type = %request.table_type, "building schema");
        let plan = SchemaPlan::for_table_type(request.table_type, &self.templates);
        let target = self.server.with_database(&request.new_database);
        let mut handle = self.gateway.acquire(&target).await?;
        let built = build_schema(&handle, &plan).await;
        handle.release().await;
        built?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::{MockGateway, Reply, Script};
    use pretty_assertions::assert_eq;

    fn templates() -> SqlTemplates {
        SqlTemplates {
            notify_trigger_function: "CREATE FUNCTION events_notify_trigger() ...".to_string(),
            insert_events_function: "CREATE FUNCTION insert_events(...) ...".to_string(),
        }
    }

    fn provisioner(script: &Script) -> Provisioner<MockGateway> {
        Provisioner::new(
            MockGateway { script: script.clone() },
            ConnectionDescriptor::new("localhost", ADMIN_DATABASE),
            templates(),
        )
    }

    fn request(name: &str, table_type: TableType) -> ProvisioningRequest {
        ProvisioningRequest::new(name, table_type)
    }

    #[test]
    fn test_database_name_grammar() {
        for name in ["events_demo", "_private", "a", "Events2", "A_1_b"] {
            assert!(is_valid_database_name(name), "{name} should be valid");
        }
        for name in ["", "1db", "events-demo", "events demo", "db;drop", "événements"] {
            assert!(!is_valid_database_name(name), "{name} should be invalid");
        }
    }

    #[tokio::test]
    async fn test_invalid_name_fails_before_any_acquisition() {
        let script = Script::default();
        let result =
            provisioner(&script).run(&request("9bad-name", TableType::Source)).await;

        assert!(!result.succeeded);
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
        assert_eq!(script.acquires(), 0);
        assert_eq!(script.statements().len(), 0);
    }

    #[tokio::test]
    async fn test_existing_name_aborts_without_mutation() {
        let script = Script::new(vec![Reply::Rows(vec![Some(1)])]);
        let result =
            provisioner(&script).run(&request("events_demo", TableType::Source)).await;

        assert!(!result.succeeded);
        assert_eq!(result.error_kind, Some(ErrorKind::AlreadyExists));
        assert!(result.message.contains("events_demo"));

        // One acquisition, one release, and nothing but the catalog query.
        assert_eq!(script.acquires(), 1);
        assert_eq!(script.releases(), 1);
        let statements = script.statements();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].1.contains("pg_database"));
    }

    #[tokio::test]
    async fn test_destination_run_executes_statements_in_order() {
        let script = Script::new(vec![
            Reply::Rows(vec![]),  // existence check: absent
            Reply::Affected(0),   // CREATE DATABASE
            Reply::Affected(0),   // events table
            Reply::Affected(0),   // events_event_name index
            Reply::Affected(0),   // events_ts index
            Reply::Affected(0),   // events_entity_id index
        ]);
        let result =
            provisioner(&script).run(&request("events_demo", TableType::Destination)).await;

        assert!(result.succeeded, "{}", result.message);
        assert_eq!(result.error_kind, None);

        let statements = script.statements();
        assert_eq!(statements.len(), 6);

        // Admin steps run against the bootstrap database, schema steps
        // against the new one.
        assert_eq!(statements[0].0, ADMIN_DATABASE);
        assert_eq!(statements[1].0, ADMIN_DATABASE);
        for (database, _) in &statements[2..] {
            assert_eq!(database, "events_demo");
        }

        assert!(statements[0].1.contains("pg_database"));
        assert_eq!(statements[1].1, "CREATE DATABASE \"events_demo\"");
        assert!(statements[2].1.starts_with("CREATE TABLE events"));
        assert!(statements[3].1.contains("events_event_name"));
        assert!(statements[4].1.contains("events_ts"));
        assert!(statements[5].1.contains("events_entity_id"));

        assert_eq!(script.acquires(), 3);
        assert_eq!(script.releases(), 3);
        assert_eq!(script.dropped_unreleased(), 0);
    }

    #[tokio::test]
    async fn test_source_run_adds_functions_trigger_and_id_table() {
        let replies = std::iter::once(Reply::Rows(vec![]))
            .chain(std::iter::repeat_with(|| Reply::Affected(0)).take(10))
            .collect();
        let script = Script::new(replies);
        let result =
            provisioner(&script).run(&request("events_demo", TableType::Source)).await;

        assert!(result.succeeded, "{}", result.message);

        let statements = script.statements();
        assert_eq!(statements.len(), 11); // exists + create + 9 schema steps

        let templates = templates();
        assert_eq!(statements[6].1, templates.notify_trigger_function);
        assert_eq!(statements[7].1, templates.insert_events_function);
        assert!(statements[8].1.contains("CREATE TRIGGER events_table_trigger"));
        assert!(statements[8].1.contains("AFTER INSERT ON events"));
        assert!(statements[9].1.starts_with("CREATE TABLE id"));
        assert_eq!(statements[10].1, "INSERT INTO id (id) VALUES (1)");

        assert_eq!(script.acquires(), 3);
        assert_eq!(script.releases(), 3);
    }

    #[tokio::test]
    async fn test_invariant_violation_stops_the_run() {
        let script = Script::new(vec![Reply::Rows(vec![Some(1), Some(1)])]);
        let result =
            provisioner(&script).run(&request("events_demo", TableType::Source)).await;

        assert!(!result.succeeded);
        assert_eq!(result.error_kind, Some(ErrorKind::InvariantViolation));
        assert_eq!(script.statements().len(), 1);
        assert_eq!(script.releases(), script.acquires());
    }

    #[tokio::test]
    async fn test_acquire_failure_maps_to_connectivity() {
        let script = Script::default();
        script.fail_acquire_for(ADMIN_DATABASE);

        let result =
            provisioner(&script).run(&request("events_demo", TableType::Destination)).await;

        assert!(!result.succeeded);
        assert_eq!(result.error_kind, Some(ErrorKind::Connectivity));
        assert_eq!(script.acquires(), 0);
        assert_eq!(script.releases(), 0);
    }

    #[tokio::test]
    async fn test_target_acquire_failure_after_creation() {
        let script = Script::new(vec![Reply::Rows(vec![]), Reply::Affected(0)]);
        script.fail_acquire_for("events_demo");

        let result =
            provisioner(&script).run(&request("events_demo", TableType::Destination)).await;

        assert!(!result.succeeded);
        assert_eq!(result.error_kind, Some(ErrorKind::Connectivity));
        // Both admin handles were released even though the run failed later.
        assert_eq!(script.acquires(), 2);
        assert_eq!(script.releases(), 2);
    }

    #[tokio::test]
    async fn test_mid_schema_failure_releases_handle_and_names_object() {
        let script = Script::new(vec![
            Reply::Rows(vec![]),
            Reply::Affected(0), // CREATE DATABASE
            Reply::Affected(0), // events table
            Reply::Affected(0),
            Reply::Affected(0),
            Reply::Affected(0),
            Reply::Affected(0), // notify function
            Reply::Affected(0), // insert function
            Reply::Fail(ProvisionError::ddl_execution(
                "statement",
                "events_demo",
                "function does not exist",
            )),
        ]);
        let result =
            provisioner(&script).run(&request("events_demo", TableType::Source)).await;

        assert!(!result.succeeded);
        assert_eq!(result.error_kind, Some(ErrorKind::DdlExecution));
        assert!(result.message.contains("events_table_trigger trigger"));

        // The id table steps were never attempted; no compensating teardown
        // runs either, the partial schema is left in place.
        assert_eq!(script.statements().len(), 9);
        assert_eq!(script.acquires(), 3);
        assert_eq!(script.releases(), 3);
        assert_eq!(script.dropped_unreleased(), 0);
    }

    #[tokio::test]
    async fn test_exactly_one_result_per_run() {
        // Two independent runs over the same scripted history: the second
        // sees the database as existing, matching the concrete scenario.
        let script = Script::new(vec![
            Reply::Rows(vec![]),
            Reply::Affected(0),
            Reply::Affected(0),
            Reply::Affected(0),
            Reply::Affected(0),
            Reply::Affected(0),
            Reply::Rows(vec![Some(1)]),
        ]);
        let provisioner = provisioner(&script);
        let request = request("events_demo", TableType::Destination);

        let first = provisioner.run(&request).await;
        assert!(first.succeeded);

        let second = provisioner.run(&request).await;
        assert!(!second.succeeded);
        assert_eq!(second.error_kind, Some(ErrorKind::AlreadyExists));
    }
}
