//! Events Schema Construction
//!
//! Builds the events schema inside the newly created database. The schema
//! comes in two fixed roles:
//! - `source` — events table, indexes, notification function, insert helper
//!   function, AFTER INSERT trigger, and a single-row `id` counter table
//! - `destination` — events table and indexes only
//!
//! The DDL is derived as an ordered, immutable plan; steps execute strictly
//! in order because later statements reference objects created by earlier
//! ones (the trigger cannot be created before its function exists).
//! A failure leaves the database with a partial schema; no compensating
//! teardown is attempted.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ProvisionError, Result};
use crate::gateway::GatewayHandle;

const CREATE_EVENTS_TABLE: &str = "\
CREATE TABLE events (
    id bigint NOT NULL,
    ts timestamp with time zone NOT NULL,
    entity_id uuid NOT NULL,
    event jsonb NOT NULL,
    CONSTRAINT events_pkey PRIMARY KEY (id)
)";

const CREATE_EVENT_NAME_INDEX: &str =
    "CREATE INDEX events_event_name ON events ((event #>> '{name}'))";

const CREATE_TS_INDEX: &str = "CREATE INDEX events_ts ON events (ts)";

const CREATE_ENTITY_ID_INDEX: &str = "CREATE INDEX events_entity_id ON events (entity_id)";

const CREATE_EVENTS_TRIGGER: &str = "\
CREATE TRIGGER events_table_trigger AFTER INSERT ON events \
FOR EACH ROW EXECUTE PROCEDURE events_notify_trigger()";

const CREATE_ID_TABLE: &str = "\
CREATE TABLE id (
    id bigint NOT NULL,
    CONSTRAINT id_pkey PRIMARY KEY (id)
)";

const SEED_ID_TABLE: &str = "INSERT INTO id (id) VALUES (1)";

/// Role of the events table in the new database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableType {
    /// Records inserted events and notifies listeners
    Source,
    /// Stores events only
    Destination,
}

impl TableType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Destination => "destination",
        }
    }
}

impl fmt::Display for TableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TableType {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" => Ok(Self::Source),
            "destination" => Ok(Self::Destination),
            other => Err(ProvisionError::validation(format!(
                "table-type is invalid: \"{other}\", must be \"source\" or \"destination\""
            ))),
        }
    }
}

/// Opaque SQL function bodies executed verbatim for the source role
///
/// The templates are external resources; the workflow never inspects or
/// rewrites them.
#[derive(Debug, Clone)]
pub struct SqlTemplates {
    /// Body of the `events_notify_trigger` function
    pub notify_trigger_function: String,

    /// Body of the `insert_events` helper function
    pub insert_events_function: String,
}

impl SqlTemplates {
    /// File name of the notification-function template
    pub const NOTIFY_TRIGGER_FILE: &'static str = "events_notify_trigger_function.sql";

    /// File name of the insert-helper template
    pub const INSERT_EVENTS_FILE: &'static str = "insert_events_function.sql";

    /// Load both templates from a directory
    pub fn load(dir: &Path) -> Result<Self> {
        Ok(Self {
            notify_trigger_function: read_template(dir, Self::NOTIFY_TRIGGER_FILE)?,
            insert_events_function: read_template(dir, Self::INSERT_EVENTS_FILE)?,
        })
    }
}

fn read_template(dir: &Path, file_name: &str) -> Result<String> {
    let path = dir.join(file_name);
    std::fs::read_to_string(&path).map_err(|e| {
        ProvisionError::config(format!("could not read SQL template {}: {e}", path.display()))
    })
}

/// Identity of one DDL object in the plan, used for logs and error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlObject {
    EventsTable,
    EventNameIndex,
    TsIndex,
    EntityIdIndex,
    NotifyTriggerFunction,
    InsertEventsFunction,
    EventsTableTrigger,
    IdTable,
    IdTableSeed,
}

impl DdlObject {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::EventsTable => "events table",
            Self::EventNameIndex => "events_event_name index",
            Self::TsIndex => "events_ts index",
            Self::EntityIdIndex => "events_entity_id index",
            Self::NotifyTriggerFunction => "events_notify_trigger function",
            Self::InsertEventsFunction => "insert_events function",
            Self::EventsTableTrigger => "events_table_trigger trigger",
            Self::IdTable => "id table",
            Self::IdTableSeed => "id table seed row",
        }
    }
}

/// One statement of the plan
#[derive(Debug, Clone)]
pub struct DdlStep {
    pub object: DdlObject,
    pub statement: String,
}

/// Ordered list of DDL operations for one table type
///
/// Derived deterministically from the table type and immutable once built.
#[derive(Debug, Clone)]
pub struct SchemaPlan {
    steps: Vec<DdlStep>,
}

impl SchemaPlan {
    /// Derive the plan for the given table type
    #[must_use]
    pub fn for_table_type(table_type: TableType, templates: &SqlTemplates) -> Self {
        let mut steps = vec![
            DdlStep { object: DdlObject::EventsTable, statement: CREATE_EVENTS_TABLE.into() },
            DdlStep {
                object: DdlObject::EventNameIndex,
                statement: CREATE_EVENT_NAME_INDEX.into(),
            },
            DdlStep { object: DdlObject::TsIndex, statement: CREATE_TS_INDEX.into() },
            DdlStep { object: DdlObject::EntityIdIndex, statement: CREATE_ENTITY_ID_INDEX.into() },
        ];

        if table_type == TableType::Source {
            steps.push(DdlStep {
                object: DdlObject::NotifyTriggerFunction,
                statement: templates.notify_trigger_function.clone(),
            });
            steps.push(DdlStep {
                object: DdlObject::InsertEventsFunction,
                statement: templates.insert_events_function.clone(),
            });
            steps.push(DdlStep {
                object: DdlObject::EventsTableTrigger,
                statement: CREATE_EVENTS_TRIGGER.into(),
            });
            steps.push(DdlStep { object: DdlObject::IdTable, statement: CREATE_ID_TABLE.into() });
            steps.push(DdlStep { object: DdlObject::IdTableSeed, statement: SEED_ID_TABLE.into() });
        }

        Self { steps }
    }

    #[must_use]
    pub fn steps(&self) -> &[DdlStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Execute the plan against a handle connected to the newly created database
///
/// Steps run sequentially; the first failure aborts the remainder and the
/// error names the failing object and the target database.
pub async fn build_schema<H: GatewayHandle>(handle: &H, plan: &SchemaPlan) -> Result<()> {
    for step in plan.steps() {
        match handle.execute(&step.statement).await {
            Ok(_) => {
                info!(database = %handle.database(), "{} created", step.object.name());
            }
            Err(ProvisionError::DdlExecution { database, detail, .. }) => {
                return Err(ProvisionError::ddl_execution(step.object.name(), database, detail));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
