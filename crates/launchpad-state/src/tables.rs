//! redb table definitions for the app registry.

use redb::TableDefinition;

/// App records keyed by app name, JSON-serialized.
pub const APPS: TableDefinition<&str, &[u8]> = TableDefinition::new("apps");
