//! redb table definitions for the embedded store.
//!
//! Plain keys live in `VALUES`; set-valued keys live in the `SETS`
//! multimap table, one entry per member. A key may exist in both, the
//! same way a Redis `DEL` removes a key whatever its type.

use redb::{MultimapTableDefinition, TableDefinition};

/// Single-valued keys (`id.*`, `json.*`, `pod.*`, `port.*`).
pub const VALUES: TableDefinition<&str, &str> = TableDefinition::new("values");

/// Set-valued keys (`c.*`, `nodes`).
pub const SETS: MultimapTableDefinition<&str, &str> = MultimapTableDefinition::new("sets");
