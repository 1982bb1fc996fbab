// SPDX-License-Identifier: Apache-2.0

// Schema introspection
// Catalog snapshots of databases, tables and columns

pub mod introspector;
pub mod types;

pub use introspector::{SchemaIntrospector, SYSTEM_DATABASES};
pub use types::{to_camel_case, SchemaColumn, SchemaDatabase, SchemaTable, TableListOptions};
