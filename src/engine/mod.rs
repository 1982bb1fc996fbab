// SPDX-License-Identifier: Apache-2.0

// Connection engine
// Single-connection access layer with nested transactions and auto-reconnect

pub mod connection;
pub mod connection_url;
pub mod drivers;
pub mod reconnect;
pub mod registry;
pub mod session;
pub mod stream;
pub mod traits;

pub use connection::{Connection, StatusInfo};
pub use connection_url::parse_connection_url;
pub use reconnect::ReconnectPolicy;
pub use registry::DriverRegistry;
pub use session::{ColumnCase, SessionOptions};
pub use stream::RowStream;
pub use traits::{Connector, DriverAttributes, PhysicalConnection};
