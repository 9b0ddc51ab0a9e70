//! In-memory tenant/user/channel graph: the core stateful protocol engine.

mod channel;
mod connection;
mod tenant;
mod user;

pub use channel::{Channel, RoleSet, SchemaMeta, Topic};
pub use connection::{Connection, ConnectionHandle, RegState};
pub use tenant::{Tenant, TenantAwareRegistry, TenantRegistry};
pub use user::{AccessLevel, User};
