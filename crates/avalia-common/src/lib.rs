//! Shared foundations for the Avalia multi-tenant core.
//!
//! Home of the pieces every service depends on: the flat key-value
//! substrate contract ([`StorageBackend`]), the clock abstraction used to
//! make TTL and retention logic testable, the explicit [`StoreScope`]
//! token that routes every storage call to a tenant namespace, and the
//! health-report types the services expose.

#![warn(missing_docs)]

pub mod backend;
pub mod clock;
pub mod health;
pub mod scope;

pub use backend::{BackendError, MemoryBackend, StorageBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use health::{HealthReport, HealthStatus};
pub use scope::StoreScope;
