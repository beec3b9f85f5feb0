//! Write boundary to the results store.
//!
//! The [`PersistenceGate`] validates what leaves the meter and hands it to a
//! [`SessionStore`] collaborator. Stores shipped here:
//! - [`MemoryStore`] for tests and dry runs
//! - [`FileStore`] appending JSON lines under the data directory
//! - `RestStore` for a PostgREST-style HTTP API (`gateway` feature)

pub mod file;
pub mod gate;
pub mod memory;

#[cfg(feature = "gateway")]
pub mod rest;

pub use file::FileStore;
pub use gate::{
    validate_measurements, MeasurementRow, PersistenceGate, SaveJob, SessionRow, SessionStore,
};
pub use memory::MemoryStore;

#[cfg(feature = "gateway")]
pub use rest::RestStore;
