//! Record store for the smart garden controller.
//!
//! The controller keeps a single status record per device and overwrites it
//! with each report. The dashboard reads the record and stages commands by
//! writing the record's `command` key, which the controller polls and clears.
//!
//! This crate provides that record store on top of SQLite.
//!
//! # Example
//!
//! ```no_run
//! use garden_store::Store;
//!
//! let store = Store::open("garden.db")?;
//! store.set_command("main_status", "PUMP_ON")?;
//!
//! if let Some(status) = store.find_status("main_status")? {
//!     println!("pump on: {:?}", status.snapshot.pump_on);
//! }
//! # Ok::<(), garden_store::Error>(())
//! ```

mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use store::{Store, StoredStatus};
