pub mod roster;
pub mod stats;

pub use roster::{RosterSync, RosterSyncConfig};
