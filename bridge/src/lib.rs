//! CNI plugin attaching Windows containers to HNS networks.
//!
//! [`Bridge`] runs ADD and DEL against three seams, each with a real
//! implementation used by the binary and fakes used in tests:
//! - [`ResourceManager`]: networks and endpoints, [`Hns`] for real;
//! - [`IpamDelegate`]: address allocation, [`CniIpam`] for real;
//! - [`Spawner`]: sibling processes, [`ProcessSpawner`] for real.

pub use detached::{ProcessSpawner, Spawner};
pub use error::{AdvisoryError, BridgeError};
pub use hns::{Hns, HnsError, ResourceManager};
pub use ipam::{CniIpam, IpamDelegate};
pub use orchestrator::Bridge;
pub use settings::{Settings, Toggles};

pub mod detached;
pub mod error;
pub mod hns;
pub mod ipam;
pub mod network;
pub mod orchestrator;
pub mod policy;
pub mod proxy;
pub mod result;
pub mod settings;
pub mod vfp;

#[cfg(test)]
mod tests;
