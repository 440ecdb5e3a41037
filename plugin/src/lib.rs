#![warn(missing_docs)]

//! Library to write CNI plugins for Windows container networking.
//!
//! This is the shared plumbing of the Host Network Service plugins: loading
//! the CNI environment and payload, the Windows flavour of the network
//! configuration, replies in every CNI spec version a runtime may ask for, and
//! delegation to sub-plugins such as IPAM.
//!
//! # Quick start
//!
//! ```no_run
//! use wincni::{Cni, logger};
//! logger::install_logger("hello-world.log").ok();
//! match Cni::load() {
//!     Cni::Add(inputs) => {}
//!     Cni::Del(inputs) => {}
//!     Cni::Check(inputs) => {}
//!     Cni::Version(_) => unreachable!()
//! }
//! ```

pub use cni::Cni;
pub use command::{CniArgs, Command};
pub use delegation::delegate;
pub use inputs::Inputs;

pub mod config;
pub mod delegation;
pub mod error;
pub mod logger;
pub mod reply;
pub mod version;

mod cni;
mod command;
mod inputs;
