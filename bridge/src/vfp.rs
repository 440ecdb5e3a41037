//! The `vfprules.json` file shipped beside the plugin.
//!
//! It's shared with the VFP rule injector, which reads the routes, and with
//! the proxy policy applier, which reads the `hnsproxy` block.

use std::{
	fs,
	io,
	path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the rules, in the plugin's directory.
pub const RULES_FILE: &str = "vfprules.json";

/// Name of the injector executable, in the plugin's directory.
pub const INJECTOR: &str = "vfprules";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VfpRulesConfig {
	#[serde(default)]
	pub routes: Vec<VfpRoute>,

	/// OS version substrings the injector applies its rules on.
	#[serde(default)]
	pub vfpapi: Vec<String>,

	#[serde(default, alias = "hnsproxyconfig")]
	pub hnsproxy: HnsProxyConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VfpRoute {
	pub name: String,
	pub subnet: String,
	pub gateway: String,
	#[serde(default)]
	pub priority: String,
}

/// Proxy policy settings. Lists are comma-separated strings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct HnsProxyConfig {
	#[serde(default)]
	pub inboundproxyport: String,
	#[serde(default)]
	pub outboundproxyport: String,
	#[serde(default)]
	pub inboundportexceptions: String,
	#[serde(default)]
	pub inboundaddressexceptions: String,
	#[serde(default)]
	pub outboundportexceptions: String,
	#[serde(default)]
	pub outboundaddressexceptions: String,
}

#[derive(Debug, Error)]
pub enum VfpConfigError {
	#[error("unable to read {}: {err}", .path.display())]
	Read {
		path: PathBuf,
		#[source]
		err: io::Error,
	},

	#[error("unable to parse {}: {err}", .path.display())]
	Parse {
		path: PathBuf,
		#[source]
		err: serde_json::Error,
	},
}

impl VfpRulesConfig {
	/// Read `vfprules.json` from `dir`.
	pub fn load_from(dir: &Path) -> Result<Self, VfpConfigError> {
		let path = dir.join(RULES_FILE);
		let bytes = fs::read(&path).map_err(|err| VfpConfigError::Read {
			path: path.clone(),
			err,
		})?;
		serde_json::from_slice(&bytes).map_err(|err| VfpConfigError::Parse { path, err })
	}
}

/// Split a comma-separated list, ignoring blanks.
pub fn split_list(list: &str) -> Vec<String> {
	list.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(String::from)
		.collect()
}
