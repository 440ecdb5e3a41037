//! Per-invocation settings, read once at process start.

use std::{
	env,
	path::{Path, PathBuf},
};

use log::debug;

/// Set to `true` to skip launching the VFP rule injector.
pub const NO_VFP_RULES_ENV: &str = "BRIDGE_NO_VFPRULES";

/// Set to `true` to apply HNS proxy policies after the endpoint is created.
pub const ENHANCED_SECURITY_ENV: &str = "BRIDGE_ENHANCED_SECURITY";

/// Switches for the post-commit phase of ADD.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Toggles {
	/// Launch the VFP rule injector for new endpoints. On unless disabled.
	pub vfp_rules: bool,

	/// Apply proxy policies and run the L4 proxy helper. Off unless enabled.
	pub enhanced_security: bool,
}

impl Default for Toggles {
	fn default() -> Self {
		Self {
			vfp_rules: true,
			enhanced_security: false,
		}
	}
}

impl Toggles {
	/// Read the toggles from the process environment.
	pub fn from_env() -> Self {
		Self::from_lookup(|var| env::var(var).ok())
	}

	/// Read the toggles through an arbitrary variable lookup.
	///
	/// Only the exact value `true` flips a toggle from its default.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let toggles = Self {
			vfp_rules: lookup(NO_VFP_RULES_ENV).as_deref() != Some("true"),
			enhanced_security: lookup(ENHANCED_SECURITY_ENV).as_deref() == Some("true"),
		};
		debug!("feature toggles: {:?}", toggles);
		toggles
	}
}

/// Everything the orchestrator needs to know about its own process.
#[derive(Clone, Debug)]
pub struct Settings {
	/// Plugin version, fixed at build time.
	pub version: &'static str,

	/// Feature toggles.
	pub toggles: Toggles,

	/// Directory holding `vfprules.json` and the sibling executables.
	pub sidecar_dir: PathBuf,
}

impl Settings {
	/// Settings for this process: build version, environment toggles, and the
	/// directory the running executable lives in.
	pub fn from_env() -> Self {
		let sidecar_dir = env::current_exe()
			.ok()
			.and_then(|exe| exe.parent().map(Path::to_path_buf))
			.unwrap_or_else(|| PathBuf::from("."));

		Self {
			version: env!("CARGO_PKG_VERSION"),
			toggles: Toggles::from_env(),
			sidecar_dir,
		}
	}

	/// Path of a sibling executable, if it exists.
	pub fn sidecar(&self, name: &str) -> Option<PathBuf> {
		let path = self
			.sidecar_dir
			.join(format!("{}{}", name, env::consts::EXE_SUFFIX));
		if path.is_file() {
			Some(path)
		} else {
			debug!("no {} beside the plugin", path.display());
			None
		}
	}
}
