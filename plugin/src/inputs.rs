use std::path::PathBuf;

use crate::{CniArgs, Command};

/// Everything the runtime gave us for one invocation.
///
/// The network configuration is kept as the raw standard input bytes: parsing
/// it is the plugin's first step, and some delegates must be handed exactly
/// what the runtime sent.
#[derive(Clone, Debug)]
pub struct Inputs {
	/// `CNI_COMMAND`.
	pub command: Command,

	/// `CNI_CONTAINERID`.
	pub container_id: String,

	/// `CNI_IFNAME`.
	pub ifname: String,

	/// `CNI_NETNS`, empty if the runtime didn't set it.
	pub netns: String,

	/// `CNI_ARGS`, empty if absent or unparseable.
	pub args: CniArgs,

	/// `CNI_PATH`.
	pub path: Vec<PathBuf>,

	/// The network configuration, verbatim.
	pub payload: Vec<u8>,
}
