//! When CNI goes bad.

use std::env::VarError;

use regex::Regex;
use semver::Version;
use thiserror::Error;

use crate::reply::ErrorReply;

/// All errors emitted by this library, plus a few others.
#[derive(Debug, Error)]
pub enum CniError {
	/// Catch-all wrapper for I/O errors.
	#[error(transparent)]
	Io(#[from] std::io::Error),

	/// Catch-all wrapper for JSON serialization and deserialization.
	#[error(transparent)]
	Json(#[from] serde_json::Error),

	/// When the CNI version requested by the runtime is not supported.
	#[error("plugin does not understand CNI version: {0}")]
	Incompatible(Version),

	/// When nothing is provided on standard input.
	#[error("missing input network config")]
	MissingInput,

	/// When a delegated plugin doesn't output anything on standard output.
	#[error("missing plugin output")]
	MissingOutput,

	/// When a required environment variable is missing.
	#[error("missing environment variable: {var}: {err}")]
	MissingEnv {
		/// the variable name
		var: &'static str,

		/// the underlying error
		#[source]
		err: VarError,
	},

	/// When an environment variable couldn't be parsed or is invalid.
	#[error("environment variable has invalid format: {var}: {err}")]
	InvalidEnv {
		/// the variable name
		var: &'static str,

		/// the underlying error
		#[source]
		err: Box<dyn std::error::Error>,
	},

	/// When the current working directory cannot be obtained.
	#[error("cannot obtain current working directory")]
	NoCwd,

	/// When a sub-plugin cannot be found in `CNI_PATH`.
	#[error("missing (or not on CNI_PATH) plugin {name}: {err}")]
	MissingPlugin {
		/// the name of the plugin binary
		name: String,

		/// the underlying error
		#[source]
		err: which::Error,
	},

	/// Wrapper for errors in relation to a delegated plugin.
	#[error("with plugin {plugin}: {err}")]
	Delegated {
		/// the name of the plugin binary
		plugin: String,

		/// the underlying error
		err: Box<Self>,
	},

	/// A generic error as a string.
	#[error("{0}")]
	Generic(String),
}

impl CniError {
	/// Convert a CniError into an ErrorReply.
	///
	/// [`ErrorReply`]s can be used with [`reply`][crate::reply::reply], but
	/// require `cni_version` to be set to the input configuration's. This
	/// method makes it easier to create errors (including from `?`) and
	/// convert them at the end of the plugin run.
	pub fn into_reply(self, cni_version: Version) -> ErrorReply {
		match self {
			Self::Io(e) => ErrorReply {
				cni_version,
				code: 5,
				msg: "I/O error",
				details: e.to_string(),
			},
			Self::Json(e) => ErrorReply {
				cni_version,
				code: 6,
				msg: "Cannot decode JSON payload",
				details: e.to_string(),
			},
			e @ Self::Incompatible(_) => ErrorReply {
				cni_version,
				code: 1,
				msg: "Incompatible CNI version",
				details: e.to_string(),
			},
			e @ Self::MissingInput => ErrorReply {
				cni_version,
				code: 7,
				msg: "Missing payload",
				details: e.to_string(),
			},
			e @ Self::MissingOutput => ErrorReply {
				cni_version,
				code: 7,
				msg: "Missing output",
				details: e.to_string(),
			},
			e @ Self::MissingEnv { .. } => ErrorReply {
				cni_version,
				code: 4,
				msg: "Missing environment variable",
				details: e.to_string(),
			},
			e @ Self::InvalidEnv { .. } => ErrorReply {
				cni_version,
				code: 4,
				msg: "Invalid environment variable",
				details: e.to_string(),
			},
			e @ Self::NoCwd => ErrorReply {
				cni_version,
				code: 5,
				msg: "Bad workdir",
				details: e.to_string(),
			},
			e @ Self::MissingPlugin { .. } => ErrorReply {
				cni_version,
				code: 5,
				msg: "Missing plugin",
				details: e.to_string(),
			},
			e @ Self::Delegated { .. } => ErrorReply {
				cni_version,
				code: 11,
				msg: "Delegated",
				details: e.to_string(),
			},
			e @ Self::Generic(_) => ErrorReply {
				cni_version,
				code: 100,
				msg: "ERROR",
				details: e.to_string(),
			},
		}
	}
}

/// Underlying error used for an empty value that shouldn't be.
#[derive(Clone, Copy, Debug, Error)]
#[error("must not be empty")]
pub struct EmptyValueError;

/// Underlying error used for an invalid `CNI_COMMAND`.
#[derive(Clone, Copy, Debug, Error)]
#[error("must be one of ADD, DEL, CHECK, VERSION")]
pub struct InvalidCommandError;

/// Underlying error used for a malformed `CNI_ARGS`.
#[derive(Clone, Copy, Debug, Error)]
#[error("must be in K=V;L=W format")]
pub struct InvalidArgsError;

/// Underlying error used for a value that does not match a regex.
#[derive(Clone, Debug, Error)]
#[error("must match regex: {0}")]
pub struct RegexValueError(pub Regex);
