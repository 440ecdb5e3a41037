//! Error types.
//!
//! [`BridgeError`]s fail the command. [`AdvisoryError`]s come out of the
//! best-effort steps after an endpoint is committed, and are only ever logged.

use std::{io, path::PathBuf};

use thiserror::Error;
use wincni::error::CniError;

use crate::{hns::HnsError, network::NetworkType, proxy::ProxyError};

/// A failure of ADD or DEL.
#[derive(Debug, Error)]
pub enum BridgeError {
	/// Framework errors: parsing, delegation, result conversion.
	#[error(transparent)]
	Cni(#[from] CniError),

	#[error("cannot create endpoint without a namespace")]
	MissingNamespace,

	#[error("unsupported network type {0}")]
	UnsupportedNetworkType(String),

	#[error("invalid policy {0}: {1}")]
	InvalidPolicy(String, #[source] serde_json::Error),

	#[error("dual stack specified but l2bridge network {name} was not found: {err}")]
	DualStackNetworkMissing {
		name: String,
		#[source]
		err: HnsError,
	},

	#[error("dual stack specified with non l2bridge network (found {0})")]
	DualStackMismatch(NetworkType),

	#[error("{context}: {err}")]
	Hns {
		context: &'static str,
		#[source]
		err: HnsError,
	},

	#[error("ipam deletion failed, {0}")]
	IpamRelease(#[source] CniError),
}

impl BridgeError {
	pub(crate) fn hns(context: &'static str) -> impl FnOnce(HnsError) -> Self {
		move |err| Self::Hns { context, err }
	}
}

impl From<BridgeError> for CniError {
	fn from(err: BridgeError) -> Self {
		match err {
			BridgeError::Cni(err) => err,
			other => CniError::Generic(other.to_string()),
		}
	}
}

/// A failure in a best-effort step.
#[derive(Debug, Error)]
pub enum AdvisoryError {
	#[error("could not launch {}: {err}", .program.display())]
	Launch {
		program: PathBuf,
		#[source]
		err: io::Error,
	},

	#[error("{} exited with {status}: {output}", .program.display())]
	Failed {
		program: PathBuf,
		status: String,
		output: String,
	},

	#[error("proxy policy not applied: {0}")]
	ProxyPolicy(#[from] ProxyError),
}

#[cfg(test)]
mod tests {
	use semver::Version;

	use super::*;

	#[test]
	fn framework_errors_keep_their_code() {
		let err: CniError = BridgeError::Cni(CniError::MissingInput).into();
		assert_eq!(err.into_reply(Version::new(1, 0, 0)).code, 7);
	}

	#[test]
	fn plugin_errors_are_generic() {
		let reply = CniError::from(BridgeError::MissingNamespace).into_reply(Version::new(0, 4, 0));
		assert_eq!(reply.code, 100);
		assert!(reply.details.contains("namespace"));
	}

	#[test]
	fn release_failure_is_wrapped() {
		let err = BridgeError::IpamRelease(CniError::Generic("host-local: boom".into()));
		assert!(err.to_string().starts_with("ipam deletion failed, "));
	}
}
