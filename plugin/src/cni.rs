use std::{
	env::{self, split_paths},
	io::{stdin, Read},
	path::PathBuf,
	str::FromStr,
};

use log::{debug, error, warn};
use regex::Regex;
use semver::Version;

use crate::{
	command::{CniArgs, Command},
	error::{CniError, EmptyValueError, RegexValueError},
	inputs::Inputs,
	reply::reply,
	version::{self, VersionPayload, VersionReply},
};

/// A CNI invocation, as read from the environment and standard input.
#[derive(Clone, Debug)]
pub enum Cni {
	/// The ADD command.
	Add(Inputs),

	/// The DEL command.
	///
	/// Must tolerate partially or entirely absent state.
	Del(Inputs),

	/// The CHECK command.
	Check(Inputs),

	/// The VERSION command, with the version the runtime speaks.
	///
	/// Never returned from [`Cni::load`], which answers it directly.
	Version(Version),
}

impl Cni {
	/// Read the invocation from the process environment and standard input.
	///
	/// `CNI_ARGS` is read best-effort: if it can't be parsed, a warning is
	/// logged and it's treated as empty.
	pub fn from_env() -> Result<Self, CniError> {
		let mut payload = Vec::with_capacity(1024);
		debug!("reading stdin til EOF...");
		stdin().read_to_end(&mut payload)?;
		debug!("read payload bytes={}", payload.len());

		Self::from_parts(require_env("CNI_COMMAND")?, payload)
	}

	fn from_parts(command: Command, payload: Vec<u8>) -> Result<Self, CniError> {
		if payload.is_empty() {
			return Err(CniError::MissingInput);
		}

		if let Command::Version = command {
			let config: VersionPayload = serde_json::from_slice(&payload)?;
			return Ok(Self::Version(config.cni_version));
		}

		let container_id: String = require_env("CNI_CONTAINERID")?;
		check_container_id(&container_id)?;

		let args = match load_env::<CniArgs>("CNI_ARGS") {
			Ok(args) => args.unwrap_or_default(),
			Err(err) => {
				warn!("ignoring CNI_ARGS: {}", err);
				CniArgs::default()
			}
		};

		let path = load_env::<String>("CNI_PATH")?
			.map(|p| split_paths(&p).map(PathBuf::from).collect())
			.unwrap_or_default();

		let inputs = Inputs {
			command,
			container_id,
			ifname: require_env("CNI_IFNAME")?,
			netns: load_env("CNI_NETNS")?.unwrap_or_default(),
			args,
			path,
			payload,
		};

		Ok(match command {
			Command::Add => Self::Add(inputs),
			Command::Del => Self::Del(inputs),
			Command::Check => Self::Check(inputs),
			Command::Version => unreachable!(),
		})
	}

	/// Load the invocation, replying directly to errors and to VERSION.
	///
	/// On error, an error reply is printed and the process exits. As the
	/// network configuration hasn't been parsed yet, the reply is in the
	/// current spec version.
	pub fn load() -> Self {
		debug!(
			"CNI plugin built with {} crate version {}",
			env!("CARGO_PKG_NAME"),
			env!("CARGO_PKG_VERSION")
		);

		match Self::from_env() {
			Err(e) => {
				error!("{}", e);
				reply(e.into_reply(version::current()))
			}
			Ok(Cni::Version(v)) => Self::handle_version(v),
			Ok(c) => c,
		}
	}

	fn handle_version(cni_version: Version) -> ! {
		debug!("replying to VERSION for runtime speaking {}", cni_version);
		reply(VersionReply {
			cni_version,
			supported_versions: version::supported(),
		})
	}
}

fn require_env<T>(var: &'static str) -> Result<T, CniError>
where
	T: FromStr,
	T::Err: std::error::Error + 'static,
{
	env::var(var)
		.map_err(|err| CniError::MissingEnv { var, err })
		.and_then(|val| {
			debug!("read env var {} = {:?}", var, val);
			val.parse().map_err(|err| CniError::InvalidEnv {
				var,
				err: Box::new(err),
			})
		})
}

fn load_env<T>(var: &'static str) -> Result<Option<T>, CniError>
where
	T: FromStr,
	T::Err: std::error::Error + 'static,
{
	require_env(var).map(Some).or_else(|err| {
		if let CniError::MissingEnv { .. } = err {
			Ok(None)
		} else {
			Err(err)
		}
	})
}

fn check_container_id(id: &str) -> Result<(), CniError> {
	if id.is_empty() {
		return Err(CniError::InvalidEnv {
			var: "CNI_CONTAINERID",
			err: Box::new(EmptyValueError),
		});
	}

	let re = Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.\-]*$")
		.map_err(|err| CniError::Generic(err.to_string()))?;
	if !re.is_match(id) {
		return Err(CniError::InvalidEnv {
			var: "CNI_CONTAINERID",
			err: Box::new(RegexValueError(re)),
		});
	}

	Ok(())
}
