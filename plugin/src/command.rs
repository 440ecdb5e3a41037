use std::{collections::HashMap, str::FromStr};

use crate::error::{InvalidArgsError, InvalidCommandError};

/// Identifies the command given to a plugin.
///
/// The runtime passes this in `CNI_COMMAND`. Plugins built on this library
/// act on [`Add`][Command::Add] and [`Del`][Command::Del]; the loader answers
/// [`Version`][Command::Version] itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
	/// Provision the container's network endpoint.
	Add,

	/// Tear the container's network endpoint down.
	Del,

	/// Verify the container's networking is as expected.
	Check,

	/// Report the spec versions the plugin supports.
	Version,
}

impl FromStr for Command {
	type Err = InvalidCommandError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"ADD" => Ok(Self::Add),
			"DEL" => Ok(Self::Del),
			"CHECK" => Ok(Self::Check),
			"VERSION" => Ok(Self::Version),
			_ => Err(InvalidCommandError),
		}
	}
}

impl AsRef<str> for Command {
	fn as_ref(&self) -> &'static str {
		match self {
			Command::Add => "ADD",
			Command::Del => "DEL",
			Command::Check => "CHECK",
			Command::Version => "VERSION",
		}
	}
}

/// The legacy `CNI_ARGS` key-value list.
///
/// Kubernetes runtimes still use it to tell plugins which pod an invocation is
/// for, as `K8S_POD_NAMESPACE=ns;K8S_POD_NAME=name;...`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CniArgs(pub HashMap<String, String>);

impl CniArgs {
	/// Value of `K8S_POD_NAME`, if present and non-empty.
	pub fn pod_name(&self) -> Option<&str> {
		self.get_nonempty("K8S_POD_NAME")
	}

	/// Value of `K8S_POD_NAMESPACE`, if present and non-empty.
	pub fn pod_namespace(&self) -> Option<&str> {
		self.get_nonempty("K8S_POD_NAMESPACE")
	}

	fn get_nonempty(&self, key: &str) -> Option<&str> {
		self.0
			.get(key)
			.map(String::as_str)
			.filter(|v| !v.is_empty())
	}
}

impl FromStr for CniArgs {
	type Err = InvalidArgsError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		s.split(';')
			.filter(|p| !p.is_empty())
			.map(|p| {
				let mut pair = p.splitn(2, '=');
				match (pair.next(), pair.next()) {
					(Some(key), Some(value)) if !key.is_empty() => {
						Ok((key.to_string(), value.to_string()))
					}
					_ => Err(InvalidArgsError),
				}
			})
			.collect::<Result<HashMap<String, String>, _>>()
			.map(Self)
	}
}
