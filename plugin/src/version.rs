//! CNI spec versions: which ones we speak, and how they go over the wire.

use std::str::FromStr;

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{error::CniError, reply::ReplyPayload};

/// Spec versions this library can produce results for.
pub const SUPPORTED_VERSIONS: &[&str] = &[
	"0.1.0", "0.2.0", "0.3.0", "0.3.1", "0.4.0", "1.0.0", "1.1.0",
];

/// The version results are built in before conversion.
pub fn current() -> Version {
	Version::new(1, 0, 0)
}

/// Errors with [`CniError::Incompatible`] if `version` isn't supported.
pub fn check_version(version: &Version) -> Result<(), CniError> {
	if supported().iter().any(|v| v == version) {
		Ok(())
	} else {
		Err(CniError::Incompatible(version.clone()))
	}
}

pub(crate) fn supported() -> Vec<Version> {
	SUPPORTED_VERSIONS
		.iter()
		.filter_map(|v| Version::parse(v).ok())
		.collect()
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionPayload {
	#[serde(deserialize_with = "deserialize_version")]
	pub cni_version: Version,
}

/// Reply to the VERSION command.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionReply {
	/// The version the runtime asked with.
	#[serde(deserialize_with = "deserialize_version")]
	#[serde(serialize_with = "serialize_version")]
	pub cni_version: Version,

	/// Everything we can reply in.
	#[serde(deserialize_with = "deserialize_version_list")]
	#[serde(serialize_with = "serialize_version_list")]
	pub supported_versions: Vec<Version>,
}

impl ReplyPayload for VersionReply {}

pub(crate) fn serialize_version<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	version.to_string().serialize(serializer)
}

pub(crate) fn serialize_version_list<S>(
	list: &[Version],
	serializer: S,
) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	list.iter()
		.map(Version::to_string)
		.collect::<Vec<String>>()
		.serialize(serializer)
}

pub(crate) fn deserialize_version<'de, D>(deserializer: D) -> Result<Version, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;
	let j = String::deserialize(deserializer)?;
	Version::from_str(&j).map_err(Error::custom)
}

pub(crate) fn deserialize_version_list<'de, D>(deserializer: D) -> Result<Vec<Version>, D::Error>
where
	D: Deserializer<'de>,
{
	use serde::de::Error;
	let j = Vec::<String>::deserialize(deserializer)?;
	j.iter()
		.map(|s| Version::from_str(s).map_err(Error::custom))
		.collect()
}
