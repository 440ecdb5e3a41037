//! Reply structures and helpers.
//!
//! Results are built in the current spec shape ([`SuccessReply`]) and then
//! converted with [`SuccessReply::into_version`] to whatever version the
//! configuration asked for. IPAM delegates may answer in any version, which
//! [`IpamSuccessReply::parse`] takes care of.

use std::{collections::HashMap, io::stdout, net::IpAddr, process::exit};

use ipnetwork::IpNetwork;
use log::debug;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::{
	config::{Dns, Route},
	error::CniError,
	version::check_version,
};

/// Something that can be written out as the plugin's final reply.
pub trait ReplyPayload: std::fmt::Debug + Serialize {
	/// The process exit code to go with it.
	fn code(&self) -> i32 {
		0
	}
}

/// An error reply.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReply {
	/// The spec version of the reply.
	#[serde(serialize_with = "crate::version::serialize_version")]
	pub cni_version: Version,

	/// The CNI error code; 1-99 are reserved by the spec.
	pub code: i32,

	/// A short message.
	pub msg: &'static str,

	/// The full error.
	pub details: String,
}

impl ReplyPayload for ErrorReply {
	fn code(&self) -> i32 {
		self.code
	}
}

/// A success reply, in the current spec version's shape.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessReply {
	/// The spec version of the reply.
	#[serde(deserialize_with = "crate::version::deserialize_version")]
	#[serde(serialize_with = "crate::version::serialize_version")]
	pub cni_version: Version,

	/// Interfaces created or configured.
	#[serde(default)]
	pub interfaces: Vec<InterfaceReply>,

	/// Addresses assigned.
	#[serde(default)]
	pub ips: Vec<IpReply>,

	/// Routes programmed.
	#[serde(default)]
	pub routes: Vec<Route>,

	/// DNS settings.
	#[serde(default)]
	pub dns: Dns,

	/// Custom fields.
	#[serde(flatten)]
	pub specific: HashMap<String, Value>,
}

impl SuccessReply {
	/// Convert to the shape of the given spec version.
	///
	/// 1.x is the native shape. 0.3.x and 0.4.0 tag every IP with its family.
	/// 0.1.0 and 0.2.0 have a single `ip4` and `ip6` each, with routes split by
	/// family, and no interfaces.
	pub fn into_version(self, version: &Version) -> Result<VersionedReply, CniError> {
		check_version(version)?;
		let mut value = serde_json::to_value(&self)?;
		value["cniVersion"] = Value::String(version.to_string());

		if version.major >= 1 {
			return Ok(VersionedReply(value));
		}

		if version.minor >= 3 {
			if let Some(ips) = value["ips"].as_array_mut() {
				for ip in ips {
					let family = match ip["address"].as_str().map(str::parse::<IpNetwork>) {
						Some(Ok(IpNetwork::V6(_))) => "6",
						_ => "4",
					};
					ip["version"] = Value::String(family.into());
				}
			}
			return Ok(VersionedReply(value));
		}

		let mut legacy = Map::new();
		legacy.insert("cniVersion".into(), Value::String(version.to_string()));
		for ip in &self.ips {
			let key = if ip.address.is_ipv4() { "ip4" } else { "ip6" };
			if legacy.contains_key(key) {
				continue;
			}

			let routes: Vec<&Route> = self
				.routes
				.iter()
				.filter(|r| r.dst.is_ipv4() == ip.address.is_ipv4())
				.collect();
			let mut entry = json!({ "ip": ip.address.to_string() });
			if let Some(gw) = ip.gateway {
				entry["gateway"] = Value::String(gw.to_string());
			}
			if !routes.is_empty() {
				entry["routes"] = serde_json::to_value(routes)?;
			}
			legacy.insert(key.into(), entry);
		}
		if !self.dns.is_empty() {
			legacy.insert("dns".into(), serde_json::to_value(&self.dns)?);
		}

		Ok(VersionedReply(Value::Object(legacy)))
	}
}

/// A success reply already converted to a particular spec version.
#[derive(Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct VersionedReply(pub Value);

impl ReplyPayload for VersionedReply {}

/// A success reply from an IPAM plugin: no interfaces.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamSuccessReply {
	/// The spec version of the reply.
	#[serde(deserialize_with = "crate::version::deserialize_version")]
	#[serde(serialize_with = "crate::version::serialize_version")]
	pub cni_version: Version,

	/// Addresses allocated.
	#[serde(default)]
	pub ips: Vec<IpReply>,

	/// Routes to program.
	#[serde(default)]
	pub routes: Vec<Route>,

	/// DNS settings.
	#[serde(default)]
	pub dns: Dns,

	/// Custom fields.
	#[serde(flatten)]
	pub specific: HashMap<String, Value>,
}

impl ReplyPayload for IpamSuccessReply {}

impl IpamSuccessReply {
	/// Parse an IPAM plugin's output, whatever spec version it is in.
	pub fn parse(output: &[u8]) -> Result<Self, CniError> {
		let value: Value = serde_json::from_slice(output)?;
		if value.get("ip4").is_some() || value.get("ip6").is_some() {
			debug!("IPAM reply is in the legacy ip4/ip6 shape");
			let legacy: LegacyIpamReply = serde_json::from_value(value)?;
			Ok(legacy.into())
		} else {
			Ok(serde_json::from_value(value)?)
		}
	}

	/// The first allocated IPv4 address.
	pub fn ip4(&self) -> Option<&IpReply> {
		self.ips.iter().find(|ip| ip.address.is_ipv4())
	}

	/// The first allocated IPv6 address.
	pub fn ip6(&self) -> Option<&IpReply> {
		self.ips.iter().find(|ip| ip.address.is_ipv6())
	}

	/// Routes whose destination is in the given family.
	pub fn routes_for(&self, ipv4: bool) -> impl Iterator<Item = &Route> {
		self.routes.iter().filter(move |r| r.dst.is_ipv4() == ipv4)
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyIpamReply {
	#[serde(deserialize_with = "crate::version::deserialize_version")]
	cni_version: Version,
	#[serde(default)]
	ip4: Option<LegacyIp>,
	#[serde(default)]
	ip6: Option<LegacyIp>,
	#[serde(default)]
	dns: Dns,
}

#[derive(Clone, Debug, Deserialize)]
struct LegacyIp {
	ip: IpNetwork,
	#[serde(default)]
	gateway: Option<IpAddr>,
	#[serde(default)]
	routes: Vec<Route>,
}

impl From<LegacyIpamReply> for IpamSuccessReply {
	fn from(legacy: LegacyIpamReply) -> Self {
		let mut ips = Vec::new();
		let mut routes = Vec::new();
		for ip in legacy.ip4.into_iter().chain(legacy.ip6) {
			ips.push(IpReply {
				address: ip.ip,
				gateway: ip.gateway,
				interface: None,
			});
			routes.extend(ip.routes);
		}

		Self {
			cni_version: legacy.cni_version,
			ips,
			routes,
			dns: legacy.dns,
			specific: Default::default(),
		}
	}
}

/// An interface in a success reply.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceReply {
	/// Name of the interface, as given in `CNI_IFNAME`.
	pub name: String,

	/// MAC address, if known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mac: Option<String>,

	/// Sandbox the interface lives in, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub sandbox: Option<String>,
}

/// An address in a success reply.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpReply {
	/// The address, with its prefix length.
	pub address: IpNetwork,

	/// The default gateway for this address, if any.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gateway: Option<IpAddr>,

	/// Index into the interfaces list; none for IPAM replies.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub interface: Option<usize>,
}

/// Write the reply to standard output and exit with its code.
pub fn reply<T>(result: T) -> !
where
	T: ReplyPayload,
{
	debug!("replying with {:#?}", result);
	serde_json::to_writer(stdout(), &result)
		.expect("Error writing result to stdout... chances are you won't get this either");

	exit(result.code());
}

/// Exit successfully without output, as DEL and CHECK do.
pub fn done() -> ! {
	debug!("exiting successfully without reply");
	exit(0);
}
