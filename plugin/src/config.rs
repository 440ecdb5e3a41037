//! Configuration structures.
//!
//! You’ll want to start with [`NetworkConfig`]. The shape is the one Windows
//! runtimes hand to HNS-backed plugins: the usual CNI fields, plus an
//! `optionalFlags` bundle, static `AdditionalRoutes`, and raw HNS policies in
//! `AdditionalArgs`.

use std::{collections::HashMap, net::IpAddr};

use ipnetwork::IpNetwork;
use log::debug;
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::CniError, version::check_version};

/// Top-level network configuration, as provided on standard input.
///
/// Unknown top-level fields are collected into `specific`, so that the
/// configuration can be reserialized for delegates without losing anything
/// they might need.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
	/// Version of the CNI spec to which this configuration conforms.
	///
	/// Replies must be produced in this version.
	#[serde(deserialize_with = "crate::version::deserialize_version")]
	#[serde(serialize_with = "crate::version::serialize_version")]
	pub cni_version: Version,

	/// Name of the network.
	///
	/// On Windows this is also the name of the HNS network backing it.
	pub name: String,

	/// Name of the top-level plugin binary on disk.
	///
	/// This is called `type` in the JSON, and selects the HNS network type.
	#[serde(rename = "type")]
	pub plugin: String,

	/// IP Address Management sub-config.
	///
	/// If present with a non-empty `type`, that plugin is invoked via
	/// delegation to allocate addresses.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ipam: Option<IpamConfig>,

	/// DNS settings sourced from the administrative configuration.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dns: Option<Dns>,

	/// Windows-specific behaviour switches.
	#[serde(default)]
	pub optional_flags: OptionalFlags,

	/// Dynamic information provided by the runtime.
	#[serde(
		default,
		rename = "runtimeConfig",
		skip_serializing_if = "Option::is_none"
	)]
	pub runtime: Option<RuntimeConfig>,

	/// Static routes to program on the endpoint.
	///
	/// With [`OptionalFlags::gateway_from_additional_routes`], default routes
	/// in this list also supply the endpoint's gateways.
	#[serde(
		default,
		rename = "AdditionalRoutes",
		skip_serializing_if = "Vec::is_empty"
	)]
	pub additional_routes: Vec<Route>,

	/// Raw HNS policies, each tagged with where it applies.
	#[serde(
		default,
		rename = "AdditionalArgs",
		skip_serializing_if = "Vec::is_empty"
	)]
	pub additional_args: Vec<PolicyArg>,

	/// Custom top-level fields.
	#[serde(flatten)]
	pub specific: HashMap<String, Value>,
}

impl NetworkConfig {
	/// Parse a configuration from the raw standard input bytes.
	///
	/// The plugin type is normalised first (see [`normalize_plugin_type`]), and
	/// the CNI version checked against the supported versions.
	pub fn from_slice(payload: &[u8]) -> Result<Self, CniError> {
		let normalized = normalize_plugin_type(payload);
		let config: Self = serde_json::from_slice(&normalized)?;
		check_version(&config.cni_version)?;
		Ok(config)
	}

	/// Name of the IPAM plugin to delegate to, if any.
	pub fn ipam_plugin(&self) -> Option<&str> {
		self.ipam
			.as_ref()
			.map(|ipam| ipam.plugin.as_str())
			.filter(|p| !p.is_empty())
	}

	/// Port mappings requested by the runtime.
	pub fn port_mappings(&self) -> &[PortMapping] {
		self.runtime
			.as_ref()
			.map(|rt| rt.port_mappings.as_slice())
			.unwrap_or_default()
	}
}

/// Rewrite a Linux-style `"type": "bridge"` to `"type": "sdnbridge"`.
///
/// Configurations written for Linux name the plugin `bridge`, while HNS wants
/// an L2Bridge network, which the Windows plugin calls `sdnbridge`. Only the
/// first occurrence is rewritten: that's the top-level type, as the IPAM block
/// comes after it in every configuration we've seen.
pub fn normalize_plugin_type(payload: &[u8]) -> Vec<u8> {
	let text = String::from_utf8_lossy(payload);
	for pattern in &[r#""type": "bridge""#, r#""type":"bridge""#] {
		if let Some(at) = text.find(pattern) {
			debug!("normalising plugin type bridge -> sdnbridge");
			let replacement = pattern.replace("bridge", "sdnbridge");
			let mut out = String::with_capacity(text.len() + 3);
			out.push_str(&text[..at]);
			out.push_str(&replacement);
			out.push_str(&text[at + pattern.len()..]);
			return out.into_bytes();
		}
	}

	payload.to_vec()
}

/// IP Address Management configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpamConfig {
	/// Name of the IPAM plugin binary on disk.
	///
	/// This is called `type` in the JSON.
	#[serde(rename = "type", default)]
	pub plugin: String,

	/// Subnet the network is carved from.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subnet: Option<IpNetwork>,

	/// Routes the IPAM plugin should hand out.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub routes: Vec<Route>,

	/// All other IPAM fields, for the IPAM plugin to interpret.
	#[serde(flatten)]
	pub specific: HashMap<String, Value>,
}

/// A route: destination and optional gateway.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
	/// Destination prefix.
	pub dst: IpNetwork,

	/// Next hop, if not on-link.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub gw: Option<IpAddr>,
}

/// DNS configuration or settings.
///
/// Windows configurations often capitalise the keys; both forms are read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dns {
	/// Priority-ordered list of nameservers.
	#[serde(default, alias = "Nameservers", skip_serializing_if = "Vec::is_empty")]
	pub nameservers: Vec<IpAddr>,

	/// The local domain used for short hostname lookups.
	#[serde(default, alias = "Domain", skip_serializing_if = "Option::is_none")]
	pub domain: Option<String>,

	/// Priority-ordered list of search domains.
	#[serde(default, alias = "Search", skip_serializing_if = "Vec::is_empty")]
	pub search: Vec<String>,

	/// Options passed to the resolver.
	#[serde(default, alias = "Options", skip_serializing_if = "Vec::is_empty")]
	pub options: Vec<String>,
}

impl Dns {
	/// True if nothing is set at all.
	pub fn is_empty(&self) -> bool {
		self.nameservers.is_empty()
			&& self.domain.is_none()
			&& self.search.is_empty()
			&& self.options.is_empty()
	}
}

/// Windows-specific behaviour switches, all off by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionalFlags {
	/// Port mappings are routed locally rather than through the switch.
	#[serde(default, rename = "localRoutedPortMapping")]
	pub local_routed_port_mapping: bool,

	/// Accepted for compatibility with existing configurations; it has no
	/// effect, port mappings always become `PortMapping` policies.
	#[serde(default)]
	pub allow_acl_port_mapping: bool,

	/// Use the `.2` address of the allocated subnet as the IPv4 gateway.
	#[serde(default)]
	pub force_bridge_gateway: bool,

	/// Provision IPv4 and IPv6 on the endpoint.
	///
	/// The network must then already exist, and be an L2Bridge.
	#[serde(default)]
	pub enable_dual_stack: bool,

	/// Take gateways from default routes in `AdditionalRoutes`.
	#[serde(default)]
	pub gateway_from_additional_routes: bool,

	/// Attach a loopback DSR policy for the endpoint's own address.
	#[serde(default, rename = "loopbackDSR")]
	pub loopback_dsr: bool,
}

/// Dynamic information provided by the runtime.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
	/// Port mappings from host to container to set up.
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub port_mappings: Vec<PortMapping>,

	/// DNS configuration set by the runtime, e.g. the cluster DNS.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub dns: Option<Dns>,

	/// Custom runtime fields.
	#[serde(flatten)]
	pub specific: HashMap<String, Value>,
}

/// Port mapping entry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
	/// Port on the host.
	pub host_port: u16,

	/// Port in the container.
	pub container_port: u16,

	/// Protocol to forward, `tcp` if absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub protocol: Option<PortProtocol>,

	/// Host address to bind, all addresses if absent.
	#[serde(default, rename = "hostIP", skip_serializing_if = "Option::is_none")]
	pub host_ip: Option<IpAddr>,
}

/// Protocol for a port.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
	/// The TCP protocol.
	Tcp,

	/// The UDP protocol.
	Udp,
}

impl PortProtocol {
	/// IANA protocol number, as HNS wants it.
	pub fn number(self) -> u32 {
		match self {
			Self::Tcp => 6,
			Self::Udp => 17,
		}
	}
}

/// Where a policy from `AdditionalArgs` applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum PolicyScope {
	/// Applied when creating the HNS network.
	NetworkPolicy,

	/// Applied to every endpoint on the network.
	EndpointPolicy,
}

/// One `AdditionalArgs` entry: a scope, and an HNS policy object.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct PolicyArg {
	/// Where the policy applies.
	pub name: PolicyScope,

	/// The HNS policy, as `{"Type": ..., "Settings": {...}}`.
	pub value: Value,
}
