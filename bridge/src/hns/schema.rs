//! HCN v2 JSON documents, as exchanged with `computenetwork.dll`.
//!
//! Field names are the service's (PascalCase); addresses and prefixes stay
//! strings here and are parsed at the edges.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Endpoint policy type for NAT settings, loopback DSR included.
pub const OUTBOUND_NAT: &str = "OutBoundNAT";

/// Endpoint policy type for static routes.
pub const SDN_ROUTE: &str = "SDNRoute";

/// Endpoint policy type for host to container port forwards.
pub const PORT_MAPPING: &str = "PortMapping";

/// Endpoint policy type for WFP transparent proxying.
pub const L4_WFP_PROXY: &str = "L4WFPPROXY";

/// `PortMapping` flag: the VIP is routed locally.
pub const NAT_FLAGS_LOCAL_ROUTED_VIP: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SchemaVersion {
	pub major: u32,
	pub minor: u32,
}

impl Default for SchemaVersion {
	fn default() -> Self {
		Self { major: 2, minor: 0 }
	}
}

/// Query document for enumeration and property calls.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostComputeQuery {
	pub schema_version: SchemaVersion,
	pub flags: u32,
	#[serde(skip_serializing_if = "String::is_empty")]
	pub filter: String,
}

impl HostComputeQuery {
	pub fn by_name(name: &str) -> Self {
		Self::filtered(serde_json::json!({ "Name": name }))
	}

	pub fn by_id(id: &str) -> Self {
		Self::filtered(serde_json::json!({ "ID": id }))
	}

	fn filtered(filter: Value) -> Self {
		Self {
			filter: filter.to_string(),
			..Default::default()
		}
	}
}

/// HNS network types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum NetworkType {
	#[serde(rename = "NAT")]
	Nat,
	#[serde(rename = "ICS")]
	Ics,
	Transparent,
	L2Bridge,
	L2Tunnel,
	Overlay,
	Private,
	Internal,
	Mirrored,
	#[serde(other)]
	Unknown,
}

impl Default for NetworkType {
	fn default() -> Self {
		Self::Unknown
	}
}

impl fmt::Display for NetworkType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let name = match self {
			Self::Nat => "NAT",
			Self::Ics => "ICS",
			Self::Transparent => "Transparent",
			Self::L2Bridge => "L2Bridge",
			Self::L2Tunnel => "L2Tunnel",
			Self::Overlay => "Overlay",
			Self::Private => "Private",
			Self::Internal => "Internal",
			Self::Mirrored => "Mirrored",
			Self::Unknown => "Unknown",
		};
		f.write_str(name)
	}
}

/// A policy object, for networks and endpoints alike.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HcnPolicy {
	#[serde(rename = "Type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub settings: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HcnRoute {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub next_hop: String,
	#[serde(default)]
	pub destination_prefix: String,
	#[serde(default, skip_serializing_if = "is_zero")]
	pub metric: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HcnDns {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub domain: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub search: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub server_list: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub options: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
	#[serde(default)]
	pub ip_address_prefix: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub routes: Vec<HcnRoute>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ipam {
	#[serde(rename = "Type", default, skip_serializing_if = "String::is_empty")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub subnets: Vec<Subnet>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostComputeNetwork {
	#[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(rename = "Type", default)]
	pub kind: NetworkType,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub policies: Vec<HcnPolicy>,
	#[serde(default)]
	pub dns: HcnDns,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub ipams: Vec<Ipam>,
	#[serde(default)]
	pub flags: u32,
	#[serde(default)]
	pub schema_version: SchemaVersion,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct IpConfig {
	pub ip_address: String,
	#[serde(default)]
	pub prefix_length: u8,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostComputeEndpoint {
	#[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
	pub id: String,
	#[serde(default)]
	pub name: String,
	#[serde(default)]
	pub host_compute_network: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub host_compute_namespace: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub policies: Vec<HcnPolicy>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub ip_configurations: Vec<IpConfig>,
	#[serde(default)]
	pub dns: HcnDns,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub routes: Vec<HcnRoute>,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub mac_address: String,
	#[serde(default)]
	pub flags: u32,
	#[serde(default)]
	pub schema_version: SchemaVersion,
}

/// What a modify request acts on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RequestType {
	Add,
	Remove,
	Update,
	Refresh,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyEndpointRequest {
	pub policies: Vec<HcnPolicy>,
}

/// `HcnModifyEndpoint` settings for policy changes.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyEndpointSettingRequest {
	pub resource_type: &'static str,
	pub request_type: RequestType,
	pub settings: PolicyEndpointRequest,
}

impl ModifyEndpointSettingRequest {
	pub fn policies(request_type: RequestType, policies: Vec<HcnPolicy>) -> Self {
		Self {
			resource_type: "Policy",
			request_type,
			settings: PolicyEndpointRequest { policies },
		}
	}
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct NamespaceEndpoint {
	pub endpoint_id: String,
}

/// `HcnModifyNamespace` settings for endpoint membership.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ModifyNamespaceSettingRequest {
	pub resource_type: &'static str,
	pub request_type: RequestType,
	pub settings: NamespaceEndpoint,
}

impl ModifyNamespaceSettingRequest {
	pub fn add_endpoint(endpoint_id: &str) -> Self {
		Self {
			resource_type: "Endpoint",
			request_type: RequestType::Add,
			settings: NamespaceEndpoint {
				endpoint_id: endpoint_id.into(),
			},
		}
	}
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SdnRoutePolicySetting {
	pub destination_prefix: String,
	pub next_hop: String,
	pub need_encap: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutboundNatPolicySetting {
	#[serde(default, rename = "VirtualIP", skip_serializing_if = "String::is_empty")]
	pub virtual_ip: String,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub exceptions: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub destinations: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortMappingPolicySetting {
	pub protocol: u32,
	pub internal_port: u16,
	pub external_port: u16,
	#[serde(default, rename = "VIP", skip_serializing_if = "String::is_empty")]
	pub vip: String,
	#[serde(default, skip_serializing_if = "is_zero")]
	pub flags: u32,
}

/// Traffic selector of a proxy policy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FiveTuple {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub protocols: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub local_addresses: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub remote_addresses: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub local_ports: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub remote_ports: String,
	#[serde(default, skip_serializing_if = "is_zero")]
	pub priority: u16,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyExceptions {
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub ip_address_exceptions: Vec<String>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub port_exceptions: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct L4WfpProxyPolicySetting {
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub inbound_proxy_port: String,
	#[serde(default, skip_serializing_if = "String::is_empty")]
	pub outbound_proxy_port: String,
	#[serde(default)]
	pub filter_tuple: FiveTuple,
	#[serde(default, rename = "UserSID", skip_serializing_if = "String::is_empty")]
	pub user_sid: String,
	#[serde(default)]
	pub inbound_exceptions: ProxyExceptions,
	#[serde(default)]
	pub outbound_exceptions: ProxyExceptions,
}

fn is_zero<T: Default + PartialEq>(n: &T) -> bool {
	*n == T::default()
}
