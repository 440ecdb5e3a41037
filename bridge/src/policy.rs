//! Endpoint and network policies.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use wincni::config::{PolicyArg, PolicyScope, PortMapping, PortProtocol};

use crate::{
	error::BridgeError,
	hns::schema::{
		HcnPolicy, L4WfpProxyPolicySetting, OutboundNatPolicySetting, PortMappingPolicySetting,
		SdnRoutePolicySetting, L4_WFP_PROXY, NAT_FLAGS_LOCAL_ROUTED_VIP, OUTBOUND_NAT,
		PORT_MAPPING, SDN_ROUTE,
	},
	network::default_destination,
};

/// A single behaviour rule for an endpoint (or a network).
#[derive(Clone, Debug, PartialEq)]
pub enum Policy {
	/// Route `destination` through `next_hop`.
	RouteOverride {
		destination: IpNetwork,
		next_hop: IpAddr,
	},

	/// Let the endpoint reach itself through service VIPs.
	LoopbackDsr { address: IpAddr },

	/// Forward a host port into the endpoint.
	PortMapping {
		mapping: PortMapping,
		local_routed: bool,
	},

	/// Transparently redirect traffic through a local proxy.
	L4Proxy(L4WfpProxyPolicySetting),

	/// Anything else, passed through as given.
	Raw(HcnPolicy),
}

impl Policy {
	/// The HCN policy document.
	pub fn to_hcn(&self) -> Result<HcnPolicy, serde_json::Error> {
		let (kind, settings) = match self {
			Self::RouteOverride {
				destination,
				next_hop,
			} => (
				SDN_ROUTE,
				serde_json::to_value(SdnRoutePolicySetting {
					destination_prefix: destination.to_string(),
					next_hop: next_hop.to_string(),
					need_encap: false,
				})?,
			),
			Self::LoopbackDsr { address } => (
				OUTBOUND_NAT,
				serde_json::to_value(OutboundNatPolicySetting {
					destinations: vec![address.to_string()],
					..Default::default()
				})?,
			),
			Self::PortMapping {
				mapping,
				local_routed,
			} => (
				PORT_MAPPING,
				serde_json::to_value(PortMappingPolicySetting {
					protocol: mapping.protocol.unwrap_or(PortProtocol::Tcp).number(),
					internal_port: mapping.container_port,
					external_port: mapping.host_port,
					vip: mapping.host_ip.map(|ip| ip.to_string()).unwrap_or_default(),
					flags: if *local_routed {
						NAT_FLAGS_LOCAL_ROUTED_VIP
					} else {
						0
					},
				})?,
			),
			Self::L4Proxy(setting) => (L4_WFP_PROXY, serde_json::to_value(setting)?),
			Self::Raw(policy) => return Ok(policy.clone()),
		};

		Ok(HcnPolicy {
			kind: kind.into(),
			settings,
		})
	}
}

/// A policy from the configuration, with where it applies.
#[derive(Clone, Debug, PartialEq)]
pub struct ScopedPolicy {
	pub scope: PolicyScope,
	pub policy: Policy,
}

/// Policies given in `AdditionalArgs`.
pub fn from_args(args: &[PolicyArg]) -> Result<Vec<ScopedPolicy>, BridgeError> {
	args.iter()
		.map(|arg| {
			let policy: HcnPolicy = serde_json::from_value(arg.value.clone())
				.map_err(|err| BridgeError::InvalidPolicy(arg.value.to_string(), err))?;
			Ok(ScopedPolicy {
				scope: arg.name,
				policy: Policy::Raw(policy),
			})
		})
		.collect()
}

/// One policy per runtime port mapping.
pub fn port_mappings(mappings: &[PortMapping], local_routed: bool) -> Vec<Policy> {
	mappings
		.iter()
		.map(|mapping| Policy::PortMapping {
			mapping: mapping.clone(),
			local_routed,
		})
		.collect()
}

/// Default-route overrides for gateways taken from additional routes.
pub fn gateway_overrides(gateways: &[IpAddr]) -> Vec<Policy> {
	gateways
		.iter()
		.map(|gw| Policy::RouteOverride {
			destination: default_destination(*gw),
			next_hop: *gw,
		})
		.collect()
}

pub fn loopback_dsr(address: IpAddr) -> Policy {
	Policy::LoopbackDsr { address }
}
