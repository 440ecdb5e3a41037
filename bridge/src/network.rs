//! Networks and endpoints: what we want from HNS, and what it has.
//!
//! [`NetworkInfo`] and [`EndpointInfo`] are derived from the configuration
//! first, completed with the IPAM allocation, and converted to and from the
//! HCN documents at the resource manager boundary.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnetwork::IpNetwork;
use log::debug;
use macaddr::MacAddr6;
use wincni::config::{Dns, NetworkConfig, PolicyScope, Route};

pub use crate::hns::schema::NetworkType;
use crate::{
	error::BridgeError,
	hns::schema::{
		HcnDns, HcnRoute, HostComputeEndpoint, HostComputeNetwork, IpConfig, Ipam, SchemaVersion,
		Subnet,
	},
	policy::{self, Policy, ScopedPolicy},
};

impl NetworkType {
	/// The HNS network type a plugin `type` stands for.
	pub fn from_plugin(plugin: &str) -> Option<Self> {
		match plugin {
			"sdnbridge" => Some(Self::L2Bridge),
			"sdnoverlay" => Some(Self::Overlay),
			"nat" => Some(Self::Nat),
			"l2tunnel" => Some(Self::L2Tunnel),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubnetInfo {
	pub prefix: IpNetwork,
	pub gateway: Option<IpAddr>,
}

/// A network, desired or as HNS has it.
#[derive(Clone, Debug)]
pub struct NetworkInfo {
	/// HNS identifier; empty until the network exists.
	pub id: String,
	pub name: String,
	pub kind: NetworkType,
	pub subnets: Vec<SubnetInfo>,
	pub policies: Vec<ScopedPolicy>,
	pub dns: Dns,
}

impl NetworkInfo {
	/// Derive the desired network from the configuration.
	///
	/// The subnet comes from `ipam.subnet`, gatewayed by the first IPAM route
	/// with a gateway or else the subnet's first host.
	pub fn from_config(config: &NetworkConfig) -> Result<Self, BridgeError> {
		let kind = NetworkType::from_plugin(&config.plugin)
			.ok_or_else(|| BridgeError::UnsupportedNetworkType(config.plugin.clone()))?;

		let subnets = config
			.ipam
			.as_ref()
			.and_then(|ipam| {
				ipam.subnet.map(|prefix| SubnetInfo {
					prefix,
					gateway: ipam
						.routes
						.iter()
						.find_map(|r| r.gw)
						.or_else(|| first_host(prefix)),
				})
			})
			.into_iter()
			.collect();

		Ok(Self {
			id: String::new(),
			name: config.name.clone(),
			kind,
			subnets,
			policies: policy::from_args(&config.additional_args)?,
			dns: config.dns.clone().unwrap_or_default(),
		})
	}

	/// Policies of the given scope.
	pub fn policies(&self, scope: PolicyScope) -> impl Iterator<Item = &Policy> {
		self.policies
			.iter()
			.filter(move |p| p.scope == scope)
			.map(|p| &p.policy)
	}

	pub fn to_hcn(&self) -> Result<HostComputeNetwork, serde_json::Error> {
		let subnets = self
			.subnets
			.iter()
			.map(|s| Subnet {
				ip_address_prefix: s.prefix.to_string(),
				routes: s
					.gateway
					.map(|gw| HcnRoute {
						next_hop: gw.to_string(),
						destination_prefix: default_destination(gw).to_string(),
						..Default::default()
					})
					.into_iter()
					.collect(),
			})
			.collect();

		Ok(HostComputeNetwork {
			name: self.name.clone(),
			kind: self.kind,
			policies: self
				.policies(PolicyScope::NetworkPolicy)
				.map(Policy::to_hcn)
				.collect::<Result<_, _>>()?,
			dns: hcn_dns(&self.dns),
			ipams: vec![Ipam {
				kind: "Static".into(),
				subnets,
			}],
			schema_version: SchemaVersion::default(),
			..Default::default()
		})
	}

	pub fn from_hcn(network: HostComputeNetwork) -> Self {
		let subnets = network
			.ipams
			.iter()
			.flat_map(|ipam| ipam.subnets.iter())
			.filter_map(|s| {
				let prefix = s.ip_address_prefix.parse().ok()?;
				let gateway = s.routes.iter().find_map(|r| r.next_hop.parse().ok());
				Some(SubnetInfo { prefix, gateway })
			})
			.collect();

		Self {
			id: network.id,
			name: network.name,
			kind: network.kind,
			subnets,
			policies: network
				.policies
				.into_iter()
				.map(|p| ScopedPolicy {
					scope: PolicyScope::NetworkPolicy,
					policy: Policy::Raw(p),
				})
				.collect(),
			dns: dns_from_hcn(&network.dns),
		}
	}
}

/// An endpoint, desired or as HNS has it.
#[derive(Clone, Debug, Default)]
pub struct EndpointInfo {
	/// HNS identifier; empty until committed. Doubles as the VFP port id.
	pub id: String,
	pub name: String,
	pub network_id: String,
	/// HNS namespace the endpoint is attached to, if any.
	pub namespace: String,
	pub ip_address: Option<IpNetwork>,
	pub ip_address6: Option<IpNetwork>,
	pub mac: Option<MacAddr6>,
	pub gateway: Option<IpAddr>,
	pub gateway6: Option<IpAddr>,
	pub subnet: Option<IpNetwork>,
	pub routes: Vec<Route>,
	pub policies: Vec<Policy>,
	pub dns: Dns,
	pub dual_stack: bool,
}

impl EndpointInfo {
	/// Derive the desired endpoint from the configuration.
	///
	/// Addresses are left for IPAM. DNS comes from the runtime when it names
	/// servers, else from the configuration.
	pub fn from_config(
		config: &NetworkConfig,
		network: &NetworkInfo,
		container_id: &str,
		netns: &str,
	) -> Result<Self, BridgeError> {
		let runtime_dns = config
			.runtime
			.as_ref()
			.and_then(|rt| rt.dns.clone())
			.filter(|dns| !dns.nameservers.is_empty());

		if config.optional_flags.allow_acl_port_mapping {
			debug!("allowAclPortMapping has no effect, port mappings stay PortMapping policies");
		}

		Ok(Self {
			name: endpoint_name(container_id, netns, &network.name),
			routes: config.additional_routes.clone(),
			policies: policy::port_mappings(
				config.port_mappings(),
				config.optional_flags.local_routed_port_mapping,
			),
			dns: runtime_dns.unwrap_or_else(|| network.dns.clone()),
			dual_stack: config.optional_flags.enable_dual_stack,
			..Default::default()
		})
	}

	/// Take gateways from default routes, for the families that have none yet.
	///
	/// Returns the gateways taken. Scanning stops once both families have one.
	pub fn gateways_from_routes(&mut self, routes: &[Route]) -> Vec<IpAddr> {
		let mut taken = Vec::new();
		for route in routes {
			if self.gateway.is_some() && self.gateway6.is_some() {
				break;
			}

			let gw = match route.gw {
				Some(gw) if is_default(&route.dst) && gw.is_ipv4() == route.dst.is_ipv4() => gw,
				_ => continue,
			};

			let slot = if gw.is_ipv4() {
				&mut self.gateway
			} else {
				&mut self.gateway6
			};

			if slot.is_none() {
				debug!("gateway {} from additional route {}", gw, route.dst);
				*slot = Some(gw);
				taken.push(gw);
			}
		}

		taken
	}

	pub fn to_hcn(&self, network_id: &str) -> Result<HostComputeEndpoint, serde_json::Error> {
		let ip_configurations = self
			.ip_address
			.iter()
			.chain(self.ip_address6.iter())
			.map(|ip| IpConfig {
				ip_address: ip.ip().to_string(),
				prefix_length: ip.prefix(),
			})
			.collect();

		let gateways: Vec<IpAddr> = self
			.gateway
			.iter()
			.chain(self.gateway6.iter())
			.copied()
			.collect();
		let mut routes: Vec<HcnRoute> = gateways
			.iter()
			.map(|gw| HcnRoute {
				next_hop: gw.to_string(),
				destination_prefix: default_destination(*gw).to_string(),
				..Default::default()
			})
			.collect();

		for route in &self.routes {
			let family_gateway = gateways.iter().find(|gw| gw.is_ipv4() == route.dst.is_ipv4());
			if is_default(&route.dst) && family_gateway.is_some() {
				continue;
			}

			if let Some(hop) = route.gw.or_else(|| family_gateway.copied()) {
				routes.push(HcnRoute {
					next_hop: hop.to_string(),
					destination_prefix: route.dst.to_string(),
					..Default::default()
				});
			}
		}

		Ok(HostComputeEndpoint {
			name: self.name.clone(),
			host_compute_network: network_id.into(),
			policies: self
				.policies
				.iter()
				.map(Policy::to_hcn)
				.collect::<Result<_, _>>()?,
			ip_configurations,
			dns: hcn_dns(&self.dns),
			routes,
			mac_address: self.mac.map(hns_mac).unwrap_or_default(),
			schema_version: SchemaVersion::default(),
			..Default::default()
		})
	}

	pub fn from_hcn(endpoint: HostComputeEndpoint) -> Self {
		let mut info = Self {
			id: endpoint.id,
			name: endpoint.name,
			network_id: endpoint.host_compute_network,
			namespace: endpoint.host_compute_namespace,
			mac: endpoint.mac_address.parse().ok(),
			dns: dns_from_hcn(&endpoint.dns),
			policies: endpoint.policies.into_iter().map(Policy::Raw).collect(),
			..Default::default()
		};

		for config in &endpoint.ip_configurations {
			let ip = match config
				.ip_address
				.parse::<IpAddr>()
				.ok()
				.and_then(|ip| IpNetwork::new(ip, config.prefix_length).ok())
			{
				Some(ip) => ip,
				None => continue,
			};

			if ip.is_ipv4() && info.ip_address.is_none() {
				info.ip_address = Some(ip);
				info.subnet = IpNetwork::new(ip.network(), ip.prefix()).ok();
			} else if ip.is_ipv6() && info.ip_address6.is_none() {
				info.ip_address6 = Some(ip);
			}
		}

		for route in &endpoint.routes {
			let dst: IpNetwork = match route.destination_prefix.parse() {
				Ok(dst) => dst,
				Err(_) => continue,
			};
			let gw: Option<IpAddr> = route.next_hop.parse().ok();

			match gw {
				Some(gw) if is_default(&dst) && gw.is_ipv4() && info.gateway.is_none() => {
					info.gateway = Some(gw)
				}
				Some(gw) if is_default(&dst) && gw.is_ipv6() && info.gateway6.is_none() => {
					info.gateway6 = Some(gw)
				}
				_ => info.routes.push(Route { dst, gw }),
			}
		}

		info.dual_stack = info.ip_address6.is_some();
		info
	}
}

/// Endpoint name: `<container>_<network>`.
///
/// With a `container:<id>` netns the linked container's id is used. ADD
/// passes no netns, so only DEL resolves through the link.
pub fn endpoint_name(container_id: &str, netns: &str, network: &str) -> String {
	let container = match netns.split_once(':') {
		Some((_, linked)) if netns != "none" && !linked.is_empty() => linked,
		_ => container_id,
	};

	format!("{}_{}", container, network)
}

pub fn is_default(dst: &IpNetwork) -> bool {
	dst.prefix() == 0 && dst.ip().is_unspecified()
}

pub fn default_destination(family_of: IpAddr) -> IpNetwork {
	let any = if family_of.is_ipv4() {
		IpAddr::V4(Ipv4Addr::UNSPECIFIED)
	} else {
		IpAddr::V6(Ipv6Addr::UNSPECIFIED)
	};
	IpNetwork::new(any, 0).unwrap_or_else(|_| unreachable!("zero prefix is always valid"))
}

fn first_host(prefix: IpNetwork) -> Option<IpAddr> {
	match prefix.network() {
		IpAddr::V4(base) => Some(IpAddr::V4(Ipv4Addr::from(u32::from(base).checked_add(1)?))),
		IpAddr::V6(base) => Some(IpAddr::V6(Ipv6Addr::from(u128::from(base).checked_add(1)?))),
	}
}

fn hns_mac(mac: MacAddr6) -> String {
	mac.as_bytes()
		.iter()
		.map(|b| format!("{:02X}", b))
		.collect::<Vec<_>>()
		.join("-")
}

fn hcn_dns(dns: &Dns) -> HcnDns {
	HcnDns {
		domain: dns.domain.clone().unwrap_or_default(),
		search: dns.search.clone(),
		server_list: dns.nameservers.iter().map(IpAddr::to_string).collect(),
		options: dns.options.clone(),
	}
}

fn dns_from_hcn(dns: &HcnDns) -> Dns {
	Dns {
		nameservers: dns
			.server_list
			.iter()
			.filter_map(|s| s.parse().ok())
			.collect(),
		domain: Some(dns.domain.clone()).filter(|d| !d.is_empty()),
		search: dns.search.clone(),
		options: dns.options.clone(),
	}
}
