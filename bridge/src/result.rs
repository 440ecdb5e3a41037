//! The CNI result for an endpoint.

use std::net::IpAddr;

use wincni::{
	config::Route,
	reply::{InterfaceReply, IpReply, SuccessReply},
	version,
};

use crate::network::{default_destination, is_default, EndpointInfo};

/// Build the result for a committed endpoint, in the current spec shape.
///
/// There's a single interface, named `ifname`; every address points at it.
pub fn current_result(endpoint: &EndpointInfo, ifname: &str, netns: &str) -> SuccessReply {
	let interface = InterfaceReply {
		name: ifname.into(),
		mac: endpoint.mac.map(|mac| mac.to_string()),
		sandbox: Some(netns.to_string()).filter(|ns| !ns.is_empty()),
	};

	let ips = endpoint
		.ip_address
		.map(|address| (address, endpoint.gateway))
		.into_iter()
		.chain(endpoint.ip_address6.map(|address| (address, endpoint.gateway6)))
		.map(|(address, gateway)| IpReply {
			address,
			gateway,
			interface: Some(0),
		})
		.collect();

	let gateways: Vec<IpAddr> = endpoint
		.gateway
		.iter()
		.chain(endpoint.gateway6.iter())
		.copied()
		.collect();
	let routes = gateways
		.iter()
		.map(|gw| Route {
			dst: default_destination(*gw),
			gw: Some(*gw),
		})
		.chain(
			endpoint
				.routes
				.iter()
				.filter(|r| {
					let family_gateway = gateways.iter().any(|gw| gw.is_ipv4() == r.dst.is_ipv4());
					!(is_default(&r.dst) && family_gateway)
				})
				.cloned(),
		)
		.collect();

	SuccessReply {
		cni_version: version::current(),
		interfaces: vec![interface],
		ips,
		routes,
		dns: endpoint.dns.clone(),
		specific: Default::default(),
	}
}
