//! IP address management, delegated to an IPAM plugin.

use std::{
	borrow::Cow,
	net::{IpAddr, Ipv4Addr},
	path::PathBuf,
};

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use log::{debug, info};
use wincni::{
	config::NetworkConfig, delegate, error::CniError, reply::IpamSuccessReply, Command,
};

use crate::network::{EndpointInfo, NetworkInfo, SubnetInfo};

/// Allocates and releases addresses.
///
/// Both calls are given the IPAM plugin's name and the network configuration
/// to hand it; see [`ipam_payload`].
#[async_trait(?Send)]
pub trait IpamDelegate {
	async fn allocate(&self, plugin: &str, config: &[u8]) -> Result<IpamSuccessReply, CniError>;

	/// Release whatever `allocate` may have given out.
	///
	/// Safe to call after a partial or failed allocation.
	async fn release(&self, plugin: &str, config: &[u8]) -> Result<(), CniError>;
}

/// IPAM through CNI delegation.
#[derive(Clone, Debug)]
pub struct CniIpam {
	search_path: Vec<PathBuf>,
}

impl CniIpam {
	/// `search_path` is where IPAM plugins are looked up, usually `CNI_PATH`.
	pub fn new(search_path: Vec<PathBuf>) -> Self {
		Self { search_path }
	}
}

#[async_trait(?Send)]
impl IpamDelegate for CniIpam {
	async fn allocate(&self, plugin: &str, config: &[u8]) -> Result<IpamSuccessReply, CniError> {
		let output = delegate(plugin, Command::Add, config, &self.search_path).await?;
		let reply = IpamSuccessReply::parse(&output).map_err(|err| CniError::Delegated {
			plugin: plugin.into(),
			err: Box::new(err),
		})?;
		info!("{} allocated {:?}", plugin, reply.ips);
		Ok(reply)
	}

	async fn release(&self, plugin: &str, config: &[u8]) -> Result<(), CniError> {
		delegate(plugin, Command::Del, config, &self.search_path).await?;
		info!("{} released its allocation", plugin);
		Ok(())
	}
}

/// The configuration bytes to give the IPAM plugin.
///
/// Single-stack gets exactly what the runtime sent; dual-stack gets the
/// parsed configuration, reserialized.
pub fn ipam_payload<'a>(
	stdin: &'a [u8],
	config: &NetworkConfig,
) -> Result<Cow<'a, [u8]>, CniError> {
	if config.optional_flags.enable_dual_stack {
		Ok(Cow::Owned(serde_json::to_vec(config)?))
	} else {
		Ok(Cow::Borrowed(stdin))
	}
}

/// Fill in addresses, gateways, and routes from an allocation.
///
/// Single-stack only looks at IPv4, and records the allocated subnet on the
/// network. With `forceBridgeGateway` the IPv4 gateway becomes the `.2` of
/// the allocated subnet.
pub fn apply_allocation(
	reply: &IpamSuccessReply,
	network: &mut NetworkInfo,
	endpoint: &mut EndpointInfo,
	force_bridge_gateway: bool,
) {
	if let Some(ip4) = reply.ip4() {
		let subnet = IpNetwork::new(ip4.address.network(), ip4.address.prefix()).ok();
		endpoint.ip_address = Some(ip4.address);
		endpoint.gateway = if force_bridge_gateway {
			bridge_gateway(ip4.address)
		} else {
			ip4.gateway
		};
		endpoint.routes.extend(reply.routes_for(true).cloned());

		if !endpoint.dual_stack {
			if let Some(prefix) = subnet {
				network.subnets.push(SubnetInfo {
					prefix,
					gateway: ip4.gateway,
				});
			}
			endpoint.subnet = subnet;
		}
	}

	if endpoint.dual_stack {
		if let Some(ip6) = reply.ip6() {
			endpoint.ip_address6 = Some(ip6.address);
			endpoint.gateway6 = ip6.gateway;
			endpoint.routes.extend(reply.routes_for(false).cloned());
		}
	}

	debug!(
		"endpoint {} addresses v4={:?} gw={:?} v6={:?} gw6={:?}",
		endpoint.name,
		endpoint.ip_address,
		endpoint.gateway,
		endpoint.ip_address6,
		endpoint.gateway6
	);
}

fn bridge_gateway(address: IpNetwork) -> Option<IpAddr> {
	match address.network() {
		IpAddr::V4(base) => {
			let [a, b, c, _] = base.octets();
			Some(IpAddr::V4(Ipv4Addr::new(a, b, c, 2)))
		}
		IpAddr::V6(_) => None,
	}
}
