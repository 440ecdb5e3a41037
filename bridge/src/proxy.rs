//! HNS proxy policies: transparent L4 redirection of an endpoint's traffic.

use std::path::Path;

use log::{debug, info};
use thiserror::Error;

use crate::{
	hns::{
		schema::{FiveTuple, L4WfpProxyPolicySetting, ProxyExceptions, RequestType, L4_WFP_PROXY},
		HnsError, ResourceManager,
	},
	policy::Policy,
	vfp::{split_list, HnsProxyConfig, VfpConfigError, VfpRulesConfig},
};

/// Traffic from this SID (the built-in proxy account group) is not redirected.
pub const PROXY_EXEMPT_SID: &str = "S-1-5-32-556";

/// Protocol number the proxy filter matches: TCP, the only one supported.
const PROXY_PROTOCOL: &str = "6";

#[derive(Debug, Error)]
pub enum ProxyError {
	#[error(transparent)]
	Config(#[from] VfpConfigError),

	#[error("policy missing proxy port")]
	MissingPort,

	#[error("policy has invalid proxy port value: {0:?}")]
	InvalidPort(String),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Hns(#[from] HnsError),
}

/// Build the proxy policy setting from the `hnsproxy` block.
///
/// The inbound port must be a non-zero port number.
pub fn proxy_setting(config: &HnsProxyConfig) -> Result<L4WfpProxyPolicySetting, ProxyError> {
	let port = config.inboundproxyport.trim();
	if port.is_empty() {
		return Err(ProxyError::MissingPort);
	}
	match port.parse::<u16>() {
		Ok(p) if p != 0 => {}
		_ => return Err(ProxyError::InvalidPort(port.into())),
	}

	Ok(L4WfpProxyPolicySetting {
		inbound_proxy_port: port.into(),
		outbound_proxy_port: config.outboundproxyport.trim().into(),
		filter_tuple: FiveTuple {
			protocols: PROXY_PROTOCOL.into(),
			..Default::default()
		},
		user_sid: PROXY_EXEMPT_SID.into(),
		inbound_exceptions: ProxyExceptions {
			ip_address_exceptions: split_list(&config.inboundaddressexceptions),
			port_exceptions: split_list(&config.inboundportexceptions),
		},
		outbound_exceptions: ProxyExceptions {
			ip_address_exceptions: split_list(&config.outboundaddressexceptions),
			port_exceptions: split_list(&config.outboundportexceptions),
		},
	})
}

/// Applies and clears proxy policies on endpoints.
pub struct ProxyPolicyApplier<'a, R: ?Sized> {
	hns: &'a R,
	config_dir: &'a Path,
}

impl<'a, R: ResourceManager + ?Sized> ProxyPolicyApplier<'a, R> {
	/// `config_dir` is where `vfprules.json` lives.
	pub fn new(hns: &'a R, config_dir: &'a Path) -> Self {
		Self { hns, config_dir }
	}

	/// Add the configured proxy policy to an endpoint.
	pub fn apply_from_config(&self, endpoint_id: &str) -> Result<(), ProxyError> {
		let config = VfpRulesConfig::load_from(self.config_dir)?;
		let setting = proxy_setting(&config.hnsproxy)?;
		debug!("proxy policy for endpoint {}: {:?}", endpoint_id, setting);

		let policy = Policy::L4Proxy(setting).to_hcn()?;
		self.hns
			.modify_endpoint_policies(endpoint_id, RequestType::Add, vec![policy])?;
		info!("applied proxy policy to endpoint {}", endpoint_id);
		Ok(())
	}

	/// Remove every proxy policy from an endpoint, in a single request.
	///
	/// Returns how many were removed.
	pub fn clear_policies(&self, endpoint_id: &str) -> Result<usize, ProxyError> {
		let policies: Vec<_> = self
			.hns
			.endpoint_policies(endpoint_id)?
			.into_iter()
			.filter(|p| p.kind == L4_WFP_PROXY)
			.collect();

		let count = policies.len();
		if count == 0 {
			return Ok(0);
		}

		self.hns
			.modify_endpoint_policies(endpoint_id, RequestType::Remove, policies)?;
		info!("removed {} proxy policies from endpoint {}", count, endpoint_id);
		Ok(count)
	}
}
