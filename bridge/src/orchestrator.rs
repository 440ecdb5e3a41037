//! ADD and DEL.
//!
//! ADD runs in three phases. Resolution (parse, derive, find or create the
//! network, look for an existing endpoint) commits nothing. Provisioning
//! (allocate, build policies, create the endpoint) is undone by releasing the
//! allocation if it fails. The post-commit phase (VFP rules, proxy policies)
//! is advisory: it never fails the command.

use std::net::IpAddr;

use log::{debug, info, warn};
use wincni::{
	config::{NetworkConfig, PolicyScope},
	reply::VersionedReply,
	Inputs,
};

use crate::{
	detached::{advisory, launch, Spawner},
	error::{AdvisoryError, BridgeError},
	hns::{HnsError, ResourceManager},
	ipam::{apply_allocation, ipam_payload, IpamDelegate},
	network::{endpoint_name, EndpointInfo, NetworkInfo, NetworkType},
	policy,
	proxy::ProxyPolicyApplier,
	result::current_result,
	settings::Settings,
	vfp,
};

/// Name of the L4 proxy helper executable, in the plugin's directory.
pub const L4PROXY: &str = "l4proxy";

/// The bridge plugin.
pub struct Bridge<R, I, S> {
	pub(crate) hns: R,
	pub(crate) ipam: I,
	pub(crate) spawner: S,
	pub(crate) settings: Settings,
}

impl<R, I, S> Bridge<R, I, S>
where
	R: ResourceManager,
	I: IpamDelegate,
	S: Spawner,
{
	pub fn new(hns: R, ipam: I, spawner: S, settings: Settings) -> Self {
		Self {
			hns,
			ipam,
			spawner,
			settings,
		}
	}

	/// Provision the container's endpoint, returning the result to print.
	pub async fn add(&self, inputs: &Inputs) -> Result<VersionedReply, BridgeError> {
		let pod_namespace = inputs.args.pod_namespace().unwrap_or_default();
		let pod_name = inputs.args.pod_name().unwrap_or_default();
		info!(
			"bridge {} ADD container={} pod={}/{} netns={:?}",
			self.settings.version, inputs.container_id, pod_namespace, pod_name, inputs.netns
		);

		let config = NetworkConfig::from_slice(&inputs.payload)?;
		let desired = NetworkInfo::from_config(&config)?;
		// Named after this container alone: one endpoint per container.
		let mut endpoint = EndpointInfo::from_config(&config, &desired, &inputs.container_id, "")?;

		if inputs.netns.is_empty() {
			return Err(BridgeError::MissingNamespace);
		}

		let mut network = self.resolve_network(&desired, endpoint.dual_stack)?;

		match self.hns.endpoint_by_name(&endpoint.name) {
			Ok(existing) if existing.network_id.eq_ignore_ascii_case(&network.id) => {
				info!(
					"endpoint {} already exists on network {}, returning it",
					existing.name, network.name
				);
				return Ok(current_result(&existing, &inputs.ifname, &inputs.netns)
					.into_version(&config.cni_version)?);
			}
			Ok(existing) => debug!(
				"endpoint {} exists on another network {}, provisioning anew",
				existing.name, existing.network_id
			),
			Err(err) if err.is_not_found() => {}
			Err(err) => return Err(BridgeError::hns("find endpoint")(err)),
		}

		let payload = ipam_payload(&inputs.payload, &config)?;
		let plugin = config.ipam_plugin();
		if let Some(plugin) = plugin {
			let allocation = self.ipam.allocate(plugin, &payload).await?;
			apply_allocation(
				&allocation,
				&mut network,
				&mut endpoint,
				config.optional_flags.force_bridge_gateway,
			);
		}

		let provisioned = self.provision(&config, &desired, &network, endpoint, &inputs.netns);
		let committed = match provisioned {
			Ok(committed) => committed,
			Err(err) => {
				if let Some(plugin) = plugin {
					warn!("rolling back address allocation after: {}", err);
					if let Err(rollback) = self.ipam.release(plugin, &payload).await {
						warn!("rollback failed too: {}", rollback);
					}
				}
				return Err(err);
			}
		};

		let committed = match self.hns.endpoint_by_name(&committed.name) {
			Ok(reread) => reread,
			Err(err) => {
				warn!("could not re-read endpoint {}: {}", committed.name, err);
				committed
			}
		};

		self.post_commit(&committed, pod_namespace, pod_name).await;

		Ok(current_result(&committed, &inputs.ifname, &inputs.netns)
			.into_version(&config.cni_version)?)
	}

	/// Tear the container's endpoint down.
	///
	/// Addresses are released first; an absent endpoint is not an error. The
	/// endpoint is looked up by netns, so `container:<id>` names the linked
	/// container's endpoint.
	pub async fn del(&self, inputs: &Inputs) -> Result<(), BridgeError> {
		info!(
			"bridge {} DEL container={} pod={}/{} netns={:?}",
			self.settings.version,
			inputs.container_id,
			inputs.args.pod_namespace().unwrap_or_default(),
			inputs.args.pod_name().unwrap_or_default(),
			inputs.netns
		);

		let config = NetworkConfig::from_slice(&inputs.payload)?;

		if let Some(plugin) = config.ipam_plugin() {
			let payload = ipam_payload(&inputs.payload, &config)?;
			self.ipam
				.release(plugin, &payload)
				.await
				.map_err(BridgeError::IpamRelease)?;
		}

		let network = NetworkInfo::from_config(&config)?;
		let name = endpoint_name(&inputs.container_id, &inputs.netns, &network.name);

		let endpoint = match self.hns.endpoint_by_name(&name) {
			Ok(endpoint) => endpoint,
			Err(err) if err.is_not_found() => {
				info!("endpoint {} not found, nothing to delete", name);
				return Ok(());
			}
			Err(err) => return Err(BridgeError::hns("find endpoint")(err)),
		};

		match self.hns.delete_endpoint(&endpoint.id) {
			Ok(()) => info!("deleted endpoint {} id={}", name, endpoint.id),
			Err(err) if err.is_not_found() => info!("endpoint {} already gone", name),
			Err(err) => return Err(BridgeError::hns("delete endpoint")(err)),
		}

		Ok(())
	}

	/// Find the network, creating it in single-stack mode.
	///
	/// Dual-stack needs an existing L2Bridge network.
	fn resolve_network(
		&self,
		desired: &NetworkInfo,
		dual_stack: bool,
	) -> Result<NetworkInfo, BridgeError> {
		match self.hns.network_by_name(&desired.name) {
			Ok(found) if dual_stack && found.kind != NetworkType::L2Bridge => {
				Err(BridgeError::DualStackMismatch(found.kind))
			}
			Ok(found) => {
				debug!("using network {} id={} type={}", found.name, found.id, found.kind);
				Ok(found)
			}
			Err(err) if err.is_not_found() && dual_stack => {
				Err(BridgeError::DualStackNetworkMissing {
					name: desired.name.clone(),
					err,
				})
			}
			Err(err) if err.is_not_found() => {
				info!("creating {} network {}", desired.kind, desired.name);
				match self.hns.create_network(desired) {
					Ok(created) => Ok(created),
					Err(HnsError::AlreadyExists(_)) => {
						debug!("network {} was created concurrently", desired.name);
						self.hns
							.network_by_name(&desired.name)
							.map_err(BridgeError::hns("find network"))
					}
					Err(err) => Err(BridgeError::hns("create network")(err)),
				}
			}
			Err(err) => Err(BridgeError::hns("find network")(err)),
		}
	}

	/// Complete the endpoint's gateways and policies, and commit it.
	fn provision(
		&self,
		config: &NetworkConfig,
		desired: &NetworkInfo,
		network: &NetworkInfo,
		mut endpoint: EndpointInfo,
		netns: &str,
	) -> Result<EndpointInfo, BridgeError> {
		let flags = &config.optional_flags;

		if flags.gateway_from_additional_routes {
			let taken = endpoint.gateways_from_routes(&config.additional_routes);
			endpoint.policies.extend(policy::gateway_overrides(&taken));
		}

		endpoint
			.policies
			.extend(desired.policies(PolicyScope::EndpointPolicy).cloned());

		if flags.loopback_dsr {
			let addresses: Vec<IpAddr> = endpoint
				.ip_address
				.iter()
				.chain(endpoint.ip_address6.iter())
				.map(|ip| ip.ip())
				.collect();
			endpoint
				.policies
				.extend(addresses.into_iter().map(policy::loopback_dsr));
		}

		debug!("committing endpoint {:?}", endpoint);
		let created = self
			.hns
			.create_endpoint(&network.id, &endpoint, netns)
			.map_err(BridgeError::hns("commit endpoint"))?;
		info!("created endpoint {} id={}", created.name, created.id);
		Ok(created)
	}

	async fn post_commit(&self, endpoint: &EndpointInfo, pod_namespace: &str, pod_name: &str) {
		let toggles = self.settings.toggles;

		if toggles.vfp_rules {
			if let Some(injector) = self.settings.sidecar(vfp::INJECTOR) {
				launch(
					&self.spawner,
					&injector,
					&["-portid".to_string(), endpoint.id.clone()],
				);
			}
		}

		if !toggles.enhanced_security {
			return;
		}

		let applier = ProxyPolicyApplier::new(&self.hns, &self.settings.sidecar_dir);
		advisory(
			"proxy policy",
			applier
				.apply_from_config(&endpoint.id)
				.map_err(AdvisoryError::from),
		);

		if let Some(l4proxy) = self.settings.sidecar(L4PROXY) {
			let args = [
				"-endpointid".to_string(),
				endpoint.id.clone(),
				"-namespace".to_string(),
				pod_namespace.to_string(),
				"-podname".to_string(),
				pod_name.to_string(),
			];
			if let Some(output) = advisory("l4proxy", self.spawner.run(&l4proxy, &args).await) {
				debug!("l4proxy: {}", output.trim());
			}
		}
	}
}
