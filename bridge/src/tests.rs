//! In-memory fakes of the plugin's seams, and tests of ADD and DEL over them.

use std::{
	cell::{Cell, RefCell},
	env::consts::EXE_SUFFIX,
	fs,
	path::{Path, PathBuf},
};

use async_std::task::block_on;
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use wincni::{error::CniError, reply::IpamSuccessReply, Command, Inputs};

use crate::{
	detached::Spawner,
	error::{AdvisoryError, BridgeError},
	hns::{
		schema::{HcnPolicy, RequestType, L4_WFP_PROXY},
		HnsError, ResourceManager,
	},
	ipam::IpamDelegate,
	network::{EndpointInfo, NetworkInfo, NetworkType},
	orchestrator::{Bridge, L4PROXY},
	policy::Policy,
	settings::{Settings, Toggles},
	vfp,
};

fn fake_id(n: u32) -> String {
	format!("00000000-0000-0000-0000-{:012}", n)
}

#[derive(Debug, Default)]
pub struct FakeHns {
	pub networks: RefCell<Vec<NetworkInfo>>,
	pub endpoints: RefCell<Vec<EndpointInfo>>,
	pub calls: RefCell<Vec<&'static str>>,

	/// Policies reported on any endpoint.
	pub policies: RefCell<Vec<HcnPolicy>>,
	pub modified: RefCell<Vec<(String, RequestType, Vec<HcnPolicy>)>>,

	pub fail_create_endpoint: Cell<bool>,
	/// Endpoint lookups fail with a platform error.
	pub fail_lookup: Cell<bool>,
	/// Returned once by the next endpoint deletion, which then removes nothing.
	pub fail_delete: RefCell<Option<HnsError>>,
	/// Create the network, but answer as if another invocation beat us to it.
	pub race_create_network: Cell<bool>,
	next_id: Cell<u32>,
}

impl FakeHns {
	fn next_id(&self) -> String {
		let n = self.next_id.get() + 1;
		self.next_id.set(n);
		fake_id(n)
	}

	pub fn with_network(name: &str, kind: NetworkType) -> Self {
		let hns = Self::default();
		hns.networks.borrow_mut().push(NetworkInfo {
			id: hns.next_id(),
			name: name.into(),
			kind,
			subnets: Vec::new(),
			policies: Vec::new(),
			dns: Default::default(),
		});
		hns
	}

	fn called(&self, name: &'static str) -> usize {
		self.calls.borrow().iter().filter(|c| **c == name).count()
	}

	fn with_endpoint(name: &str) -> Self {
		let hns = Self::with_network("cbr0", NetworkType::L2Bridge);
		let network_id = hns.networks.borrow()[0].id.clone();
		hns.endpoints.borrow_mut().push(EndpointInfo {
			id: hns.next_id(),
			name: name.into(),
			network_id,
			..Default::default()
		});
		hns
	}
}

fn platform_error() -> HnsError {
	HnsError::Platform {
		code: 0x8007_0005,
		message: "access denied".into(),
	}
}

impl ResourceManager for FakeHns {
	fn network_by_name(&self, name: &str) -> Result<NetworkInfo, HnsError> {
		self.calls.borrow_mut().push("network_by_name");
		self.networks
			.borrow()
			.iter()
			.find(|n| n.name == name)
			.cloned()
			.ok_or_else(|| HnsError::NotFound(format!("network {}", name)))
	}

	fn create_network(&self, network: &NetworkInfo) -> Result<NetworkInfo, HnsError> {
		self.calls.borrow_mut().push("create_network");
		let mut created = network.clone();
		created.id = self.next_id();
		self.networks.borrow_mut().push(created.clone());

		if self.race_create_network.get() {
			Err(HnsError::AlreadyExists(network.name.clone()))
		} else {
			Ok(created)
		}
	}

	fn endpoint_by_name(&self, name: &str) -> Result<EndpointInfo, HnsError> {
		self.calls.borrow_mut().push("endpoint_by_name");
		if self.fail_lookup.get() {
			return Err(platform_error());
		}

		self.endpoints
			.borrow()
			.iter()
			.find(|e| e.name == name)
			.cloned()
			.ok_or_else(|| HnsError::NotFound(format!("endpoint {}", name)))
	}

	fn create_endpoint(
		&self,
		network_id: &str,
		endpoint: &EndpointInfo,
		namespace: &str,
	) -> Result<EndpointInfo, HnsError> {
		self.calls.borrow_mut().push("create_endpoint");
		if self.fail_create_endpoint.get() {
			return Err(platform_error());
		}

		let mut created = endpoint.clone();
		created.id = self.next_id();
		created.network_id = network_id.into();
		created.namespace = namespace.into();
		self.endpoints.borrow_mut().push(created.clone());
		Ok(created)
	}

	fn delete_endpoint(&self, id: &str) -> Result<(), HnsError> {
		self.calls.borrow_mut().push("delete_endpoint");
		if let Some(err) = self.fail_delete.borrow_mut().take() {
			return Err(err);
		}

		let mut endpoints = self.endpoints.borrow_mut();
		let before = endpoints.len();
		endpoints.retain(|e| e.id != id);
		if endpoints.len() == before {
			Err(HnsError::NotFound(format!("endpoint {}", id)))
		} else {
			Ok(())
		}
	}

	fn endpoint_policies(&self, _id: &str) -> Result<Vec<HcnPolicy>, HnsError> {
		self.calls.borrow_mut().push("endpoint_policies");
		Ok(self.policies.borrow().clone())
	}

	fn modify_endpoint_policies(
		&self,
		id: &str,
		request: RequestType,
		policies: Vec<HcnPolicy>,
	) -> Result<(), HnsError> {
		self.calls.borrow_mut().push("modify_endpoint_policies");
		self.modified
			.borrow_mut()
			.push((id.into(), request, policies));
		Ok(())
	}
}

#[derive(Debug)]
pub struct FakeIpam {
	pub reply: Value,
	pub allocations: RefCell<Vec<(String, Vec<u8>)>>,
	pub releases: RefCell<Vec<(String, Vec<u8>)>>,
	pub fail_release: Cell<bool>,
}

impl Default for FakeIpam {
	fn default() -> Self {
		Self {
			reply: json!({
				"cniVersion": "0.4.0",
				"ips": [{ "version": "4", "address": "10.244.1.5/24", "gateway": "10.244.1.1" }],
				"routes": [{ "dst": "0.0.0.0/0" }]
			}),
			allocations: Default::default(),
			releases: Default::default(),
			fail_release: Default::default(),
		}
	}
}

#[async_trait(?Send)]
impl IpamDelegate for FakeIpam {
	async fn allocate(&self, plugin: &str, config: &[u8]) -> Result<IpamSuccessReply, CniError> {
		self.allocations
			.borrow_mut()
			.push((plugin.into(), config.to_vec()));
		IpamSuccessReply::parse(self.reply.to_string().as_bytes())
	}

	async fn release(&self, plugin: &str, config: &[u8]) -> Result<(), CniError> {
		self.releases
			.borrow_mut()
			.push((plugin.into(), config.to_vec()));
		if self.fail_release.get() {
			Err(CniError::Generic("store unreachable".into()))
		} else {
			Ok(())
		}
	}
}

#[derive(Debug, Default)]
pub struct FakeSpawner {
	pub launched: RefCell<Vec<(PathBuf, Vec<String>)>>,
	pub ran: RefCell<Vec<(PathBuf, Vec<String>)>>,
	pub fail: Cell<bool>,
}

impl FakeSpawner {
	fn failure(program: &Path) -> AdvisoryError {
		AdvisoryError::Launch {
			program: program.into(),
			err: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "blocked"),
		}
	}
}

#[async_trait(?Send)]
impl Spawner for FakeSpawner {
	fn spawn_detached(&self, program: &Path, args: &[String]) -> Result<(), AdvisoryError> {
		self.launched
			.borrow_mut()
			.push((program.into(), args.to_vec()));
		if self.fail.get() {
			Err(Self::failure(program))
		} else {
			Ok(())
		}
	}

	async fn run(&self, program: &Path, args: &[String]) -> Result<String, AdvisoryError> {
		self.ran.borrow_mut().push((program.into(), args.to_vec()));
		if self.fail.get() {
			Err(Self::failure(program))
		} else {
			Ok("ok".into())
		}
	}
}

type TestBridge = Bridge<FakeHns, FakeIpam, FakeSpawner>;

fn bridge_in(dir: &TempDir, hns: FakeHns, toggles: Toggles) -> TestBridge {
	Bridge::new(
		hns,
		FakeIpam::default(),
		FakeSpawner::default(),
		Settings {
			version: "test",
			toggles,
			sidecar_dir: dir.path().to_path_buf(),
		},
	)
}

fn sidecar(dir: &TempDir, name: &str) -> PathBuf {
	let path = dir.path().join(format!("{}{}", name, EXE_SUFFIX));
	fs::write(&path, b"").unwrap();
	path
}

fn config(extra: Value) -> Vec<u8> {
	let mut config = json!({
		"cniVersion": "0.3.1",
		"name": "cbr0",
		"type": "sdnbridge",
		"ipam": { "type": "host-local", "subnet": "10.244.1.0/24" },
		"dns": { "Nameservers": ["10.96.0.10"] }
	});
	if let (Some(base), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
		for (k, v) in extra {
			base.insert(k.clone(), v.clone());
		}
	}
	config.to_string().into_bytes()
}

fn inputs(command: Command, netns: &str, payload: Vec<u8>) -> Inputs {
	Inputs {
		command,
		container_id: "4f6a5c1e8b9d".into(),
		ifname: "eth0".into(),
		netns: netns.into(),
		args: "K8S_POD_NAMESPACE=default;K8S_POD_NAME=web-0".parse().unwrap(),
		path: Vec::new(),
		payload,
	}
}

const NETNS: &str = "6c3f9a0e-4b1d-4f6e-9d2a-7b5c8e1f0a3d";

#[test]
fn add_creates_network_and_endpoint() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());

	let j = block_on(bridge.add(&inputs(Command::Add, NETNS, config(json!({})))))
		.unwrap()
		.0;
	assert_eq!(j["cniVersion"], "0.3.1");
	assert_eq!(j["interfaces"][0]["name"], "eth0");
	assert_eq!(j["ips"][0]["address"], "10.244.1.5/24");
	assert_eq!(j["ips"][0]["gateway"], "10.244.1.1");
	assert_eq!(j["ips"][0]["version"], "4");
	assert_eq!(j["dns"]["nameservers"], json!(["10.96.0.10"]));

	let networks = bridge.hns.networks.borrow();
	assert_eq!(networks.len(), 1);
	assert_eq!(networks[0].kind, NetworkType::L2Bridge);

	let endpoints = bridge.hns.endpoints.borrow();
	assert_eq!(endpoints.len(), 1);
	assert_eq!(endpoints[0].name, "4f6a5c1e8b9d_cbr0");
	assert_eq!(endpoints[0].network_id, networks[0].id);
	assert_eq!(endpoints[0].namespace, NETNS);
}

#[test]
fn add_twice_is_idempotent() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());
	let payload = config(json!({}));

	let first = block_on(bridge.add(&inputs(Command::Add, NETNS, payload.clone()))).unwrap();
	let second = block_on(bridge.add(&inputs(Command::Add, NETNS, payload))).unwrap();

	assert_eq!(first.0, second.0);
	assert_eq!(bridge.hns.endpoints.borrow().len(), 1);
	assert_eq!(bridge.hns.called("create_network"), 1);
	assert_eq!(bridge.hns.called("create_endpoint"), 1);
	assert_eq!(bridge.ipam.allocations.borrow().len(), 1);
	assert!(bridge.ipam.releases.borrow().is_empty());
}

#[test]
fn commit_failure_releases_allocation_once() {
	let dir = tempfile::tempdir().unwrap();
	let hns = FakeHns::default();
	hns.fail_create_endpoint.set(true);
	let bridge = bridge_in(&dir, hns, Toggles::default());
	bridge.ipam.fail_release.set(true);
	let payload = config(json!({}));

	let err = block_on(bridge.add(&inputs(Command::Add, NETNS, payload.clone()))).unwrap_err();
	match &err {
		BridgeError::Hns { context, .. } => assert_eq!(*context, "commit endpoint"),
		other => panic!("unexpected {:?}", other),
	}
	assert!(err.to_string().contains("access denied"));

	let releases = bridge.ipam.releases.borrow();
	assert_eq!(releases.len(), 1);
	assert_eq!(releases[0].0, "host-local");
	assert_eq!(releases[0].1, payload);
	assert!(bridge.hns.endpoints.borrow().is_empty());
}

#[test]
fn dual_stack_needs_existing_network() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());
	let payload = config(json!({ "optionalFlags": { "enableDualStack": true } }));

	let err = block_on(bridge.add(&inputs(Command::Add, NETNS, payload))).unwrap_err();
	assert!(matches!(err, BridgeError::DualStackNetworkMissing { .. }));
	assert!(err.to_string().contains("l2bridge"));
	assert_eq!(bridge.hns.called("create_network"), 0);
	assert!(bridge.hns.networks.borrow().is_empty());
	assert!(bridge.ipam.allocations.borrow().is_empty());
}

#[test]
fn dual_stack_refuses_other_network_types() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(
		&dir,
		FakeHns::with_network("cbr0", NetworkType::Nat),
		Toggles::default(),
	);
	let payload = config(json!({ "optionalFlags": { "enableDualStack": true } }));

	let err = block_on(bridge.add(&inputs(Command::Add, NETNS, payload))).unwrap_err();
	assert!(matches!(err, BridgeError::DualStackMismatch(NetworkType::Nat)));
	assert!(err.to_string().contains("non l2bridge"));
	assert_eq!(bridge.hns.called("create_network"), 0);
	assert_eq!(bridge.hns.called("create_endpoint"), 0);
}

#[test]
fn dual_stack_on_existing_bridge() {
	let dir = tempfile::tempdir().unwrap();
	let mut bridge = bridge_in(
		&dir,
		FakeHns::with_network("cbr0", NetworkType::L2Bridge),
		Toggles::default(),
	);
	bridge.ipam.reply = json!({
		"cniVersion": "1.0.0",
		"ips": [
			{ "address": "10.244.1.5/24", "gateway": "10.244.1.1" },
			{ "address": "fd00::5/64", "gateway": "fd00::1" }
		]
	});
	let payload = config(json!({ "optionalFlags": { "enableDualStack": true } }));

	let j = block_on(bridge.add(&inputs(Command::Add, NETNS, payload.clone())))
		.unwrap()
		.0;
	assert_eq!(j["ips"][1]["address"], "fd00::5/64");
	assert_eq!(j["ips"][1]["gateway"], "fd00::1");

	let allocations = bridge.ipam.allocations.borrow();
	assert_ne!(allocations[0].1, payload);
	let sent: Value = serde_json::from_slice(&allocations[0].1).unwrap();
	assert_eq!(sent["optionalFlags"]["enableDualStack"], true);
}

#[test]
fn network_creation_race_is_tolerated() {
	let dir = tempfile::tempdir().unwrap();
	let hns = FakeHns::default();
	hns.race_create_network.set(true);
	let bridge = bridge_in(&dir, hns, Toggles::default());

	block_on(bridge.add(&inputs(Command::Add, NETNS, config(json!({}))))).unwrap();
	assert_eq!(bridge.hns.networks.borrow().len(), 1);
	assert_eq!(bridge.hns.endpoints.borrow().len(), 1);
}

#[test]
fn gateways_from_additional_routes() {
	let dir = tempfile::tempdir().unwrap();
	let mut bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());
	bridge.ipam.reply = json!({
		"cniVersion": "0.4.0",
		"ips": [{ "version": "4", "address": "10.0.0.5/24" }]
	});
	let payload = config(json!({
		"optionalFlags": { "gatewayFromAdditionalRoutes": true },
		"AdditionalRoutes": [
			{ "dst": "10.96.0.0/12", "gw": "10.0.0.254" },
			{ "dst": "0.0.0.0/0", "gw": "10.0.0.1" },
			{ "dst": "::/0", "gw": "fd00::1" },
			{ "dst": "0.0.0.0/0", "gw": "10.0.0.99" }
		]
	}));

	block_on(bridge.add(&inputs(Command::Add, NETNS, payload))).unwrap();

	let endpoints = bridge.hns.endpoints.borrow();
	let ep = &endpoints[0];
	assert_eq!(ep.gateway, Some("10.0.0.1".parse().unwrap()));
	assert_eq!(ep.gateway6, Some("fd00::1".parse().unwrap()));
	let overrides: Vec<_> = ep
		.policies
		.iter()
		.filter(|p| matches!(p, Policy::RouteOverride { .. }))
		.collect();
	assert_eq!(overrides.len(), 2);
}

#[test]
fn endpoint_policies_and_loopback_dsr() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());
	let payload = config(json!({
		"optionalFlags": { "loopbackDSR": true },
		"AdditionalArgs": [
			{ "name": "EndpointPolicy", "value": { "Type": "OutBoundNAT", "Settings": { "Exceptions": ["10.244.0.0/16"] } } },
			{ "name": "NetworkPolicy", "value": { "Type": "ProviderAddress", "Settings": { "ProviderAddress": "192.168.1.10" } } }
		],
		"runtimeConfig": { "portMappings": [{ "hostPort": 8080, "containerPort": 80, "protocol": "tcp" }] }
	}));

	block_on(bridge.add(&inputs(Command::Add, NETNS, payload))).unwrap();

	let endpoints = bridge.hns.endpoints.borrow();
	let kinds: Vec<String> = endpoints[0]
		.policies
		.iter()
		.map(|p| p.to_hcn().unwrap().kind)
		.collect();
	assert_eq!(kinds, vec!["PortMapping", "OutBoundNAT", "OutBoundNAT"]);
	assert_eq!(
		endpoints[0].policies[2],
		Policy::LoopbackDsr {
			address: "10.244.1.5".parse().unwrap()
		}
	);
}

#[test]
fn acl_port_mapping_flag_changes_nothing() {
	let mappings = json!({
		"portMappings": [{ "hostPort": 8080, "containerPort": 80, "protocol": "tcp" }]
	});
	let policies = |flags: Value| {
		let dir = tempfile::tempdir().unwrap();
		let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());
		let payload = config(json!({ "optionalFlags": flags, "runtimeConfig": mappings }));
		block_on(bridge.add(&inputs(Command::Add, NETNS, payload))).unwrap();
		let endpoints = bridge.hns.endpoints.borrow();
		endpoints[0].policies.clone()
	};

	let plain = policies(json!({}));
	let acl = policies(json!({ "allowAclPortMapping": true }));
	assert_eq!(acl, plain);
	assert!(matches!(acl[..], [Policy::PortMapping { .. }]));
}

#[test]
fn add_requires_namespace() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());

	let err = block_on(bridge.add(&inputs(Command::Add, "", config(json!({}))))).unwrap_err();
	assert!(matches!(err, BridgeError::MissingNamespace));
	assert!(err.to_string().contains("namespace"));
	assert!(bridge.hns.calls.borrow().is_empty());
	assert!(bridge.ipam.allocations.borrow().is_empty());
}

#[test]
fn add_rejects_bad_config() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());

	let err =
		block_on(bridge.add(&inputs(Command::Add, NETNS, b"{not json".to_vec()))).unwrap_err();
	assert!(matches!(err, BridgeError::Cni(CniError::Json(_))));

	let err = block_on(bridge.add(&inputs(
		Command::Add,
		NETNS,
		config(json!({ "type": "transparent" })),
	)))
	.unwrap_err();
	assert!(matches!(err, BridgeError::UnsupportedNetworkType(_)));
	assert!(bridge.hns.calls.borrow().is_empty());
}

#[test]
fn launches_vfp_injector_with_port_id() {
	let dir = tempfile::tempdir().unwrap();
	let injector = sidecar(&dir, vfp::INJECTOR);
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());

	block_on(bridge.add(&inputs(Command::Add, NETNS, config(json!({}))))).unwrap();

	let id = bridge.hns.endpoints.borrow()[0].id.clone();
	let launched = bridge.spawner.launched.borrow();
	assert_eq!(launched.len(), 1);
	assert_eq!(launched[0].0, injector);
	assert_eq!(launched[0].1, vec!["-portid".to_string(), id]);
	assert!(bridge.spawner.ran.borrow().is_empty());
}

#[test]
fn vfp_injector_can_be_disabled() {
	let dir = tempfile::tempdir().unwrap();
	sidecar(&dir, vfp::INJECTOR);
	let bridge = bridge_in(
		&dir,
		FakeHns::default(),
		Toggles {
			vfp_rules: false,
			enhanced_security: false,
		},
	);

	block_on(bridge.add(&inputs(Command::Add, NETNS, config(json!({}))))).unwrap();
	assert!(bridge.spawner.launched.borrow().is_empty());
}

#[test]
fn enhanced_security_applies_proxy_policy() {
	let dir = tempfile::tempdir().unwrap();
	let l4proxy = sidecar(&dir, L4PROXY);
	fs::write(
		dir.path().join(vfp::RULES_FILE),
		json!({ "hnsproxy": { "inboundproxyport": "15006", "outboundproxyport": "15001" } })
			.to_string(),
	)
	.unwrap();
	let bridge = bridge_in(
		&dir,
		FakeHns::default(),
		Toggles {
			vfp_rules: true,
			enhanced_security: true,
		},
	);

	block_on(bridge.add(&inputs(Command::Add, NETNS, config(json!({}))))).unwrap();

	let id = bridge.hns.endpoints.borrow()[0].id.clone();
	let modified = bridge.hns.modified.borrow();
	assert_eq!(modified.len(), 1);
	assert_eq!(modified[0].0, id);
	assert_eq!(modified[0].1, RequestType::Add);
	assert_eq!(modified[0].2[0].kind, L4_WFP_PROXY);

	let ran = bridge.spawner.ran.borrow();
	assert_eq!(ran.len(), 1);
	assert_eq!(ran[0].0, l4proxy);
	assert_eq!(
		ran[0].1,
		vec!["-endpointid", id.as_str(), "-namespace", "default", "-podname", "web-0"]
			.into_iter()
			.map(String::from)
			.collect::<Vec<_>>()
	);
}

#[test]
fn advisory_failures_do_not_fail_add() {
	let baseline_dir = tempfile::tempdir().unwrap();
	let baseline = bridge_in(&baseline_dir, FakeHns::default(), Toggles::default());
	let expected = block_on(baseline.add(&inputs(Command::Add, NETNS, config(json!({})))))
		.unwrap()
		.0;

	// Sidecars present but failing, and no vfprules.json for the proxy policy.
	let dir = tempfile::tempdir().unwrap();
	sidecar(&dir, vfp::INJECTOR);
	sidecar(&dir, L4PROXY);
	let bridge = bridge_in(
		&dir,
		FakeHns::default(),
		Toggles {
			vfp_rules: true,
			enhanced_security: true,
		},
	);
	bridge.spawner.fail.set(true);

	let reply = block_on(bridge.add(&inputs(Command::Add, NETNS, config(json!({})))))
		.unwrap()
		.0;
	assert_eq!(reply, expected);
	assert_eq!(bridge.spawner.launched.borrow().len(), 1);
	assert_eq!(bridge.spawner.ran.borrow().len(), 1);
	assert!(bridge.hns.modified.borrow().is_empty());
	assert_eq!(bridge.hns.endpoints.borrow().len(), 1);
	assert!(bridge.ipam.releases.borrow().is_empty());
}

#[test]
fn del_removes_endpoint() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());
	let payload = config(json!({}));

	block_on(bridge.add(&inputs(Command::Add, NETNS, payload.clone()))).unwrap();
	block_on(bridge.del(&inputs(Command::Del, NETNS, payload.clone()))).unwrap();

	assert!(bridge.hns.endpoints.borrow().is_empty());
	let releases = bridge.ipam.releases.borrow();
	assert_eq!(releases.len(), 1);
	assert_eq!(releases[0].1, payload);
}

#[test]
fn del_of_missing_endpoint_succeeds() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());

	block_on(bridge.del(&inputs(Command::Del, NETNS, config(json!({}))))).unwrap();
	block_on(bridge.del(&inputs(Command::Del, "", config(json!({}))))).unwrap();

	assert_eq!(bridge.hns.called("delete_endpoint"), 0);
	assert_eq!(bridge.ipam.releases.borrow().len(), 2);
}

#[test]
fn del_fails_when_release_fails() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());
	bridge.ipam.fail_release.set(true);

	let err = block_on(bridge.del(&inputs(Command::Del, NETNS, config(json!({}))))).unwrap_err();
	assert!(matches!(err, BridgeError::IpamRelease(_)));
	assert!(err.to_string().starts_with("ipam deletion failed"));
	assert!(bridge.hns.calls.borrow().is_empty());
}

#[test]
fn del_without_ipam_skips_release() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());

	block_on(bridge.del(&inputs(
		Command::Del,
		NETNS,
		config(json!({ "ipam": { "subnet": "10.244.1.0/24" } })),
	)))
	.unwrap();
	assert!(bridge.ipam.releases.borrow().is_empty());
}

#[test]
fn workload_container_gets_its_own_endpoint() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::default(), Toggles::default());

	let mut workload = inputs(Command::Add, "container:pause1", config(json!({})));
	workload.container_id = "abc".into();
	block_on(bridge.add(&workload)).unwrap();

	let names: Vec<String> = bridge
		.hns
		.endpoints
		.borrow()
		.iter()
		.map(|e| e.name.clone())
		.collect();
	assert_eq!(names, vec!["abc_cbr0".to_string()]);
	assert_eq!(bridge.ipam.allocations.borrow().len(), 1);
}

#[test]
fn del_follows_linked_container() {
	let dir = tempfile::tempdir().unwrap();
	let bridge = bridge_in(&dir, FakeHns::with_endpoint("pause1_cbr0"), Toggles::default());

	let mut workload = inputs(Command::Del, "container:pause1", config(json!({})));
	workload.container_id = "abc".into();
	block_on(bridge.del(&workload)).unwrap();

	assert!(bridge.hns.endpoints.borrow().is_empty());
}

#[test]
fn add_fails_when_endpoint_lookup_fails() {
	let dir = tempfile::tempdir().unwrap();
	let hns = FakeHns::default();
	hns.fail_lookup.set(true);
	let bridge = bridge_in(&dir, hns, Toggles::default());

	let err = block_on(bridge.add(&inputs(Command::Add, NETNS, config(json!({}))))).unwrap_err();
	match &err {
		BridgeError::Hns { context, .. } => assert_eq!(*context, "find endpoint"),
		other => panic!("unexpected {:?}", other),
	}
	assert_eq!(bridge.hns.called("create_endpoint"), 0);
	assert!(bridge.ipam.allocations.borrow().is_empty());
}

#[test]
fn del_of_endpoint_gone_meanwhile_succeeds() {
	let dir = tempfile::tempdir().unwrap();
	let hns = FakeHns::with_endpoint("4f6a5c1e8b9d_cbr0");
	*hns.fail_delete.borrow_mut() = Some(HnsError::NotFound("endpoint".into()));
	let bridge = bridge_in(&dir, hns, Toggles::default());

	block_on(bridge.del(&inputs(Command::Del, NETNS, config(json!({}))))).unwrap();
	assert_eq!(bridge.hns.called("delete_endpoint"), 1);
	assert_eq!(bridge.ipam.releases.borrow().len(), 1);
}

#[test]
fn del_returns_platform_delete_failure() {
	let dir = tempfile::tempdir().unwrap();
	let hns = FakeHns::with_endpoint("4f6a5c1e8b9d_cbr0");
	*hns.fail_delete.borrow_mut() = Some(platform_error());
	let bridge = bridge_in(&dir, hns, Toggles::default());

	let err = block_on(bridge.del(&inputs(Command::Del, NETNS, config(json!({}))))).unwrap_err();
	match &err {
		BridgeError::Hns { context, .. } => assert_eq!(*context, "delete endpoint"),
		other => panic!("unexpected {:?}", other),
	}
	assert!(err.to_string().contains("access denied"));
	assert_eq!(bridge.hns.endpoints.borrow().len(), 1);
}
