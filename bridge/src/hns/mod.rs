//! The Host Network Service, as a resource manager.
//!
//! [`ResourceManager`] is the small surface the orchestrator needs. [`Hns`]
//! implements it over the HCN v2 API; off Windows every call fails with
//! [`HnsError::Unsupported`].

use log::{debug, warn};
use thiserror::Error;
use uuid::Uuid;

use self::schema::{
	HcnPolicy, HostComputeEndpoint, HostComputeNetwork, HostComputeQuery,
	ModifyEndpointSettingRequest, ModifyNamespaceSettingRequest, RequestType,
};
use crate::network::{EndpointInfo, NetworkInfo};

pub mod schema;

#[cfg(windows)]
mod ffi;
#[cfg(windows)]
use ffi as api;

#[cfg(not(windows))]
mod unsupported;
#[cfg(not(windows))]
use unsupported as api;

const HCN_E_NETWORK_NOT_FOUND: u32 = 0x803B_0001;
const HCN_E_ENDPOINT_NOT_FOUND: u32 = 0x803B_0002;
const HRESULT_ERROR_NOT_FOUND: u32 = 0x8007_0490;
const HRESULT_ERROR_ALREADY_EXISTS: u32 = 0x8007_00B7;

#[derive(Debug, Error)]
pub enum HnsError {
	#[error("not found: {0}")]
	NotFound(String),

	#[error("already exists: {0}")]
	AlreadyExists(String),

	#[error("HNS call failed ({code:#010x}): {message}")]
	Platform { code: u32, message: String },

	#[error("cannot decode HNS document: {0}")]
	Decode(#[from] serde_json::Error),

	#[error("invalid HNS identifier {0:?}")]
	InvalidId(String),

	#[error("the Host Network Service is only available on Windows")]
	Unsupported,
}

impl HnsError {
	/// Classify a failed HRESULT.
	pub fn from_hresult(hr: i32, message: String) -> Self {
		match hr as u32 {
			HCN_E_NETWORK_NOT_FOUND | HCN_E_ENDPOINT_NOT_FOUND | HRESULT_ERROR_NOT_FOUND => {
				Self::NotFound(message)
			}
			HRESULT_ERROR_ALREADY_EXISTS => Self::AlreadyExists(message),
			code => Self::Platform { code, message },
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound(_))
	}
}

/// Networks and endpoints, by name.
///
/// Nothing here holds a lock: other plugin invocations may create or delete
/// the same objects concurrently, so callers must handle
/// [`HnsError::NotFound`] and [`HnsError::AlreadyExists`].
pub trait ResourceManager {
	fn network_by_name(&self, name: &str) -> Result<NetworkInfo, HnsError>;

	fn create_network(&self, network: &NetworkInfo) -> Result<NetworkInfo, HnsError>;

	fn endpoint_by_name(&self, name: &str) -> Result<EndpointInfo, HnsError>;

	/// Create an endpoint on a network, and attach it to `namespace` when
	/// that is an HNS namespace id.
	fn create_endpoint(
		&self,
		network_id: &str,
		endpoint: &EndpointInfo,
		namespace: &str,
	) -> Result<EndpointInfo, HnsError>;

	fn delete_endpoint(&self, id: &str) -> Result<(), HnsError>;

	/// Policies currently on an endpoint.
	fn endpoint_policies(&self, id: &str) -> Result<Vec<HcnPolicy>, HnsError>;

	fn modify_endpoint_policies(
		&self,
		id: &str,
		request: RequestType,
		policies: Vec<HcnPolicy>,
	) -> Result<(), HnsError>;
}

/// The Host Network Service.
#[derive(Clone, Copy, Debug, Default)]
pub struct Hns;

impl Hns {
	fn endpoint(
		&self,
		query: HostComputeQuery,
		what: &str,
	) -> Result<HostComputeEndpoint, HnsError> {
		let docs = api::list_endpoints(&serde_json::to_string(&query)?)?;
		let doc = docs
			.first()
			.ok_or_else(|| HnsError::NotFound(format!("endpoint {}", what)))?;
		Ok(serde_json::from_str(doc)?)
	}
}

impl ResourceManager for Hns {
	fn network_by_name(&self, name: &str) -> Result<NetworkInfo, HnsError> {
		let query = serde_json::to_string(&HostComputeQuery::by_name(name))?;
		let docs = api::list_networks(&query)?;
		let doc = docs
			.first()
			.ok_or_else(|| HnsError::NotFound(format!("network {}", name)))?;
		let network: HostComputeNetwork = serde_json::from_str(doc)?;
		debug!("found network {} id={}", network.name, network.id);
		Ok(NetworkInfo::from_hcn(network))
	}

	fn create_network(&self, network: &NetworkInfo) -> Result<NetworkInfo, HnsError> {
		let settings = serde_json::to_string(&network.to_hcn()?)?;
		debug!("creating network: {}", settings);
		let query = serde_json::to_string(&HostComputeQuery::default())?;
		let doc = api::create_network(&settings, &query)?;
		Ok(NetworkInfo::from_hcn(serde_json::from_str(&doc)?))
	}

	fn endpoint_by_name(&self, name: &str) -> Result<EndpointInfo, HnsError> {
		self.endpoint(HostComputeQuery::by_name(name), name)
			.map(EndpointInfo::from_hcn)
	}

	fn create_endpoint(
		&self,
		network_id: &str,
		endpoint: &EndpointInfo,
		namespace: &str,
	) -> Result<EndpointInfo, HnsError> {
		let settings = serde_json::to_string(&endpoint.to_hcn(network_id)?)?;
		debug!("creating endpoint: {}", settings);
		let query = serde_json::to_string(&HostComputeQuery::default())?;
		let doc = api::create_endpoint(parse_id(network_id)?, &settings, &query)?;
		let mut created = EndpointInfo::from_hcn(serde_json::from_str(&doc)?);

		if let Ok(namespace_id) = Uuid::parse_str(namespace) {
			debug!("attaching endpoint {} to namespace {}", created.id, namespace);
			let request =
				serde_json::to_string(&ModifyNamespaceSettingRequest::add_endpoint(&created.id))?;
			if let Err(err) = api::modify_namespace(namespace_id, &request) {
				if let Err(cleanup) = parse_id(&created.id).and_then(api::delete_endpoint) {
					warn!("could not remove unattached endpoint {}: {}", created.id, cleanup);
				}
				return Err(err);
			}
			created.namespace = namespace.into();
		}

		Ok(created)
	}

	fn delete_endpoint(&self, id: &str) -> Result<(), HnsError> {
		api::delete_endpoint(parse_id(id)?)
	}

	fn endpoint_policies(&self, id: &str) -> Result<Vec<HcnPolicy>, HnsError> {
		Ok(self.endpoint(HostComputeQuery::by_id(id), id)?.policies)
	}

	fn modify_endpoint_policies(
		&self,
		id: &str,
		request: RequestType,
		policies: Vec<HcnPolicy>,
	) -> Result<(), HnsError> {
		let settings =
			serde_json::to_string(&ModifyEndpointSettingRequest::policies(request, policies))?;
		debug!("modifying endpoint {}: {}", id, settings);
		api::modify_endpoint(parse_id(id)?, &settings)
	}
}

/// Parse an HNS identifier.
fn parse_id(id: &str) -> Result<Uuid, HnsError> {
	Uuid::parse_str(id).map_err(|_| HnsError::InvalidId(id.into()))
}
