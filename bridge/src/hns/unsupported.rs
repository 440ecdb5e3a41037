use uuid::Uuid;

use super::HnsError;

pub fn list_networks(_query: &str) -> Result<Vec<String>, HnsError> {
	Err(HnsError::Unsupported)
}

pub fn create_network(_settings: &str, _query: &str) -> Result<String, HnsError> {
	Err(HnsError::Unsupported)
}

pub fn list_endpoints(_query: &str) -> Result<Vec<String>, HnsError> {
	Err(HnsError::Unsupported)
}

pub fn create_endpoint(_network: Uuid, _settings: &str, _query: &str) -> Result<String, HnsError> {
	Err(HnsError::Unsupported)
}

pub fn delete_endpoint(_id: Uuid) -> Result<(), HnsError> {
	Err(HnsError::Unsupported)
}

pub fn modify_endpoint(_id: Uuid, _settings: &str) -> Result<(), HnsError> {
	Err(HnsError::Unsupported)
}

pub fn modify_namespace(_id: Uuid, _settings: &str) -> Result<(), HnsError> {
	Err(HnsError::Unsupported)
}
