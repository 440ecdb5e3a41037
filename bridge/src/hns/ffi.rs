//! Host Compute Network calls, from `computenetwork.dll`.
//!
//! Every call takes and returns JSON documents as UTF-16 strings. Output
//! strings are allocated by the service and freed here with `CoTaskMemFree`.

use std::{ffi::c_void, iter::once, ptr, slice};

use log::debug;
use uuid::Uuid;
use windows_sys::{
	core::{GUID, HRESULT, PWSTR},
	Win32::System::{
		Com::CoTaskMemFree,
		HostComputeNetwork::{
			HcnCloseEndpoint, HcnCloseNamespace, HcnCloseNetwork, HcnCreateEndpoint,
			HcnCreateNetwork, HcnDeleteEndpoint, HcnEnumerateEndpoints, HcnEnumerateNetworks,
			HcnModifyEndpoint, HcnModifyNamespace, HcnOpenEndpoint, HcnOpenNamespace,
			HcnOpenNetwork, HcnQueryEndpointProperties, HcnQueryNetworkProperties,
		},
	},
};

use super::HnsError;

type HcnHandle = *mut c_void;

fn to_guid(id: Uuid) -> GUID {
	let (data1, data2, data3, data4) = id.as_fields();
	GUID {
		data1,
		data2,
		data3,
		data4: *data4,
	}
}

fn null_guid() -> GUID {
	to_guid(Uuid::nil())
}

fn wide(s: &str) -> Vec<u16> {
	s.encode_utf16().chain(once(0)).collect()
}

/// Take ownership of a service-allocated string.
///
/// # Safety
///
/// `p` must be null or a NUL-terminated string allocated with `CoTaskMemAlloc`.
unsafe fn take_string(p: PWSTR) -> Option<String> {
	if p.is_null() {
		return None;
	}

	let mut len = 0;
	while *p.add(len) != 0 {
		len += 1;
	}

	let s = String::from_utf16_lossy(slice::from_raw_parts(p, len));
	CoTaskMemFree(p as *const c_void);
	Some(s)
}

/// Turn an HRESULT and its error record into a result.
///
/// # Safety
///
/// As for [`take_string`].
unsafe fn check(hr: HRESULT, error_record: PWSTR) -> Result<(), HnsError> {
	let record = take_string(error_record);
	if hr < 0 {
		let message = record.unwrap_or_default();
		debug!("HCN call failed hr={:#010x} record={}", hr, message);
		Err(HnsError::from_hresult(hr, message))
	} else {
		Ok(())
	}
}

/// Call with an error record out-parameter, and check the outcome.
fn call(f: impl FnOnce(*mut PWSTR) -> HRESULT) -> Result<(), HnsError> {
	let mut error_record: PWSTR = ptr::null_mut();
	let hr = f(&mut error_record);
	unsafe { check(hr, error_record) }
}

/// Call with a string out-parameter and an error record.
fn call_string(f: impl FnOnce(*mut PWSTR, *mut PWSTR) -> HRESULT) -> Result<String, HnsError> {
	let mut out: PWSTR = ptr::null_mut();
	call(|error_record| f(&mut out, error_record))?;
	Ok(unsafe { take_string(out) }.unwrap_or_default())
}

macro_rules! handle {
	($name:ident, $close:ident) => {
		struct $name(HcnHandle);

		impl Drop for $name {
			fn drop(&mut self) {
				if !self.0.is_null() {
					unsafe {
						$close(self.0);
					}
				}
			}
		}
	};
}

handle!(NetworkHandle, HcnCloseNetwork);
handle!(EndpointHandle, HcnCloseEndpoint);
handle!(NamespaceHandle, HcnCloseNamespace);

fn ids(list: &str) -> Result<Vec<Uuid>, HnsError> {
	let ids: Vec<String> = if list.is_empty() {
		Vec::new()
	} else {
		serde_json::from_str(list)?
	};
	ids.iter()
		.map(|id| Uuid::parse_str(id).map_err(|_| HnsError::InvalidId(id.clone())))
		.collect()
}

fn open_network(id: Uuid) -> Result<NetworkHandle, HnsError> {
	let guid = to_guid(id);
	let mut handle = NetworkHandle(ptr::null_mut());
	call(|err| unsafe { HcnOpenNetwork(&guid, &mut handle.0, err) })?;
	Ok(handle)
}

fn open_endpoint(id: Uuid) -> Result<EndpointHandle, HnsError> {
	let guid = to_guid(id);
	let mut handle = EndpointHandle(ptr::null_mut());
	call(|err| unsafe { HcnOpenEndpoint(&guid, &mut handle.0, err) })?;
	Ok(handle)
}

fn network_properties(network: &NetworkHandle, query: &[u16]) -> Result<String, HnsError> {
	call_string(|out, err| unsafe {
		HcnQueryNetworkProperties(network.0, query.as_ptr(), out, err)
	})
}

fn endpoint_properties(endpoint: &EndpointHandle, query: &[u16]) -> Result<String, HnsError> {
	call_string(|out, err| unsafe {
		HcnQueryEndpointProperties(endpoint.0, query.as_ptr(), out, err)
	})
}

pub fn list_networks(query: &str) -> Result<Vec<String>, HnsError> {
	let query = wide(query);
	let list = call_string(|out, err| unsafe { HcnEnumerateNetworks(query.as_ptr(), out, err) })?;
	ids(&list)?
		.into_iter()
		.map(|id| network_properties(&open_network(id)?, &query))
		.collect()
}

pub fn create_network(settings: &str, query: &str) -> Result<String, HnsError> {
	let settings = wide(settings);
	let mut handle = NetworkHandle(ptr::null_mut());
	let id = null_guid();
	call(|err| unsafe { HcnCreateNetwork(&id, settings.as_ptr(), &mut handle.0, err) })?;
	network_properties(&handle, &wide(query))
}

pub fn list_endpoints(query: &str) -> Result<Vec<String>, HnsError> {
	let query = wide(query);
	let list = call_string(|out, err| unsafe { HcnEnumerateEndpoints(query.as_ptr(), out, err) })?;
	ids(&list)?
		.into_iter()
		.map(|id| endpoint_properties(&open_endpoint(id)?, &query))
		.collect()
}

pub fn create_endpoint(network: Uuid, settings: &str, query: &str) -> Result<String, HnsError> {
	let network = open_network(network)?;
	let settings = wide(settings);
	let mut handle = EndpointHandle(ptr::null_mut());
	let id = null_guid();
	call(|err| unsafe {
		HcnCreateEndpoint(network.0, &id, settings.as_ptr(), &mut handle.0, err)
	})?;
	endpoint_properties(&handle, &wide(query))
}

pub fn delete_endpoint(id: Uuid) -> Result<(), HnsError> {
	let guid = to_guid(id);
	call(|err| unsafe { HcnDeleteEndpoint(&guid, err) })
}

pub fn modify_endpoint(id: Uuid, settings: &str) -> Result<(), HnsError> {
	let endpoint = open_endpoint(id)?;
	let settings = wide(settings);
	call(|err| unsafe { HcnModifyEndpoint(endpoint.0, settings.as_ptr(), err) })
}

pub fn modify_namespace(id: Uuid, settings: &str) -> Result<(), HnsError> {
	let guid = to_guid(id);
	let mut namespace = NamespaceHandle(ptr::null_mut());
	call(|err| unsafe { HcnOpenNamespace(&guid, &mut namespace.0, err) })?;
	let settings = wide(settings);
	call(|err| unsafe { HcnModifyNamespace(namespace.0, settings.as_ptr(), err) })
}
