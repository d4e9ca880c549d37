//! Per-request context threaded through the plugin pipeline, planner and
//! executor (spec.md §4.7: "the only inter-plugin protocol").

use federation::OperationPermissions;
use http::HeaderValue;
use std::collections::HashMap;
use std::sync::RwLock;

/// Mutable request-scoped state plugins read and write. One instance per
/// inbound request; cheap to clone (an `Arc` would also work, but nothing
/// here crosses a task boundary except by reference, so a plain struct
/// behind a lock is enough).
#[derive(Default)]
pub struct RequestContext {
    outgoing_headers: RwLock<HashMap<String, HeaderValue>>,
    permissions: RwLock<Option<OperationPermissions>>,
    debug: RwLock<bool>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the `headers` plugin so C8 forwards this header on every
    /// upstream call.
    pub fn add_outgoing_requests_header(&self, header: &str, value: HeaderValue) {
        self.outgoing_headers
            .write()
            .expect("context lock poisoned")
            .insert(header.to_ascii_lowercase(), value);
    }

    pub fn outgoing_headers(&self) -> HashMap<String, HeaderValue> {
        self.outgoing_headers.read().expect("context lock poisoned").clone()
    }

    /// Called by the authentication plugin; read by C3 when filtering the
    /// operation.
    pub fn add_permissions(&self, permissions: OperationPermissions) {
        *self.permissions.write().expect("context lock poisoned") = Some(permissions);
    }

    /// The caller's permissions, defaulting to allow-all for gateways run
    /// without an authentication plugin configured.
    pub fn permissions(&self) -> OperationPermissions {
        self.permissions
            .read()
            .expect("context lock poisoned")
            .clone()
            .unwrap_or_else(OperationPermissions::allow_all)
    }

    pub fn set_debug(&self, debug: bool) {
        *self.debug.write().expect("context lock poisoned") = debug;
    }

    pub fn debug(&self) -> bool {
        *self.debug.read().expect("context lock poisoned")
    }
}
