//! The one `reqwest::Client` a gateway process uses for every outbound
//! call, to backing services (registry polling, the executor) alike
//! (spec.md §4.8: connection pooling is shared, not per-request).

use std::time::Duration;

/// `timeout` bounds an individual request; callers that need a tighter
/// per-operation deadline (the executor) still race the client call
/// against their own timeout, since `reqwest`'s applies per-request, not
/// per-connection-reuse.
pub fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("static reqwest client configuration is always valid")
}
