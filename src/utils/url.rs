//! URL helpers for building provider endpoints.
//!
//! Base URLs arrive from config with unpredictable trailing slashes; these
//! helpers keep endpoint construction free of doubled separators.

/// Strip trailing slashes from a configured base URL.
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one separator.
pub fn join_endpoint(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        normalize_base_url(base_url),
        endpoint.trim_start_matches('/')
    )
}
