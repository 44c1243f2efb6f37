//! URL helpers for building LLM endpoint addresses.
//!
//! Base URLs come from the environment and may or may not carry trailing
//! slashes; endpoints are joined without producing doubled separators.

/// Normalize a base URL by removing trailing slashes.
///
/// # Examples
///
/// ```
/// use sqlmate::utils::url::normalize_base_url;
///
/// assert_eq!(normalize_base_url("https://api.openai.com/v1/"), "https://api.openai.com/v1");
/// assert_eq!(normalize_base_url("https://example.openai.azure.com///"), "https://example.openai.azure.com");
/// ```
pub fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Join a base URL and an endpoint path with exactly one slash between them.
///
/// # Examples
///
/// ```
/// use sqlmate::utils::url::construct_api_url;
///
/// assert_eq!(
///     construct_api_url("https://api.openai.com/v1/", "/chat/completions"),
///     "https://api.openai.com/v1/chat/completions"
/// );
/// ```
pub fn construct_api_url(base_url: &str, endpoint: &str) -> String {
    let normalized_base = normalize_base_url(base_url);
    let endpoint = endpoint.trim_start_matches('/');
    format!("{}/{}", normalized_base, endpoint)
}
