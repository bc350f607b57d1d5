//! Authentication headers for outbound provider requests.

use crate::provider::ProviderKind;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Attach the selected provider's authentication headers to a request.
///
/// Anthropic uses `x-api-key` plus a pinned `anthropic-version`; Gemini uses
/// `x-goog-api-key`; everything OpenAI-compatible uses a bearer token.
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    provider: ProviderKind,
    api_key: &str,
) -> reqwest::RequestBuilder {
    match provider {
        ProviderKind::Anthropic => request
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION),
        ProviderKind::Gemini => request.header("x-goog-api-key", api_key),
        ProviderKind::OpenAi => request.header("Authorization", format!("Bearer {api_key}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_value(request: &reqwest::Request, name: &str) -> Option<String> {
        request
            .headers()
            .get(name)
            .map(|value| value.to_str().unwrap_or_default().to_string())
    }

    #[test]
    fn anthropic_uses_api_key_header() {
        let client = reqwest::Client::new();
        let request = add_auth_headers(
            client.get("https://example.com"),
            ProviderKind::Anthropic,
            "k",
        )
        .build()
        .unwrap();

        assert_eq!(header_value(&request, "x-api-key").as_deref(), Some("k"));
        assert_eq!(
            header_value(&request, "anthropic-version").as_deref(),
            Some(ANTHROPIC_VERSION)
        );
        assert!(header_value(&request, "Authorization").is_none());
    }

    #[test]
    fn gemini_uses_goog_header() {
        let client = reqwest::Client::new();
        let request = add_auth_headers(
            client.get("https://example.com"),
            ProviderKind::Gemini,
            "k",
        )
        .build()
        .unwrap();

        assert_eq!(
            header_value(&request, "x-goog-api-key").as_deref(),
            Some("k")
        );
    }

    #[test]
    fn openai_uses_bearer_token() {
        let client = reqwest::Client::new();
        let request = add_auth_headers(
            client.get("https://example.com"),
            ProviderKind::OpenAi,
            "secret",
        )
        .build()
        .unwrap();

        assert_eq!(
            header_value(&request, "Authorization").as_deref(),
            Some("Bearer secret")
        );
    }
}
