//! URL and header helpers shared by the Azure OpenAI and OpenAI adapters.

use reqwest::RequestBuilder;

/// How a request authenticates against an OpenAI-style endpoint.
#[derive(Clone)]
pub(crate) enum ApiAuth {
    /// Azure resources take the key in an `api-key` header.
    ApiKey(String),
    /// OpenAI takes a bearer token.
    Bearer(String),
}

impl ApiAuth {
    pub(crate) fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Self::ApiKey(key) => request.header("api-key", key),
            Self::Bearer(token) => request.bearer_auth(token),
        }
    }
}

impl std::fmt::Debug for ApiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// `{endpoint}/openai/deployments/{deployment}/{operation}?api-version={version}`
pub(crate) fn azure_deployment_url(
    endpoint: &str,
    deployment: &str,
    operation: &str,
    api_version: &str,
) -> String {
    format!(
        "{}/openai/deployments/{}/{}?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        operation.trim_start_matches('/'),
        api_version
    )
}

/// `{base}/{path}` with exactly one slash between the parts.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
