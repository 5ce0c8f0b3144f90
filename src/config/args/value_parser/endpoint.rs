use url::Url;

const INVALID_SCHEME: &str = "URL scheme must be https:// or http://";
const MISSING_HOST: &str = "server endpoint must name a host";

/// Accepts `host[:port]` (the scheme then comes from `--enable-https`) or a
/// full `http(s)://` URL.
pub fn check_endpoint(endpoint: &str) -> Result<String, String> {
    let candidate = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };

    let parsed = Url::parse(&candidate).map_err(|e| e.to_string())?;

    if parsed.scheme() != "https" && parsed.scheme() != "http" {
        return Err(INVALID_SCHEME.to_string());
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(MISSING_HOST.to_string());
    }

    Ok(endpoint.to_string())
}

/// Turn a checked endpoint into the URL handed to the SDK.
pub fn endpoint_url(endpoint: &str, enable_https: bool) -> String {
    if endpoint.contains("://") {
        return endpoint.to_string();
    }

    let scheme = if enable_https { "https" } else { "http" };
    format!("{scheme}://{endpoint}")
}
