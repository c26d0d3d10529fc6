//! Download of remote photos for backends that need the image bytes.
//!
//! Photo URLs come from callers, so downloads are capped at the upload limit
//! and never follow redirects. Loopback and private-network hosts are refused
//! unless explicitly allowed. The bytes must sniff as an image.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::{redirect, Client, Url};
use tracing::{debug, warn};

use poet_core::photo::sniff_image_type;
use poet_core::{defaults, Error, Result};

/// Bounded fetcher for remote photo URLs.
#[derive(Clone)]
pub struct ImageFetcher {
    client: Client,
    max_bytes: usize,
    allow_private_hosts: bool,
    timeout: Duration,
}

impl ImageFetcher {
    pub fn new(max_bytes: usize, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .redirect(redirect::Policy::none())
                .build()
                .unwrap_or_else(|_| Client::new()),
            max_bytes,
            allow_private_hosts: false,
            timeout,
        }
    }

    /// Read the size cap and host policy from the environment.
    pub fn from_env(timeout: Duration) -> Self {
        let max_bytes = std::env::var(defaults::ENV_MAX_UPLOAD_BYTES)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(defaults::MAX_UPLOAD_BYTES);
        let allow_private = std::env::var(defaults::ENV_ALLOW_PRIVATE_IMAGE_HOSTS)
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Self::new(max_bytes, timeout).with_private_hosts(allow_private)
    }

    /// Permit loopback and private-network hosts (local deployments, tests).
    pub fn with_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Download `url`, returning the bytes once they sniff as an image.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = Url::parse(url)
            .map_err(|e| Error::InvalidInput(format!("Invalid photo URL: {}", e)))?;
        if !self.allow_private_hosts {
            ensure_public_host(&parsed).await?;
        }

        debug!(url = %parsed, max_bytes = self.max_bytes, "Fetching remote image");
        let mut response = self
            .client
            .get(parsed)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Inference(format!("Failed to fetch image: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Inference(format!(
                "Image fetch returned {}: {}",
                response.status(),
                url
            )));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large(url));
            }
        }

        let mut data = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Error::Inference(format!("Failed to read image: {}", e)))?
        {
            if data.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large(url));
            }
            data.extend_from_slice(&chunk);
        }

        let mime_type = sniff_image_type(&data)?;
        debug!(bytes = data.len(), mime_type = %mime_type, "Remote image downloaded");
        Ok(data)
    }

    fn too_large(&self, url: &str) -> Error {
        warn!(url, max_bytes = self.max_bytes, "Remote image exceeds size limit");
        Error::InvalidInput(format!(
            "Photo at {} exceeds the {} byte limit",
            url, self.max_bytes
        ))
    }
}

/// Reject URLs whose host is, or resolves to, a non-public address.
async fn ensure_public_host(url: &Url) -> Result<()> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidInput("Photo URL has no host".to_string()))?;
    let port = url.port_or_known_default().unwrap_or(80);

    // IPv6 literals keep their brackets in `host_str`.
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<IpAddr> = match literal.parse::<IpAddr>() {
        Ok(ip) => vec![ip],
        Err(_) => tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| {
                Error::Inference(format!("Failed to resolve image host '{}': {}", host, e))
            })?
            .map(|addr| addr.ip())
            .collect(),
    };

    if addrs.is_empty() || addrs.iter().any(|ip| !is_public(*ip)) {
        warn!(url = %url, "Refusing to fetch photo from non-public host");
        return Err(Error::InvalidInput(format!(
            "Photo host '{}' is not publicly routable",
            host
        )));
    }
    Ok(())
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            let shared = a == 100 && (b & 0xc0) == 64;
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation()
                || shared)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_public(IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    fn local_fetcher(max_bytes: usize) -> ImageFetcher {
        ImageFetcher::new(max_bytes, Duration::from_secs(5)).with_private_hosts(true)
    }

    #[test]
    fn test_is_public_classification() {
        for blocked in [
            "127.0.0.1",
            "10.1.2.3",
            "172.16.0.9",
            "192.168.1.20",
            "169.254.169.254",
            "100.64.0.1",
            "0.0.0.0",
            "::1",
            "::",
            "fd00::1",
            "fe80::1",
            "::ffff:127.0.0.1",
        ] {
            assert!(!is_public(blocked.parse().unwrap()), "{} should be blocked", blocked);
        }
        for allowed in ["93.184.216.34", "8.8.8.8", "2606:4700:4700::1111"] {
            assert!(is_public(allowed.parse().unwrap()), "{} should be allowed", allowed);
        }
    }

    #[tokio::test]
    async fn test_loopback_host_refused_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/internal/admin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_HEADER.to_vec()))
            .expect(0)
            .mount(&server)
            .await;

        let fetcher = ImageFetcher::new(1024, Duration::from_secs(5));
        let err = fetcher
            .fetch(&format!("{}/internal/admin", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("not publicly routable"));
    }

    #[tokio::test]
    async fn test_localhost_name_refused() {
        let fetcher = ImageFetcher::new(1024, Duration::from_secs(5));
        let err = fetcher.fetch("http://localhost:9/cat.png").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let server = MockServer::start().await;
        let mut body = PNG_HEADER.to_vec();
        body.resize(4096, b'A');
        Mock::given(method("GET"))
            .and(path("/huge.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(&server)
            .await;

        let err = local_fetcher(1024)
            .fetch(&format!("{}/huge.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(err.to_string().contains("1024 byte limit"));
    }

    #[tokio::test]
    async fn test_non_image_body_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"<html>secret</html>".to_vec(), "image/png"),
            )
            .mount(&server)
            .await;

        let err = local_fetcher(1024)
            .fetch(&format!("{}/page", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_redirect_not_followed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/moved.png"))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", "http://169.254.169.254/"),
            )
            .mount(&server)
            .await;

        let err = local_fetcher(1024)
            .fetch(&format!("{}/moved.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert!(err.to_string().contains("302"));
    }

    #[tokio::test]
    async fn test_image_within_limit_is_inlined() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cat.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_HEADER.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let data = local_fetcher(1024)
            .fetch(&format!("{}/cat.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(data, PNG_HEADER);
    }
}
