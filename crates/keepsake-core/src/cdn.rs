//! CDN URL rewriting for primary-backend objects.

/// Rewrites a primary-backend storage key into the public URL served by the CDN.
///
/// Implementations must be pure: the same key always yields the same URL, so a
/// stored `public_url` can be re-derived at any time.
pub trait CdnRewriter: Send + Sync {
    fn rewrite_primary_url(&self, storage_key: &str) -> String;
}

/// Default rewriter: `https://{domain}/{storage_key}`.
///
/// The key is used verbatim. Keys are already URL-safe and any percent escapes they
/// carry must not be encoded a second time.
#[derive(Debug, Clone)]
pub struct CdnUrlRewriter {
    domain: String,
}

impl CdnUrlRewriter {
    pub fn new(domain: impl Into<String>) -> Self {
        let domain = domain.into();
        let domain = domain
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/')
            .to_string();
        Self { domain }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl CdnRewriter for CdnUrlRewriter {
    fn rewrite_primary_url(&self, storage_key: &str) -> String {
        format!(
            "https://{}/{}",
            self.domain,
            storage_key.trim_start_matches('/')
        )
    }
}
