use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default invalidation pattern: every path on the distribution
pub const INVALIDATE_ALL: &str = "/*";

/// Complete project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildConfig>,
    pub artifacts: ArtifactsConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<BucketConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cdn: Option<CdnConfig>,
    pub cache: CacheConfig,
    pub deploy: DeploySettings,
}

/// External build command producing the artifact directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    pub command: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// Where the build output lives and what to leave out of it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    pub dir: PathBuf,
    pub exclude: Vec<String>,
}

/// Target bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Key prefix inside the bucket, normalised without leading or trailing `/`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Custom endpoint for S3-compatible stores (LocalStack, MinIO)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
}

/// CloudFront distribution fronting the bucket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    pub distribution_id: String,
    pub paths: Vec<String>,
    pub wait: bool,
    pub wait_timeout: Duration,
}

/// Cache-Control headers attached on upload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
}

impl CacheConfig {
    /// Pick the header for a key: `.html` files get the html policy
    pub fn for_key(&self, key: &str) -> Option<String> {
        let is_html = key.ends_with(".html") || key.ends_with(".htm");
        if is_html && self.html.is_some() {
            self.html.clone()
        } else {
            self.default.clone()
        }
    }
}

/// Upper bound for `deploy.max_attempts`
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Network behaviour of a deploy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploySettings {
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
        }
    }
}

/// Join a bucket prefix and a relative artifact path into an object key
pub fn object_key(prefix: Option<&str>, relative: &str) -> String {
    match prefix {
        Some(p) if !p.is_empty() => format!("{}/{}", p, relative),
        _ => relative.to_string(),
    }
}
