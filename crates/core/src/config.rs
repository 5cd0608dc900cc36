use crate::error::{Error, Result};
use crate::types::*;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the project directory
pub const CONFIG_FILE_NAME: &str = "shipfront.toml";

/// Raw TOML configuration structure
/// This matches the shipfront.toml file structure exactly
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    build: Option<RawBuild>,
    artifacts: RawArtifacts,
    bucket: Option<RawBucket>,
    cdn: Option<RawCdn>,
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    deploy: RawDeploy,
}

#[derive(Debug, Deserialize)]
struct RawBuild {
    command: String,
    working_dir: Option<String>, // Convert to PathBuf
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawArtifacts {
    dir: String, // Convert to PathBuf
    #[serde(default)]
    exclude: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawBucket {
    name: String,
    region: Option<String>,
    prefix: Option<String>,
    endpoint_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCdn {
    distribution_id: String,
    paths: Option<Vec<String>>,
    #[serde(default)]
    wait: bool,
    wait_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDeploy {
    request_timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
}

/// Parse shipfront.toml from a file path
pub fn parse_project_toml<P: AsRef<Path>>(path: P) -> Result<ProjectConfig> {
    let content = fs::read_to_string(path)?;
    parse_project_toml_str(&content)
}

/// Parse shipfront.toml from a string (useful for testing)
pub fn parse_project_toml_str(content: &str) -> Result<ProjectConfig> {
    let raw: RawConfig = toml::from_str(content)?;

    let build = match raw.build {
        Some(b) => {
            if b.command.trim().is_empty() {
                return Err(Error::ConfigParse("Empty command in 'build.command'".into()));
            }
            let working_dir = match b.working_dir {
                Some(dir) => validate_path(&dir, "build.working_dir")?,
                None => PathBuf::from("."),
            };
            Some(BuildConfig {
                command: b.command,
                working_dir,
                timeout: Duration::from_secs(b.timeout_secs.unwrap_or(600)),
            })
        }
        None => None,
    };

    let artifacts = ArtifactsConfig {
        dir: validate_path(&raw.artifacts.dir, "artifacts.dir")?,
        exclude: raw.artifacts.exclude,
    };

    let bucket = match raw.bucket {
        Some(b) => {
            validate_bucket_name(&b.name)?;
            Some(BucketConfig {
                name: b.name,
                region: b.region,
                prefix: normalize_prefix(b.prefix.as_deref())?,
                endpoint_url: b.endpoint_url,
            })
        }
        None => None,
    };

    let cdn = match raw.cdn {
        Some(c) => {
            validate_distribution_id(&c.distribution_id)?;
            let paths = c.paths.unwrap_or_else(|| vec![INVALIDATE_ALL.to_string()]);
            validate_invalidation_paths(&paths)?;
            Some(CdnConfig {
                distribution_id: c.distribution_id,
                paths,
                wait: c.wait,
                wait_timeout: Duration::from_secs(c.wait_timeout_secs.unwrap_or(600)),
            })
        }
        None => None,
    };

    let defaults = DeploySettings::default();
    let max_attempts = raw.deploy.max_attempts.unwrap_or(defaults.max_attempts);
    if max_attempts == 0 || max_attempts > MAX_ATTEMPTS_LIMIT {
        return Err(Error::ConfigParse(format!(
            "deploy.max_attempts must be between 1 and {}",
            MAX_ATTEMPTS_LIMIT
        )));
    }
    let deploy = DeploySettings {
        request_timeout: raw
            .deploy
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.request_timeout),
        max_attempts,
        base_delay: raw
            .deploy
            .base_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay),
    };

    Ok(ProjectConfig {
        build,
        artifacts,
        bucket,
        cdn,
        cache: raw.cache,
        deploy,
    })
}

/// Validate and convert a path string to PathBuf.
///
/// Rejects absolute paths, parent directory references (`..`) and empty
/// strings, so a checked-in shipfront.toml can only point inside the project.
fn validate_path(path_str: &str, field_name: &str) -> Result<PathBuf> {
    let path = Path::new(path_str);

    if path.is_absolute() {
        return Err(Error::ConfigParse(format!(
            "Absolute paths not allowed in '{}': '{}'. Use relative paths only.",
            field_name, path_str
        )));
    }

    for component in path.components() {
        if component == std::path::Component::ParentDir {
            return Err(Error::ConfigParse(format!(
                "Parent directory references (..) not allowed in '{}': '{}'",
                field_name, path_str
            )));
        }
    }

    if path_str.trim().is_empty() {
        return Err(Error::ConfigParse(format!(
            "Empty path in '{}' field",
            field_name
        )));
    }

    Ok(path.to_path_buf())
}

/// Check an S3 bucket name: 3-63 chars of lowercase letters, digits, `.` and `-`,
/// starting and ending with a letter or digit.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let len_ok = (3..=63).contains(&name.len());
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    let edges_ok = name
        .chars()
        .next()
        .zip(name.chars().last())
        .is_some_and(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric());

    if !(len_ok && chars_ok && edges_ok) {
        return Err(Error::ConfigParse(format!(
            "Invalid bucket name '{}': use 3-63 lowercase letters, digits, '.' or '-'",
            name
        )));
    }
    Ok(())
}

/// Check a CloudFront distribution id (e.g. `E2EXAMPLE1234`)
pub fn validate_distribution_id(id: &str) -> Result<()> {
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(Error::ConfigParse(format!(
            "Invalid distribution id '{}': expected uppercase letters and digits",
            id
        )));
    }
    Ok(())
}

/// Every invalidation path must be absolute on the distribution
pub fn validate_invalidation_paths(paths: &[String]) -> Result<()> {
    if paths.is_empty() {
        return Err(Error::ConfigParse(
            "At least one invalidation path is required".into(),
        ));
    }
    for p in paths {
        if !p.starts_with('/') {
            return Err(Error::ConfigParse(format!(
                "Invalidation path '{}' must start with '/'",
                p
            )));
        }
    }
    Ok(())
}

/// Normalise a key prefix: strip the trailing `/`, reject a leading `/` and `..`.
/// An empty prefix means the bucket root.
pub fn normalize_prefix(prefix: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = prefix else {
        return Ok(None);
    };
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.starts_with('/') {
        return Err(Error::ConfigParse(format!(
            "Prefix '{}' must not start with '/'",
            raw
        )));
    }
    if trimmed.split('/').any(|seg| seg == ".." || seg == "." || seg.is_empty()) {
        return Err(Error::ConfigParse(format!(
            "Prefix '{}' contains an invalid segment",
            raw
        )));
    }
    Ok(Some(trimmed.to_string()))
}
