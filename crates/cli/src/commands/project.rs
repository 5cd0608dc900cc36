use anyhow::{Context, Result};
use clap::Args;
use shipfront_core::config::{
    normalize_prefix, parse_project_toml, validate_bucket_name, validate_distribution_id,
};
use shipfront_core::{
    BuildConfig, CONFIG_FILE_NAME, CacheConfig, DeploySettings, Error, INVALIDATE_ALL,
    ProjectConfig,
};
use shipfront_deployer::aws::AwsOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Flags that override shipfront.toml
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Artifact directory (overrides artifacts.dir)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Target bucket
    #[arg(long, env = "SHIPFRONT_BUCKET")]
    pub bucket: Option<String>,

    /// CloudFront distribution id
    #[arg(long, env = "SHIPFRONT_DISTRIBUTION_ID")]
    pub distribution: Option<String>,

    /// Key prefix inside the bucket
    #[arg(long)]
    pub prefix: Option<String>,

    /// AWS region (defaults to the AWS config chain)
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// AWS named profile
    #[arg(long)]
    pub profile: Option<String>,

    /// Custom S3 endpoint (LocalStack, MinIO)
    #[arg(long)]
    pub endpoint_url: Option<String>,
}

/// Load shipfront.toml from a project directory, failing if it is absent
pub fn load_config(path: &Path) -> Result<ProjectConfig> {
    if !path.exists() {
        anyhow::bail!("Project directory does not exist: {}", path.display());
    }
    let config_path = path.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        anyhow::bail!(
            "{} not found in {}\nRun 'shipfront init {}' first",
            CONFIG_FILE_NAME,
            path.display(),
            path.display()
        );
    }
    let config = parse_project_toml(&config_path)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;
    Ok(config)
}

/// Everything a deploy, plan or invalidation needs, after merging
/// shipfront.toml with flags and environment
#[derive(Debug, Clone)]
pub struct Target {
    pub artifact_dir: PathBuf,
    pub bucket: Option<String>,
    pub distribution_id: Option<String>,
    pub prefix: Option<String>,
    pub exclude: Vec<String>,
    pub cache: CacheConfig,
    pub invalidation_paths: Vec<String>,
    pub wait: bool,
    pub wait_timeout: Duration,
    pub settings: DeploySettings,
    pub build: Option<BuildConfig>,
    pub aws: AwsOptions,
}

impl Target {
    /// Merge config (optional when `--dir` is given) with flags
    pub fn resolve(path: &Path, args: &TargetArgs) -> Result<Self> {
        let config = if path.join(CONFIG_FILE_NAME).exists() {
            Some(load_config(path)?)
        } else {
            None
        };

        let artifact_dir = match (&args.dir, &config) {
            (Some(dir), _) => dir.clone(),
            (None, Some(c)) => path.join(&c.artifacts.dir),
            (None, None) => {
                return Err(Error::ConfigParse(format!(
                    "No {} in {} and no --dir given",
                    CONFIG_FILE_NAME,
                    path.display()
                ))
                .into());
            }
        };

        let bucket_cfg = config.as_ref().and_then(|c| c.bucket.clone());
        let cdn_cfg = config.as_ref().and_then(|c| c.cdn.clone());

        let bucket = args
            .bucket
            .clone()
            .or_else(|| bucket_cfg.as_ref().map(|b| b.name.clone()));
        if let Some(name) = &bucket {
            validate_bucket_name(name)?;
        }

        let distribution_id = args
            .distribution
            .clone()
            .or_else(|| cdn_cfg.as_ref().map(|c| c.distribution_id.clone()));
        if let Some(id) = &distribution_id {
            validate_distribution_id(id)?;
        }

        let prefix = match &args.prefix {
            Some(p) => normalize_prefix(Some(p))?,
            None => bucket_cfg.as_ref().and_then(|b| b.prefix.clone()),
        };

        let aws = AwsOptions {
            region: args
                .region
                .clone()
                .or_else(|| bucket_cfg.as_ref().and_then(|b| b.region.clone())),
            profile: args.profile.clone(),
            endpoint_url: args
                .endpoint_url
                .clone()
                .or_else(|| bucket_cfg.as_ref().and_then(|b| b.endpoint_url.clone())),
        };

        Ok(Self {
            artifact_dir,
            bucket,
            distribution_id,
            prefix,
            exclude: config
                .as_ref()
                .map(|c| c.artifacts.exclude.clone())
                .unwrap_or_default(),
            cache: config.as_ref().map(|c| c.cache.clone()).unwrap_or_default(),
            invalidation_paths: cdn_cfg
                .as_ref()
                .map(|c| c.paths.clone())
                .unwrap_or_else(|| vec![INVALIDATE_ALL.to_string()]),
            wait: cdn_cfg.as_ref().is_some_and(|c| c.wait),
            wait_timeout: cdn_cfg
                .as_ref()
                .map(|c| c.wait_timeout)
                .unwrap_or(Duration::from_secs(600)),
            settings: config
                .as_ref()
                .map(|c| c.deploy.clone())
                .unwrap_or_default(),
            build: config.and_then(|c| c.build),
            aws,
        })
    }

    /// Resolve for commands that only talk to the CDN; the artifact
    /// directory is never read, so `--dir` defaults to the project dir
    pub fn resolve_for_cdn(path: &Path, args: &TargetArgs) -> Result<Self> {
        let mut args = args.clone();
        if args.dir.is_none() && !path.join(CONFIG_FILE_NAME).exists() {
            args.dir = Some(path.to_path_buf());
        }
        Self::resolve(path, &args)
    }

    pub fn require_bucket(&self) -> Result<&str> {
        self.bucket.as_deref().ok_or_else(|| {
            Error::ConfigParse(
                "No bucket configured: set [bucket].name, pass --bucket or SHIPFRONT_BUCKET".into(),
            )
            .into()
        })
    }

    pub fn require_distribution(&self) -> Result<&str> {
        self.distribution_id.as_deref().ok_or_else(|| {
            Error::ConfigParse(
                "No distribution configured: set [cdn].distribution_id, pass --distribution or SHIPFRONT_DISTRIBUTION_ID"
                    .into(),
            )
            .into()
        })
    }
}
