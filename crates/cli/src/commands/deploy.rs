use anyhow::Result;
use shipfront_artifacts::{ArtifactOptions, ArtifactSet};
use shipfront_deployer::aws::{CloudFrontInvalidator, S3Store, load_sdk_config};
use shipfront_deployer::{
    DeployError, DeployRequest, DeploySummary, Deployer, Pipeline, RetryPolicy, ShellBuild,
    SyncPlan,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use super::project::{Target, TargetArgs};
use super::validate::format_bytes;

#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    pub skip_build: bool,
    pub dry_run: bool,
    pub wait: bool,
    pub json: bool,
}

async fn aws_pipeline(target: &Target) -> Pipeline {
    let sdk_config = load_sdk_config(&target.aws).await;
    let store = S3Store::new(&sdk_config, target.aws.endpoint_url.as_deref());
    let cdn = CloudFrontInvalidator::new(&sdk_config);
    Pipeline::new(Arc::new(store), Arc::new(cdn)).with_retry(RetryPolicy::from(&target.settings))
}

fn deploy_request(
    target: &Target,
    bucket: &str,
    distribution: &str,
    options: DeployOptions,
) -> DeployRequest {
    let mut request = DeployRequest::new(&target.artifact_dir, bucket, distribution);
    request.prefix = target.prefix.clone();
    request.exclude = target.exclude.clone();
    request.cache = target.cache.clone();
    request.invalidation_paths = target.invalidation_paths.clone();
    request.skip_build = options.skip_build;
    request.dry_run = options.dry_run;
    request.wait_for_invalidation = (options.wait || target.wait).then_some(target.wait_timeout);
    request
}

async fn run_deploy<D: Deployer>(
    deployer: &D,
    request: &DeployRequest,
) -> Result<DeploySummary, DeployError> {
    deployer.deploy(request).await
}

/// Build, sync and invalidate
pub async fn deploy(path: PathBuf, args: TargetArgs, options: DeployOptions) -> Result<()> {
    let target = Target::resolve(&path, &args)?;
    let bucket = target.require_bucket()?;
    let distribution = target.require_distribution()?;

    if !options.json {
        println!("🚀 Deploying to s3://{}...\n", bucket);
        println!("📋 Deployment Plan:");
        println!("   Artifacts: {}", target.artifact_dir.display());
        println!("   Bucket: {}", bucket);
        if let Some(prefix) = &target.prefix {
            println!("   Prefix: {}/", prefix);
        }
        println!("   Distribution: {}", distribution);
        println!("   Invalidate: {}", target.invalidation_paths.join(", "));
        match &target.build {
            Some(build) if !options.skip_build => println!("   Build: {}", build.command),
            _ => println!("   Build: skipped"),
        }
        if options.dry_run {
            println!("   Mode: dry run");
        }
        println!();
    }

    let mut pipeline = aws_pipeline(&target).await;
    if let Some(build) = &target.build {
        pipeline = pipeline.with_build(Arc::new(ShellBuild::from_config(build, &path)));
    }

    let request = deploy_request(&target, bucket, distribution, options);
    debug!(?request, "resolved deploy request");
    let summary = run_deploy(&pipeline, &request).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    if summary.dry_run {
        print_plan(&summary.plan);
        println!();
        println!("ℹ️  Dry run - nothing was transferred");
        return Ok(());
    }

    println!("✅ Deployment complete!");
    println!(
        "   Uploaded: {} ({})",
        summary.uploaded,
        format_bytes(summary.bytes_uploaded)
    );
    println!("   Deleted: {}", summary.deleted);
    println!("   Unchanged: {}", summary.unchanged);
    if let Some(id) = &summary.invalidation_id {
        println!(
            "   Invalidation: {} ({})",
            id,
            summary.invalidation_status.as_deref().unwrap_or("submitted")
        );
    }
    println!("   Took: {:.1}s", summary.elapsed_ms as f64 / 1000.0);

    Ok(())
}

/// Show the sync plan against the live bucket
pub async fn plan(path: PathBuf, args: TargetArgs, json: bool) -> Result<()> {
    let target = Target::resolve(&path, &args)?;
    let bucket = target.require_bucket()?;
    let artifacts = scan(&target)?;

    let pipeline = aws_pipeline(&target).await;
    let plan = pipeline
        .plan(bucket, target.prefix.as_deref(), &artifacts)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("📋 Sync plan for s3://{}", bucket);
    println!(
        "   Local: {} file(s), {}",
        artifacts.len(),
        format_bytes(artifacts.total_bytes())
    );
    println!();
    print_plan(&plan);
    Ok(())
}

/// Submit an invalidation without syncing
pub async fn invalidate(
    path: PathBuf,
    args: TargetArgs,
    paths: Vec<String>,
    wait: bool,
) -> Result<()> {
    let target = Target::resolve_for_cdn(&path, &args)?;
    let distribution = target.require_distribution()?;
    let paths = if paths.is_empty() {
        target.invalidation_paths.clone()
    } else {
        paths
    };

    println!("🌐 Invalidating {} on {}...", paths.join(", "), distribution);
    let pipeline = aws_pipeline(&target).await;
    let receipt = pipeline
        .invalidate(
            distribution,
            &paths,
            (wait || target.wait).then_some(target.wait_timeout),
        )
        .await?;

    println!("   ✓ Invalidation {} ({})", receipt.id, receipt.status);
    Ok(())
}

fn scan(target: &Target) -> Result<ArtifactSet> {
    let options = ArtifactOptions {
        prefix: target.prefix.clone(),
        exclude: target.exclude.clone(),
        cache: target.cache.clone(),
    };
    let artifacts = ArtifactSet::scan(&target.artifact_dir, &options).map_err(DeployError::from)?;
    Ok(artifacts)
}

fn print_plan(plan: &SyncPlan) {
    if plan.is_noop() {
        println!("✓ Bucket is up to date ({} unchanged)", plan.unchanged);
        return;
    }
    for upload in &plan.uploads {
        println!(
            "   + {} ({:?}, {})",
            upload.key,
            upload.reason,
            format_bytes(upload.size)
        );
    }
    for key in &plan.deletions {
        println!("   - {}", key);
    }
    println!();
    println!(
        "   {} to upload ({}), {} to delete, {} unchanged",
        plan.uploads.len(),
        format_bytes(plan.upload_bytes()),
        plan.deletions.len(),
        plan.unchanged
    );
}
