use anyhow::Result;
use shipfront_artifacts::{ArtifactOptions, ArtifactSet};
use std::path::PathBuf;

use super::project::load_config;

pub async fn run(path: PathBuf) -> Result<()> {
    println!("Validating project at: {}", path.display());

    let config = load_config(&path)?;
    println!("✓ shipfront.toml valid");

    match &config.bucket {
        Some(bucket) => println!("  Bucket: {}", bucket.name),
        None => println!("  Bucket: (from --bucket / SHIPFRONT_BUCKET)"),
    }
    match &config.cdn {
        Some(cdn) => println!("  Distribution: {}", cdn.distribution_id),
        None => println!("  Distribution: (from --distribution / SHIPFRONT_DISTRIBUTION_ID)"),
    }
    if let Some(build) = &config.build {
        println!("  Build: {}", build.command);
    }

    let options = ArtifactOptions {
        prefix: config.bucket.as_ref().and_then(|b| b.prefix.clone()),
        exclude: config.artifacts.exclude.clone(),
        cache: config.cache.clone(),
    };
    let artifact_dir = path.join(&config.artifacts.dir);
    match ArtifactSet::scan(&artifact_dir, &options) {
        Ok(set) => {
            println!(
                "✓ Artifacts: {} file(s), {} in {}",
                set.len(),
                format_bytes(set.total_bytes()),
                artifact_dir.display()
            );
        }
        Err(e) if config.build.is_some() => {
            println!("⚠ Artifacts not ready ({})", e);
            println!("  Run 'shipfront build {}' first", path.display());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
