use anyhow::Result;
use shipfront_deployer::{BuildStep, DeployError, ShellBuild};
use std::path::PathBuf;

use super::project::load_config;

/// Run the configured build command
pub async fn run(path: PathBuf) -> Result<()> {
    let config = load_config(&path)?;

    let Some(build_config) = config.build else {
        println!("ℹ️  No [build] section in shipfront.toml - nothing to run");
        return Ok(());
    };

    let build = ShellBuild::from_config(&build_config, &path);
    println!("🔨 Building...");
    println!("   Command: {}", build.describe());
    println!();

    build
        .run()
        .await
        .map_err(|e| DeployError::Build(e.message))?;

    let output = path.join(&config.artifacts.dir);
    println!();
    println!("✅ Build complete!");
    println!("   Output: {}", output.display());
    if !output.exists() {
        eprintln!("   ⚠ Warning: {} was not created by the build", output.display());
    }

    Ok(())
}
