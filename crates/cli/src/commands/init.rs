use anyhow::{Context, Result};
use shipfront_core::CONFIG_FILE_NAME;
use shipfront_core::config::{validate_bucket_name, validate_distribution_id};
use std::fs;
use std::path::{Path, PathBuf};

/// Lock files that identify the project's package manager, in lookup order
const PACKAGE_MANAGERS: &[(&str, &str)] = &[
    ("pnpm-lock.yaml", "pnpm run build"),
    ("yarn.lock", "yarn build"),
    ("bun.lockb", "bun run build"),
    ("package-lock.json", "npm run build"),
    ("package.json", "npm run build"),
];

/// Escape a string for a TOML basic string.
///
/// The config is written as a commented template, which the toml
/// serializer cannot produce.
fn toml_escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\x08', "\\b")
        .replace('\x0C', "\\f")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Guess the build command from the lock file present
fn detect_build_command(dir: &Path) -> Option<&'static str> {
    PACKAGE_MANAGERS
        .iter()
        .find(|(file, _)| dir.join(file).exists())
        .map(|(_, command)| *command)
}

/// Write a starter shipfront.toml into `path`
pub async fn run(
    path: PathBuf,
    dir: String,
    build_command: Option<String>,
    bucket: Option<String>,
    distribution: Option<String>,
) -> Result<()> {
    println!("Initializing shipfront project: {}", path.display());

    if !path.exists() {
        anyhow::bail!(
            "Directory '{}' does not exist. Create it first: mkdir {}",
            path.display(),
            path.display()
        );
    }

    let config_path = path.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!(
            "{} already exists at {}\nHint: Delete it first or edit it directly",
            CONFIG_FILE_NAME,
            config_path.display()
        );
    }

    if let Some(name) = &bucket {
        validate_bucket_name(name)?;
    }
    if let Some(id) = &distribution {
        validate_distribution_id(id)?;
    }

    let build_command = match build_command {
        Some(command) => Some(command),
        None => detect_build_command(&path).map(|command| {
            println!("✓ Detected build command: {}", command);
            command.to_string()
        }),
    };

    let contents = generate_config(
        &dir,
        build_command.as_deref(),
        bucket.as_deref(),
        distribution.as_deref(),
    );
    fs::write(&config_path, contents)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    println!("✓ Wrote {}", config_path.display());
    println!("\nNext steps:");
    let mut step = 1;
    if bucket.is_none() {
        println!("  {}. Set [bucket].name (or export SHIPFRONT_BUCKET)", step);
        step += 1;
    }
    if distribution.is_none() {
        println!(
            "  {}. Set [cdn].distribution_id (or export SHIPFRONT_DISTRIBUTION_ID)",
            step
        );
        step += 1;
    }
    println!("  {}. Check it: shipfront validate {}", step, path.display());
    println!("  {}. Deploy: shipfront deploy {}", step + 1, path.display());

    Ok(())
}

fn generate_config(
    dir: &str,
    build_command: Option<&str>,
    bucket: Option<&str>,
    distribution: Option<&str>,
) -> String {
    let mut out = String::new();

    match build_command {
        Some(command) => {
            out.push_str("[build]\n");
            out.push_str(&format!("command = \"{}\"\n", toml_escape_string(command)));
            out.push_str("# working_dir = \".\"\n");
            out.push_str("# timeout_secs = 600\n\n");
        }
        None => {
            out.push_str("# [build]\n");
            out.push_str("# command = \"npm run build\"\n\n");
        }
    }

    out.push_str("[artifacts]\n");
    out.push_str(&format!("dir = \"{}\"\n", toml_escape_string(dir)));
    out.push_str("# exclude = [\"*.map\", \".DS_Store\"]\n\n");

    match bucket {
        Some(name) => {
            out.push_str("[bucket]\n");
            out.push_str(&format!("name = \"{}\"\n", toml_escape_string(name)));
        }
        None => {
            out.push_str("# [bucket]\n");
            out.push_str("# name = \"my-site-bucket\"\n");
        }
    }
    out.push_str("# region = \"us-east-1\"\n");
    out.push_str("# prefix = \"\"\n\n");

    match distribution {
        Some(id) => {
            out.push_str("[cdn]\n");
            out.push_str(&format!("distribution_id = \"{}\"\n", toml_escape_string(id)));
        }
        None => {
            out.push_str("# [cdn]\n");
            out.push_str("# distribution_id = \"E2EXAMPLE1234\"\n");
        }
    }
    out.push_str("# paths = [\"/*\"]\n");
    out.push_str("# wait = false\n\n");

    out.push_str("[cache]\n");
    out.push_str("default = \"public, max-age=31536000, immutable\"\n");
    out.push_str("html = \"public, max-age=0, must-revalidate\"\n\n");

    out.push_str("# [deploy]\n");
    out.push_str("# request_timeout_secs = 60\n");
    out.push_str("# max_attempts = 4\n");
    out.push_str("# base_delay_ms = 500\n");

    out
}
