mod commands;
mod logging;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use commands::TargetArgs;
use shipfront_deployer::DeployError;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "shipfront")]
#[command(version, about = "Deploy a static frontend to S3 and invalidate CloudFront", long_about = None)]
struct Cli {
    /// More log output (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: logging::LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Parser)]
enum Command {
    /// Write a starter shipfront.toml
    Init {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Build output directory
        #[arg(long, default_value = "dist")]
        dir: String,

        /// Build command, e.g. "npm run build"
        #[arg(long)]
        build_command: Option<String>,

        /// Target bucket
        #[arg(long)]
        bucket: Option<String>,

        /// CloudFront distribution id
        #[arg(long)]
        distribution: Option<String>,
    },

    /// Check shipfront.toml and the artifact directory
    Validate {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Run the configured build command only
    Build {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Show what a deploy would upload and delete
    Plan {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build, sync to the bucket and invalidate the distribution
    Deploy {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Use the existing artifact directory
        #[arg(long)]
        skip_build: bool,

        /// Compute the plan without transferring anything
        #[arg(long)]
        dry_run: bool,

        /// Wait for the invalidation to complete
        #[arg(long)]
        wait: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Submit an invalidation on its own (e.g. after a failed deploy)
    Invalidate {
        /// Project directory
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        target: TargetArgs,

        /// Paths to invalidate (default from config, else "/*")
        #[arg(long = "path")]
        paths: Vec<String>,

        /// Wait for the invalidation to complete
        #[arg(long)]
        wait: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    let result = match cli.command {
        Command::Init {
            path,
            dir,
            build_command,
            bucket,
            distribution,
        } => commands::init::run(path, dir, build_command, bucket, distribution).await,
        Command::Validate { path } => commands::validate::run(path).await,
        Command::Build { path } => commands::build::run(path).await,
        Command::Plan { path, target, json } => commands::deploy::plan(path, target, json).await,
        Command::Deploy {
            path,
            target,
            skip_build,
            dry_run,
            wait,
            json,
        } => {
            let options = commands::deploy::DeployOptions {
                skip_build,
                dry_run,
                wait,
                json,
            };
            commands::deploy::deploy(path, target, options).await
        }
        Command::Invalidate {
            path,
            target,
            paths,
            wait,
        } => commands::deploy::invalidate(path, target, paths, wait).await,
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "shipfront", &mut io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = exit_code(&err);
            match err.downcast_ref::<DeployError>() {
                Some(deploy_err) => {
                    eprintln!("❌ Deploy failed at step '{}'", deploy_err.step());
                    eprintln!("   {:#}", err);
                }
                None => eprintln!("❌ {:#}", err),
            }
            ExitCode::from(code)
        }
    }
}

/// 2-6 identify the failing pipeline step, 1 is anything else
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(deploy_err) = err.downcast_ref::<DeployError>() {
        deploy_err.exit_code()
    } else if err.downcast_ref::<shipfront_core::Error>().is_some() {
        2
    } else {
        1
    }
}
