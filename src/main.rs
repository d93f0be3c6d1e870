use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use vupi::archive::InstallerExtractor;
use vupi::fetch::HttpFetcher;
use vupi::flagstore::FileFlagStore;
use vupi::installer::Dispatcher;
use vupi::locator::{ProbeClient, ProxyConfig, locate};
use vupi::model::Package;
use vupi::pipeline::Pipeline;
use vupi::process::{TokioProcessRunner, WinuptpBiosUpdater};
use vupi::resolver::resolve_command;
use vupi::runtime::{RealRuntime, Runtime};

/// vupi - Vendor Update Package Installer
///
/// Resolve, validate, and install vendor-supplied update packages
/// (drivers, firmware, BIOS) described by a JSON manifest.
///
/// Examples:
///   vupi apply --manifest updates.json
///   vupi resolve "START /WAIT flash.cmd" --work-dir /tmp/pkg
///   vupi locate "sub\\file.exe" --base https://vendor.example.com/repo/
#[derive(Parser, Debug)]
#[command(author, version = env!("VUPI_VERSION"), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Outbound proxy URL for liveness probes
    #[arg(long = "proxy", env = "VUPI_PROXY", value_name = "URL", global = true)]
    proxy: Option<String>,

    /// Proxy username
    #[arg(
        long = "proxy-user",
        env = "VUPI_PROXY_USER",
        value_name = "USER",
        global = true
    )]
    proxy_user: Option<String>,

    /// Proxy password
    #[arg(
        long = "proxy-pass",
        env = "VUPI_PROXY_PASS",
        value_name = "PASS",
        global = true
    )]
    proxy_pass: Option<String>,

    /// Authenticate to the proxy with the system's default credentials
    /// (takes precedence over an explicit username/password)
    #[arg(long = "proxy-default-credentials", global = true)]
    proxy_default_credentials: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Install every package in a manifest
    Apply(ApplyArgs),

    /// Resolve a free-form install command to an executable and arguments
    Resolve(ResolveArgs),

    /// Classify and resolve a path or URL
    Locate(LocateArgs),
}

#[derive(clap::Args, Debug)]
struct ApplyArgs {
    /// JSON manifest of packages to install
    #[arg(long = "manifest", short = 'm', value_name = "FILE")]
    pub manifest: PathBuf,

    /// Working directory for fetched and extracted installers
    #[arg(long = "work-dir", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Probe HTTP(S) installer locations before fetching
    #[arg(long)]
    pub probe: bool,
}

#[derive(clap::Args, Debug)]
struct ResolveArgs {
    /// The vendor-authored command string
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Directory the command resolves against (defaults to the current
    /// directory)
    #[arg(long = "work-dir", value_name = "DIR")]
    pub work_dir: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct LocateArgs {
    /// Path or URL to classify
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Base location relative paths resolve against
    #[arg(long = "base", value_name = "URL|DIR")]
    pub base: Option<String>,

    /// Probe HTTP(S) locations for liveness
    #[arg(long)]
    pub probe: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let proxy = proxy_config(&cli);

    match cli.command {
        Commands::Apply(args) => apply(args, proxy.as_ref()).await,
        Commands::Resolve(args) => resolve(args),
        Commands::Locate(args) => run_locate(args, proxy.as_ref()).await,
    }
}

fn proxy_config(cli: &Cli) -> Option<ProxyConfig> {
    cli.proxy.as_ref().map(|url| ProxyConfig {
        url: url.clone(),
        username: cli.proxy_user.clone(),
        password: cli.proxy_pass.clone(),
        use_default_credentials: cli.proxy_default_credentials,
    })
}

async fn apply(args: ApplyArgs, proxy: Option<&ProxyConfig>) -> Result<()> {
    let runtime = Arc::new(RealRuntime);
    if !runtime.is_privileged() {
        warn!("not running elevated; most installers will fail");
    }

    let manifest = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("Failed to read manifest {:?}", args.manifest))?;
    let packages: Vec<Package> =
        serde_json::from_str(&manifest).context("Failed to parse package manifest")?;

    let work_root = args
        .work_dir
        .unwrap_or_else(|| std::env::temp_dir().join("vupi"));
    runtime
        .create_dir_all(&work_root)
        .with_context(|| format!("Failed to create work directory {:?}", work_root))?;

    let runner = Arc::new(TokioProcessRunner);
    let bios = Arc::new(WinuptpBiosUpdater::new(runtime.clone(), runner.clone()));
    let flags = Arc::new(FileFlagStore::at_default_location(runtime.clone())?);
    let dispatcher = Dispatcher::new(runtime.clone(), runner, bios, flags);
    let fetcher = Arc::new(HttpFetcher::new(runtime.clone()));
    let extractor = Arc::new(InstallerExtractor::new(runtime.clone()));
    let probe = if args.probe {
        Some(ProbeClient::new(proxy)?)
    } else {
        None
    };

    let pipeline = Pipeline::new(runtime, dispatcher, fetcher, extractor, probe);
    let results = pipeline.process_packages(&packages, &work_root).await;

    for result in &results {
        println!("{}", serde_json::to_string(result)?);
    }
    let succeeded = results.iter().filter(|r| r.success).count();
    info!(
        "{} of {} installed package(s) succeeded",
        succeeded,
        results.len()
    );
    Ok(())
}

fn resolve(args: ResolveArgs) -> Result<()> {
    let runtime = RealRuntime;
    let work_dir = match args.work_dir {
        Some(dir) => dir,
        None => runtime.current_dir()?,
    };

    match resolve_command(&runtime, &args.command, &work_dir) {
        Some(resolution) => {
            println!("{}", resolution.executable.display());
            println!("{}", resolution.arguments);
            Ok(())
        }
        None => anyhow::bail!("no executable could be resolved from {:?}", args.command),
    }
}

async fn run_locate(args: LocateArgs, proxy: Option<&ProxyConfig>) -> Result<()> {
    let runtime = RealRuntime;
    let probe = if args.probe {
        Some(ProbeClient::new(proxy)?)
    } else {
        None
    };

    let locator = locate(&runtime, &args.path, args.base.as_deref(), probe.as_ref()).await;
    println!("{}", serde_json::to_string_pretty(&locator)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_apply_parsing() {
        let cli = Cli::try_parse_from(["vupi", "apply", "--manifest", "updates.json"]).unwrap();
        match cli.command {
            Commands::Apply(args) => {
                assert_eq!(args.manifest, PathBuf::from("updates.json"));
                assert!(!args.probe);
            }
            _ => panic!("Expected Apply command"),
        }
    }

    #[test]
    fn test_cli_resolve_parsing() {
        let cli =
            Cli::try_parse_from(["vupi", "resolve", "setup.exe /quiet", "--work-dir", "/tmp"])
                .unwrap();
        match cli.command {
            Commands::Resolve(args) => {
                assert_eq!(args.command, "setup.exe /quiet");
                assert_eq!(args.work_dir, Some(PathBuf::from("/tmp")));
            }
            _ => panic!("Expected Resolve command"),
        }
    }

    #[test]
    fn test_cli_locate_with_base() {
        let cli = Cli::try_parse_from([
            "vupi",
            "locate",
            "sub\\file.exe",
            "--base",
            "https://example.com/repo/",
            "--probe",
        ])
        .unwrap();
        match cli.command {
            Commands::Locate(args) => {
                assert_eq!(args.path, "sub\\file.exe");
                assert_eq!(args.base, Some("https://example.com/repo/".to_string()));
                assert!(args.probe);
            }
            _ => panic!("Expected Locate command"),
        }
    }

    #[test]
    fn test_cli_global_proxy_flags() {
        let cli = Cli::try_parse_from([
            "vupi",
            "--proxy",
            "http://proxy:8080",
            "--proxy-default-credentials",
            "locate",
            "x",
        ])
        .unwrap();
        let proxy = proxy_config(&cli).unwrap();
        assert_eq!(proxy.url, "http://proxy:8080");
        assert!(proxy.use_default_credentials);
    }

    #[test]
    fn test_cli_no_subcommand_fails() {
        assert!(Cli::try_parse_from(["vupi"]).is_err());
    }
}
