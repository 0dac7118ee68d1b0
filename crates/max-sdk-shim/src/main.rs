use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use max_sdk_shim::{
    scan_for, BindgenPlan, Composer, Platform, ScopeRegistry, SdkLayout, ShimConfig, SubsystemSet,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Composes bindgen wrapper headers for the Max SDK")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the composition unit for the selected platform and subsystems.
    Compose(ComposeArgs),
    /// Check a wrapper header for leaked or unpaired scope symbols.
    Lint(LintArgs),
    /// List the header sets found in an SDK checkout as JSON.
    Discover(DiscoverArgs),
    /// Print the clang arguments, allowlists and link directives as JSON.
    Plan(PlanArgs),
}

#[derive(Args)]
struct SelectionArgs {
    /// JSON config file; overrides the flags below.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Target platform family (apple, windows, other).
    #[arg(long, default_value_t = Platform::current())]
    platform: Platform,
    /// Comma separated subsystems (host, audio, graphics).
    #[arg(long, default_value = "host,audio,graphics")]
    subsystems: String,
    /// Path to the SDK `c74support` directory.
    #[arg(long)]
    sdk: Option<PathBuf>,
}

impl SelectionArgs {
    fn resolve(&self) -> Result<ShimConfig> {
        if let Some(path) = &self.config {
            return ShimConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()));
        }
        let subsystems = SubsystemSet::parse_list(&self.subsystems)?;
        let mut config = ShimConfig::new(self.platform, subsystems);
        config.sdk_root = self.sdk.clone();
        Ok(config)
    }
}

#[derive(Args)]
struct ComposeArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    /// Output path; prints to stdout when omitted.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Discover header sets from `--sdk` instead of using the built-in lists.
    #[arg(long)]
    discover: bool,
    /// Print the SHA-256 of the unit to stderr.
    #[arg(long)]
    digest: bool,
    /// Emit the unit's directives as JSON instead of header text.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct LintArgs {
    /// Wrapper header to check.
    file: PathBuf,
    /// Platform to check predicates against; defaults to the one recorded in the file.
    #[arg(long)]
    platform: Option<Platform>,
}

#[derive(Args)]
struct DiscoverArgs {
    /// Path to the SDK `c74support` directory.
    #[arg(long)]
    sdk: PathBuf,
}

#[derive(Args)]
struct PlanArgs {
    #[command(flatten)]
    selection: SelectionArgs,
    /// Read exported functions from the SDK's `c74_linker_flags.txt`.
    #[arg(long)]
    linker_flags: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init()
        .ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compose(args) => execute_compose(args),
        Commands::Lint(args) => execute_lint(args),
        Commands::Discover(args) => execute_discover(args),
        Commands::Plan(args) => execute_plan(args),
    }
}

fn execute_compose(args: ComposeArgs) -> Result<()> {
    let config = args.selection.resolve()?;
    let mut composer = Composer::max_sdk();
    if args.discover {
        let Some(root) = &config.sdk_root else {
            bail!("--discover needs --sdk or an sdk_root in the config");
        };
        let layout = SdkLayout::new(root)?;
        composer = composer.with_header_sets(layout.header_sets()?)?;
    }

    let unit = composer
        .compose(&config)
        .with_context(|| format!("failed to compose unit for {}", config.platform))?;
    if args.json {
        let json = serde_json::to_string_pretty(&unit)?;
        match &args.output {
            Some(path) => fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?,
            None => println!("{json}"),
        }
    } else {
        match &args.output {
            Some(path) => {
                unit.write_to(path)?;
                tracing::info!(path = %path.display(), "wrote composition unit");
            }
            None => print!("{}", unit.render()),
        }
    }
    if args.digest {
        eprintln!("{}", unit.digest());
    }
    Ok(())
}

fn execute_lint(args: LintArgs) -> Result<()> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let report = scan_for(&text, &ScopeRegistry::max_sdk(), args.platform);
    for violation in &report.violations {
        println!("{}: {violation}", args.file.display());
    }
    report
        .into_result()
        .with_context(|| format!("{} failed the scope lint", args.file.display()))?;
    println!("{}: ok", args.file.display());
    Ok(())
}

fn execute_discover(args: DiscoverArgs) -> Result<()> {
    let layout = SdkLayout::new(&args.sdk)?;
    let sets = layout.header_sets()?;
    println!("{}", serde_json::to_string_pretty(&sets)?);
    Ok(())
}

fn execute_plan(args: PlanArgs) -> Result<()> {
    let config = args.selection.resolve()?;
    config.subsystems.validate()?;
    let mut plan = BindgenPlan::new(&config);
    if args.linker_flags {
        let layout = SdkLayout::new(config.sdk_root_or_default())?;
        plan = plan.load_linker_flags(&layout)?;
    }
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
