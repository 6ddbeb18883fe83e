use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use multiplex::{ConfigTree, DeclarativeLoader, MultiplexError, Multiplexor, SubprogramLoader, merge};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV_VAR: &str = "MULTIPLEX_LOG";

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliOutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Parser)]
#[command(name = "multiplex")]
#[command(about = "Inspect and dispatch multiplex configuration files")]
struct Cli {
    /// Output format.
    #[arg(long, default_value = "json")]
    format: CliOutputFormat,
    /// Log debug output to stderr.
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the defaults merged with parsed arguments, and the residual tree.
    Show(ShowArgs),
    /// Dispatch the arguments and print the selected program and its config.
    Run(ConfigArgs),
    /// Validate a configuration file and print its generated help.
    Check(CheckArgs),
    /// Run a program with the dispatched config in MULTIPLEX_CONFIG.
    #[cfg(feature = "run-command")]
    Exec(ExecArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// Configuration file; `<stem>.yaml` and `<stem>.json` are probed.
    config: PathBuf,
    /// Arguments parsed against the configuration.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

#[derive(Debug, Args)]
struct ShowArgs {
    #[command(flatten)]
    input: ConfigArgs,
    /// Resolve residual keys against files next to the configuration and
    /// merge them into the config.
    #[arg(long)]
    resolve: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Configuration file; `<stem>.yaml` and `<stem>.json` are probed.
    config: PathBuf,
}

#[cfg(feature = "run-command")]
#[derive(Debug, Args)]
struct ExecArgs {
    /// Executable to run.
    #[arg(long)]
    program: PathBuf,
    #[command(flatten)]
    input: ConfigArgs,
}

#[derive(Debug, Serialize)]
struct ShowOutput {
    config: ConfigTree,
    residual: ConfigTree,
}

#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    state: String,
    program: Option<&'a str>,
    config: &'a ConfigTree,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Show(args) => run_show(args, cli.format),
        Command::Run(args) => run_run(args, cli.format),
        Command::Check(args) => run_check(args),
        #[cfg(feature = "run-command")]
        Command::Exec(args) => run_exec(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Turns a library error into a message; argument errors and help requests
/// exit the way clap does.
fn report(err: MultiplexError) -> String {
    match err {
        MultiplexError::ArgumentParse(err) => err.exit(),
        other => other.to_string(),
    }
}

fn load(path: &Path) -> Result<Multiplexor, String> {
    Multiplexor::from_path(path).map_err(|err| format!("failed to load '{}': {err}", path.display()))
}

fn render<T: Serialize>(value: &T, format: CliOutputFormat) -> Result<String, String> {
    match format {
        CliOutputFormat::Json => serde_json::to_string_pretty(value).map_err(|err| err.to_string()),
        CliOutputFormat::Yaml => serde_yaml::to_string(value).map_err(|err| err.to_string()),
    }
}

fn run_show(args: ShowArgs, format: CliOutputFormat) -> Result<(), String> {
    let plex = load(&args.input.config)?;
    let (mut config, mut residual) = plex.get_conf(&args.input.args).map_err(report)?;
    if args.resolve && !residual.is_empty() {
        let nested = plex.get_nested_config(&residual).map_err(report)?;
        config = merge(&config, &nested);
        residual = ConfigTree::new();
    }
    println!("{}", render(&ShowOutput { config, residual }, format)?);
    Ok(())
}

fn run_run(args: ConfigArgs, format: CliOutputFormat) -> Result<(), String> {
    let plex = load(&args.config)?;
    let selection = plex
        .dispatch(&args.args, &DeclarativeLoader::new())
        .map_err(report)?;
    debug!(state = %selection.state(), "dispatched");
    let output = RunOutput {
        state: selection.state().to_string(),
        program: selection.program(),
        config: selection.config(),
    };
    println!("{}", render(&output, format)?);
    Ok(())
}

fn run_check(args: CheckArgs) -> Result<(), String> {
    let plex = load(&args.config)?;
    let help = plex.render_help().map_err(report)?;

    let loader = DeclarativeLoader::new();
    for (name, _) in plex.subprograms() {
        let Some(path) = plex.subprogram_path(name) else {
            continue;
        };
        loader
            .load(&path)
            .and_then(|handle| handle.build_parser(&[]))
            .map_err(|err| format!("subprogram '{name}': {err}"))?;
        debug!(subprogram = %name, path = %path.display(), "subprogram is valid");
    }

    print!("{help}");
    Ok(())
}

#[cfg(feature = "run-command")]
fn run_exec(args: ExecArgs) -> Result<(), String> {
    let plex = load(&args.input.config)?;
    let selection = plex
        .dispatch(&args.input.args, &DeclarativeLoader::new())
        .map_err(report)?;
    let status = multiplex::run_command(&args.program, Vec::<String>::new(), selection.config()).map_err(report)?;
    if !status.success() {
        std::process::exit(status.code().unwrap_or(1));
    }
    Ok(())
}
