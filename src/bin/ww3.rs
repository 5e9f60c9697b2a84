use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use wavewatch3::{
    BatchOptions, CacheDir, Client, Error, FetchOutcome, LogProgress, Result, SilentProgress,
    SourceDescriptor, SourceRegistry, default_cache_dir, fetch_resolvers, resolve_all,
};

#[derive(Parser)]
#[command(name = "ww3")]
#[command(about = "Locate and download WAVEWATCH III hindcast archives")]
#[command(version)]
struct Cli {
    /// Run as if started in DIR.
    #[arg(long = "cd", global = true, value_name = "DIR")]
    cd: Option<PathBuf>,

    /// Only report errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    silent: bool,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true, default_value = "multigrid")]
    source: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Describe the selected source as TOML")]
    Info {
        /// Describe every known source.
        #[arg(long)]
        all: bool,
    },
    #[command(about = "Print the URL of every date and quantity")]
    Url(Selection),
    #[command(about = "Download archive files into the working directory")]
    Fetch(FetchArgs),
    #[command(about = "Remove cached archive files")]
    Clean(CleanArgs),
}

#[derive(Args)]
struct Selection {
    /// Dates as YYYY-MM-DD[THH].
    dates: Vec<String>,

    #[arg(long)]
    grid: Option<String>,

    /// Quantity to select; repeat for more. Defaults to all of them.
    #[arg(short, long = "quantity")]
    quantity: Vec<String>,
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    selection: Selection,

    /// Read more dates from PATH, one per line.
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,

    /// Print the URLs without downloading.
    #[arg(long)]
    dry_run: bool,

    /// Download even when the file exists.
    #[arg(short, long)]
    force: bool,

    /// Print outcomes as JSON lines.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CleanArgs {
    #[arg(long)]
    dry_run: bool,

    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Do not ask for confirmation.
    #[arg(long)]
    yes: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(map_exit_code(&err))
        }
    }
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else if cli.silent {
        LevelFilter::ERROR
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn map_exit_code(error: &Error) -> u8 {
    match error {
        e if e.is_validation() => 2,
        Error::Retrieval { .. } | Error::Http(_) | Error::Incomplete { .. } => 3,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    if let Some(dir) = &cli.cd {
        std::env::set_current_dir(dir)?;
    }

    let registry = SourceRegistry::builtin();
    let source = registry.get(&cli.source)?;

    match cli.command {
        Commands::Info { all } => {
            let text = if all {
                registry.render_info(registry.names())?
            } else {
                registry.render_info([source.name])?
            };
            print!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::Url(selection) => {
            let resolvers = resolve_all(
                source,
                &selection.dates,
                selection.grid.as_deref(),
                &selection.quantity,
            )?;
            for resolver in resolvers {
                println!("{resolver}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Fetch(args) => fetch(source, args),
        Commands::Clean(args) => clean(args),
    }
}

fn fetch(source: &'static SourceDescriptor, args: FetchArgs) -> Result<ExitCode> {
    let mut dates = args.selection.dates;
    if let Some(path) = &args.file {
        dates.extend(read_dates(path)?);
    }

    let resolvers = resolve_all(
        source,
        &dates,
        args.selection.grid.as_deref(),
        &args.selection.quantity,
    )?;
    if resolvers.is_empty() {
        return Ok(ExitCode::SUCCESS);
    }

    if args.dry_run {
        for resolver in &resolvers {
            println!("{resolver}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let client = Client::default_client()?;
    let opts = BatchOptions {
        force: args.force,
        ..BatchOptions::default()
    };
    let outcomes = if args.json {
        fetch_resolvers(&client, &resolvers, Path::new("."), &opts, &SilentProgress)?
    } else {
        fetch_resolvers(&client, &resolvers, Path::new("."), &opts, &LogProgress)?
    };

    report(&outcomes, args.json)?;
    if outcomes.iter().all(FetchOutcome::is_success) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(3))
    }
}

fn read_dates(path: &Path) -> Result<Vec<String>> {
    Ok(fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

fn report(outcomes: &[FetchOutcome], json: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for outcome in outcomes {
        if json {
            writeln!(out, "{}", serde_json::to_string(outcome)?)?;
        } else if outcome.is_success() {
            writeln!(out, "{}", outcome.local.display())?;
        } else {
            eprintln!("{}: {}", outcome.remote, outcome.message());
        }
    }
    Ok(())
}

fn clean(args: CleanArgs) -> Result<ExitCode> {
    let cache = CacheDir::new(args.cache_dir.unwrap_or_else(default_cache_dir));
    let pending = cache.clean(true)?;

    if pending.files.is_empty() {
        println!("nothing to remove in {}", cache.root().display());
        return Ok(ExitCode::SUCCESS);
    }
    for entry in &pending.files {
        println!("{}", entry.path.display());
    }
    println!("{} file(s), {} bytes", pending.files.len(), pending.total_bytes);

    if args.dry_run {
        return Ok(ExitCode::SUCCESS);
    }
    if !args.yes && !confirm("remove these files?")? {
        return Ok(ExitCode::SUCCESS);
    }

    cache.clean(false)?;
    Ok(ExitCode::SUCCESS)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
