mod error_presentation;
mod render;

use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Args, Parser, Subcommand};
use nu_ansi_term::Color;
use seedql::{
    assert_dataset, open_driver, parse_dataset, seed, AssertOptions, CancelToken, DataSet,
    Operation, SeedOptions,
};

use error_presentation::{render_runtime_error, CliError, CliResult};

/// Seed and assert database state from declarative YAML datasets.
#[derive(Debug, Parser)]
#[command(name = "seedql", version, about)]
struct Cli {
    /// Database connection string, e.g. sqlite://test.db
    #[arg(long, global = true, env = "SEEDQL_CONN")]
    db: Option<String>,

    /// Suppress per-table progress output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Seed database content for testing
    Seed(SeedArgs),
    /// Assert database content against a dataset
    Assert(AssertArgs),
    /// Serve datasets from a directory over HTTP
    Http(HttpArgs),
}

#[derive(Debug, Args)]
struct SeedArgs {
    /// Tag name used for filtering rows (include)
    #[arg(short = 'i', long = "include-tag")]
    include_tags: Vec<String>,

    /// Tag name used for filtering rows (exclude)
    #[arg(short = 'e', long = "exclude-tag")]
    exclude_tags: Vec<String>,

    /// Rows written per SQL statement
    #[arg(short = 'b', long, default_value_t = seedql::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Truncate this table before seeding (repeatable)
    #[arg(short = 't', long = "truncate")]
    truncates: Vec<String>,

    /// Dataset file to import
    source_file: PathBuf,

    /// Target tables (default: all tables in the source file)
    targets: Vec<String>,
}

#[derive(Debug, Args)]
struct AssertArgs {
    /// Tag name used for filtering rows (include)
    #[arg(short = 'i', long = "include-tag")]
    include_tags: Vec<String>,

    /// Tag name used for filtering rows (exclude)
    #[arg(short = 'e', long = "exclude-tag")]
    exclude_tags: Vec<String>,

    /// Dataset file with the expected state
    source_file: PathBuf,

    /// Target tables (default: all tables in the source file)
    targets: Vec<String>,
}

#[derive(Debug, Args)]
struct HttpArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Directory holding dataset files
    dir: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let token = CancelToken::new();
    match run(cli, &token) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("{}", render_runtime_error(error));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, token: &CancelToken) -> CliResult<ExitCode> {
    let quiet = cli.quiet;
    let conn = cli.db;

    match cli.command {
        Command::Seed(args) => run_seed(token, conn, quiet, args),
        Command::Assert(args) => run_assert(token, conn, quiet, args),
        Command::Http(args) => run_http(token, conn, args),
    }
}

fn run_seed(
    token: &CancelToken,
    conn: Option<String>,
    quiet: bool,
    args: SeedArgs,
) -> CliResult<ExitCode> {
    let conn = conn.ok_or(CliError::MissingConnection)?;
    let mut driver = open_driver(token, &conn)?;
    let data = load_dataset(&args.source_file)?;

    let mut overrides: BTreeMap<String, Operation> = BTreeMap::new();
    for table in &args.truncates {
        overrides.insert(table.clone(), Operation::Truncate);
    }

    seed(
        token,
        driver.as_mut(),
        &data,
        SeedOptions {
            batch_size: args.batch_size,
            operations: overrides,
            include_tags: args.include_tags,
            exclude_tags: args.exclude_tags,
            target_tables: args.targets,
            progress: if quiet {
                None
            } else {
                Some(render::seed_progress())
            },
        },
    )?;

    Ok(ExitCode::SUCCESS)
}

fn run_assert(
    token: &CancelToken,
    conn: Option<String>,
    quiet: bool,
    args: AssertArgs,
) -> CliResult<ExitCode> {
    let conn = conn.ok_or(CliError::MissingConnection)?;
    let driver = open_driver(token, &conn)?;
    let data = load_dataset(&args.source_file)?;

    let (ok, _results) = assert_dataset(
        token,
        driver.as_ref(),
        &data,
        AssertOptions {
            include_tags: args.include_tags,
            exclude_tags: args.exclude_tags,
            target_tables: args.targets,
            progress: if quiet {
                None
            } else {
                Some(render::assert_progress())
            },
            diff: Some(render::diff_printer(false, quiet)),
        },
    )?;

    if ok {
        println!("{}", Color::Green.paint("Match"));
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", Color::Red.paint("Not Match"));
        Ok(ExitCode::FAILURE)
    }
}

fn run_http(token: &CancelToken, conn: Option<String>, args: HttpArgs) -> CliResult<ExitCode> {
    let conn = conn.ok_or(CliError::MissingConnection)?;
    seedql_server::serve(token, &args.dir, &conn, args.port)?;
    Ok(ExitCode::SUCCESS)
}

fn load_dataset(path: &Path) -> CliResult<DataSet> {
    let file = File::open(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_dataset(file)?)
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
