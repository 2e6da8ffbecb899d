/// Version injected at compile time via LMS_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("LMS_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::TryStreamExt;
use lms::api::http::format_api_error;
use lms::resource::{Identity, Realm};
use lms::{Config, Resource, ResourceKind, Schoology};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Command line client for the Schoology LMS
#[derive(Parser, Debug)]
#[command(name = "lms", version = VERSION, about, long_about = None)]
struct Args {
    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the effective configuration (secrets masked)
    Config,
    /// List schools
    Schools,
    /// Show the authenticated user
    Me,
    /// List available languages
    Langs,
    /// List your course sections
    Sections,
    /// List your courses, optionally filtered by title
    Courses {
        search: Option<String>,
    },
    /// Show every property of one resource
    Show {
        kind: ResourceKind,
        /// Identifier, e.g. `42` or `5,9` for composite identities
        id: String,
        /// Parent realm as `kind:id`, e.g. `section:42`
        #[arg(long = "in")]
        realm: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("lms {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("lms").join("lms.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".lms").join("lms.log");
    }
    PathBuf::from("lms.log")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level)?;

    let config = Config::load()?;

    if let Command::Config = args.command {
        println!("{}", serde_json::to_string_pretty(&config.masked())?);
        return Ok(());
    }

    let sc = Schoology::new(&config)?;
    if let Err(err) = run(&sc, args.command).await {
        tracing::error!("Command failed: {:?}", err);
        match err.downcast_ref::<lms::Error>() {
            Some(api_err) => eprintln!("Error: {}", format_api_error(api_err)),
            None => eprintln!("Error: {err:#}"),
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn run(sc: &Schoology, command: Command) -> Result<()> {
    match command {
        Command::Config => {}
        Command::Schools => {
            for school in sc.schools().await? {
                print_row(&school).await?;
            }
        }
        Command::Me => {
            let me = sc.me().await?;
            print_properties(&me).await;
        }
        Command::Langs => {
            for (code, name) in sc.languages().await? {
                println!("{:<8} {}", code, name);
            }
        }
        Command::Sections => {
            for section in my_sections(sc).await? {
                print_row(&section).await?;
            }
        }
        Command::Courses { search } => {
            let needle = search.map(|s| s.to_lowercase());
            for (label, course) in my_courses(sc).await? {
                if needle.as_ref().is_some_and(|n| !label.to_lowercase().contains(n)) {
                    continue;
                }
                println!("{:<12} {}", course.identity(), label);
            }
        }
        Command::Show { kind, id, realm } => {
            let identity = Identity::parse(&id)?;
            let realm = realm.as_deref().map(|raw| parse_realm(sc, raw)).transpose()?;
            let resource = sc.for_id(kind, identity, realm.as_ref()).await?;
            print_properties(&resource).await;
        }
    }
    Ok(())
}

async fn my_sections(sc: &Schoology) -> Result<Vec<Arc<Resource>>> {
    let me = sc.me().await?;
    Ok(sc.related(&me, "sections").try_collect().await?)
}

/// Courses of the user's sections, deduplicated and sorted by title
async fn my_courses(sc: &Schoology) -> Result<Vec<(String, Arc<Resource>)>> {
    let mut courses: BTreeMap<Identity, Arc<Resource>> = BTreeMap::new();
    for section in my_sections(sc).await? {
        if let Some(course) = sc.registry().resolve_field(&section, "course").await? {
            courses.entry(course.identity().clone()).or_insert(course);
        }
    }

    let mut labelled = Vec::with_capacity(courses.len());
    for course in courses.into_values() {
        labelled.push((course.label().await?, course));
    }
    labelled.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(labelled)
}

fn parse_realm(sc: &Schoology, raw: &str) -> Result<Realm> {
    let (kind, id) = raw
        .split_once(':')
        .with_context(|| format!("Realm must look like `kind:id`, got `{}`", raw))?;
    let kind: ResourceKind = kind.parse().map_err(anyhow::Error::msg)?;
    Ok(sc.registry().realm(kind, Identity::parse(id)?)?)
}

async fn print_row(resource: &Resource) -> Result<()> {
    println!("{:<12} {}", resource.identity(), resource.label().await?);
    Ok(())
}

async fn print_properties(resource: &Resource) {
    println!("{}", resource);
    for prop in resource.def().properties() {
        match resource.field(&prop.name).await {
            Ok(value) => println!("  {:<26} {}", prop.name, value),
            Err(e) => println!("  {:<26} <{}>", prop.name, e),
        }
    }
}
