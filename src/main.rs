use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use competency_import::{
    AuditContext, CsvOptions, ImportResult, Importer, ImporterConfig, NewFramework, RecordStore,
    Scale, SqliteStore,
};

/// Import competency catalogs (levels + competencies) from delimited text files
#[derive(Parser, Debug)]
#[command(name = "competency-import", version, about)]
struct Cli {
    /// TOML config file; missing file means defaults
    #[arg(long, global = true, env = "COMPETENCY_IMPORT_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(long, global = true, env = "COMPETENCY_IMPORT_DB")]
    database: Option<PathBuf>,

    /// External-id prefix of the level scheme (RENEC, ...)
    #[arg(long, global = true, env = "COMPETENCY_IMPORT_PREFIX")]
    prefix: Option<String>,

    /// Acting user recorded in audit fields
    #[arg(long, global = true, env = "COMPETENCY_IMPORT_USER")]
    user_id: Option<i64>,

    /// Print results as JSON instead of log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a rating scale
    AddScale {
        #[arg(long)]
        name: String,
        /// Comma separated, lowest first ("Not yet,Basic,Competent")
        #[arg(long)]
        values: String,
    },

    /// Create a framework bound to a scale
    CreateFramework {
        #[arg(long)]
        name: String,
        #[arg(long)]
        id_number: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        scale_id: i64,
    },

    /// Import the level rows of a catalog file
    ImportLevels {
        #[arg(long)]
        framework: i64,
        file: Option<PathBuf>,
        /// Ignore the file and provision the canonical levels
        #[arg(long)]
        create_defaults: bool,
        #[command(flatten)]
        csv: CsvArgs,
    },

    /// Import the competency rows of a catalog file
    ImportCompetencies {
        #[arg(long)]
        framework: i64,
        file: PathBuf,
        /// Rewrite name/description/parent of competencies that already exist
        #[arg(long)]
        overwrite: bool,
        /// Fail rows whose level is missing instead of creating it
        #[arg(long)]
        no_create_levels: bool,
        #[command(flatten)]
        csv: CsvArgs,
    },

    /// List the canonical levels already present in a framework
    Levels {
        #[arg(long)]
        framework: i64,
    },
}

#[derive(Args, Debug)]
struct CsvArgs {
    /// Source encoding label (UTF-8, ISO-8859-1, WINDOWS-1252, ...)
    #[arg(long)]
    encoding: Option<String>,
    /// comma | semicolon | tab | colon
    #[arg(long)]
    delimiter: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("competency_import=info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Merge file config with flags (flags win)
fn load_config(cli: &Cli) -> Result<ImporterConfig> {
    let mut config = ImporterConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(prefix) = &cli.prefix {
        config.framework_prefix = prefix.clone();
    }
    if let Some(user_id) = cli.user_id {
        config.user_id = user_id;
    }
    Ok(config)
}

fn csv_options(config: &ImporterConfig, args: &CsvArgs) -> Result<CsvOptions> {
    let mut csv = config.csv_options();
    if let Some(encoding) = &args.encoding {
        csv.encoding = encoding.parse()?;
    }
    if let Some(delimiter) = &args.delimiter {
        csv.delimiter = delimiter.parse()?;
    }
    Ok(csv)
}

/// Ok(false) when an import ran but did not meet its success predicate
fn run(cli: &Cli) -> Result<bool> {
    let config = load_config(cli)?;
    let mut store = SqliteStore::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    info!(database = %config.database.display(), "database ready");

    let ctx = AuditContext::new(config.user_id);

    match &cli.command {
        Commands::AddScale { name, values } => {
            let values = Scale::parse_values(values);
            let id = store.insert_scale(name, &values)?;
            if cli.json {
                println!("{}", serde_json::json!({ "scale_id": id, "values": values }));
            } else {
                println!("✓ Scale '{}' created with ID {} ({} values)", name, id, values.len());
            }
            Ok(true)
        }

        Commands::CreateFramework {
            name,
            id_number,
            description,
            scale_id,
        } => {
            let mut importer = Importer::new(&mut store, ctx, config.scheme());
            let id = importer.create_framework(&NewFramework {
                name: name.clone(),
                external_id: id_number.clone(),
                description: description.clone(),
                scale_id: *scale_id,
            })?;
            if cli.json {
                println!("{}", serde_json::json!({ "framework_id": id }));
            } else {
                println!("✓ Framework '{}' created with ID {}", name, id);
            }
            Ok(true)
        }

        Commands::ImportLevels {
            framework,
            file,
            create_defaults,
            csv,
        } => {
            let csv = csv_options(&config, csv)?;
            let mut importer = Importer::new(&mut store, ctx, config.scheme());
            let (levels, result) =
                importer.import_levels(file.as_deref(), *framework, &csv, *create_defaults)?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({ "levels": levels, "result": result }))?
                );
            } else {
                print_result(&result);
                println!("📚 Levels available: {}", levels.len());
            }
            Ok(!levels.is_empty() && result.stats.errors == 0)
        }

        Commands::ImportCompetencies {
            framework,
            file,
            overwrite,
            no_create_levels,
            csv,
        } => {
            let csv = csv_options(&config, csv)?;
            let mut options = config.competency_options();
            options.overwrite |= *overwrite;
            if *no_create_levels {
                options.create_missing_levels = false;
            }

            let mut importer = Importer::new(&mut store, ctx, config.scheme());
            let levels = importer.existing_levels(*framework)?;
            let result = importer.import_competencies(file, *framework, &levels, &csv, options)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_result(&result);
            }
            Ok(result.is_success())
        }

        Commands::Levels { framework } => {
            let importer = Importer::new(&mut store, ctx, config.scheme());
            let levels = importer.existing_levels(*framework)?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&levels)?);
            } else {
                for (external_id, id) in &levels {
                    let name = store
                        .find(*framework, external_id)?
                        .map(|node| node.short_name)
                        .unwrap_or_default();
                    println!("{:>6}  {:<20} {}", id, external_id, name);
                }
            }
            Ok(true)
        }
    }
}

fn print_result(result: &ImportResult) {
    for message in &result.messages {
        println!("{}", message);
    }
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Run {} ({})", result.run_id, result.mode.as_str());
    if let Some(sha) = &result.source_sha256 {
        println!("Source SHA-256: {}", sha);
    }
    println!(
        "Total: {} | Created: {} | Skipped: {} (updated: {}) | Errors: {}",
        result.stats.total,
        result.stats.created,
        result.stats.skipped,
        result.stats.updated,
        result.stats.errors
    );
    for (level, count) in &result.stats.by_level {
        if *count > 0 {
            println!("  level {}: {}", level, count);
        }
    }
    if result.is_success() {
        println!("✅ Import succeeded");
    } else {
        println!("⚠️  Import finished without meeting its success criteria");
    }
}
