use tabulator::db::{self, TableGroups, DEFAULT_DELIMITER, DEFAULT_GROUP_NAMES};
use tabulator::docstore::{pipeline_from_json, DocStore};
use tabulator::reports::{self, ACCIDENTS_COLLECTION, DEFAULT_MIN_SPEED};
use tabulator::reshape::{CollisionPolicy, LabelMap, LabelTable, PivotSpec, Scalar, TableReshaper};
use tabulator::Settings;

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabulator")]
#[command(about = "Postgres and MongoDB helpers with pivot-table output")]
#[command(version)]
struct Args {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Output format for results
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for settings read from the environment / .env
#[derive(ClapArgs)]
struct ConnectionArgs {
    /// Postgres database (or set PGDATABASE)
    #[arg(long)]
    dbname: Option<String>,

    /// Postgres host (or set PGHOST)
    #[arg(long)]
    host: Option<String>,

    /// Postgres port (or set PGPORT)
    #[arg(long)]
    port: Option<u16>,

    /// Postgres user (or set PGUSER)
    #[arg(long)]
    user: Option<String>,

    /// Postgres password (or set PGPASSWORD)
    #[arg(long)]
    password: Option<String>,

    /// MongoDB connection string (or set MONGODB_URI)
    #[arg(long)]
    mongo_uri: Option<String>,

    /// MongoDB database (or set MONGODB_DATABASE)
    #[arg(long)]
    mongo_db: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a SQL query and print the rows, optionally pivoted
    Query {
        /// SQL text, or @path to read it from a file
        sql: String,

        #[command(flatten)]
        pivot: PivotArgs,
    },
    /// List tables in the public schema
    Tables {
        /// Only tables owned by this role
        #[arg(long)]
        owner: Option<String>,
    },
    /// List other sessions on the server
    Connections {
        /// Only sessions connected to this database
        #[arg(long)]
        db: Option<String>,
    },
    /// List user-created databases
    Databases,
    /// Terminate every other session connected to a database
    ClearConnections {
        db: String,
    },
    /// Load a delimited file into an existing table
    Load {
        file: PathBuf,

        /// Target table (default: file name up to the first dot)
        #[arg(long)]
        table: Option<String>,

        /// Field delimiter; accepts a character, "\t" or "tab"
        #[arg(long, value_parser = parse_delimiter, default_value = "tab")]
        delimiter: char,
    },
    /// Run a CREATE TABLE script, then load a delimited file into the table
    CreateLoad {
        /// File containing the DDL
        ddl: PathBuf,

        file: PathBuf,

        /// Target table (default: from the DDL, then the file name)
        #[arg(long)]
        table: Option<String>,

        #[arg(long, value_parser = parse_delimiter, default_value = "tab")]
        delimiter: char,
    },
    /// Drop all tables belonging to the named activity groups
    Housekeeping {
        /// Groups to drop (default: movies books references)
        groups: Vec<String>,

        /// JSON file of {"group": ["table", ...]} replacing the built-in groups
        #[arg(long)]
        groups_file: Option<PathBuf>,
    },
    /// Pivot a JSON array of aggregation records ("-" reads stdin)
    Pivot {
        records: PathBuf,

        #[command(flatten)]
        pivot: PivotArgs,
    },
    /// Run a MongoDB aggregation pipeline and pivot the results
    Aggregate {
        collection: String,

        /// JSON file holding the pipeline stages
        pipeline: PathBuf,

        #[command(flatten)]
        pivot: PivotArgs,
    },
    /// Accidents by speed limit and severity
    Report {
        #[arg(long, default_value = ACCIDENTS_COLLECTION)]
        collection: String,

        #[arg(long, default_value_t = DEFAULT_MIN_SPEED)]
        min_speed: i32,

        /// Label map (.json or .csv) with Accident_Severity labels
        #[arg(long)]
        labels: PathBuf,
    },
}

#[derive(ClapArgs)]
struct PivotArgs {
    /// Field whose values become rows
    #[arg(long)]
    rows: Option<String>,

    /// Field whose values become columns
    #[arg(long)]
    columns: Option<String>,

    /// Field holding cell values
    #[arg(long)]
    values: Option<String>,

    /// Value for empty cells, e.g. 0
    #[arg(long)]
    fill: Option<String>,

    #[arg(long)]
    relabel_rows: bool,

    #[arg(long)]
    relabel_columns: bool,

    /// Order rows by raw value instead of first occurrence
    #[arg(long)]
    sort_rows: bool,

    /// Order columns by raw value instead of first occurrence
    #[arg(long)]
    sort_columns: bool,

    /// Displayed row axis name
    #[arg(long)]
    row_label: Option<String>,

    /// Displayed column axis name
    #[arg(long)]
    column_label: Option<String>,

    /// Label map (.json or .csv)
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Repeated field names when flattening: first-wins, last-wins or reject
    #[arg(long, default_value = "reject")]
    collision: String,
}

impl PivotArgs {
    fn spec(&self) -> Result<Option<PivotSpec>> {
        let (rows, columns, values) = match (&self.rows, &self.columns, &self.values) {
            (None, None, None) => return Ok(None),
            (Some(r), Some(c), Some(v)) => (r, c, v),
            _ => bail!("--rows, --columns and --values must be given together"),
        };

        let mut spec = PivotSpec::new(rows, columns, values).collision(self.collision.parse::<CollisionPolicy>()?);
        spec.fill_value = self.fill.as_deref().map(Scalar::parse_cell);
        spec.relabel_rows = self.relabel_rows;
        spec.relabel_columns = self.relabel_columns;
        spec.sort_rows = self.sort_rows;
        spec.sort_columns = self.sort_columns;
        spec.row_axis_label = self.row_label.clone();
        spec.column_axis_label = self.column_label.clone();
        Ok(Some(spec))
    }

    fn required_spec(&self) -> Result<PivotSpec> {
        self.spec()?
            .context("--rows, --columns and --values are required")
    }

    fn label_map(&self) -> Result<LabelMap> {
        match &self.labels {
            Some(path) => load_labels(path),
            None => Ok(LabelMap::new()),
        }
    }
}

fn parse_delimiter(s: &str) -> std::result::Result<char, String> {
    match s {
        "\\t" | "tab" => Ok('\t'),
        _ => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(format!("delimiter must be a single character, got '{}'", s)),
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = resolve_settings(&args.connection)?;
    let format = args.format;

    match args.command {
        Commands::Query { sql, pivot } => {
            let sql = match sql.strip_prefix('@') {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read SQL from {}", path))?,
                None => sql,
            };
            let result = db::run_query(&sql, &settings.postgres).await?;
            info!("{} rows in {}ms", result.row_count(), result.execution_time_ms);

            match pivot.spec()? {
                Some(spec) => {
                    let labels = pivot.label_map()?;
                    let table = TableReshaper::new(&labels).to_table(&result.into_records(), &spec)?;
                    print_table(&table, format)?;
                }
                None => match format {
                    OutputFormat::Text => println!("{}", result.to_dataframe()?),
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.rows)?),
                },
            }
        }
        Commands::Tables { owner } => {
            let result = db::show_tables(&settings.postgres, owner.as_deref()).await?;
            print_rows(&result, format)?;
        }
        Commands::Connections { db: target } => {
            let result = db::show_connections(&settings.postgres, target.as_deref()).await?;
            print_rows(&result, format)?;
        }
        Commands::Databases => {
            let result = db::show_databases(&settings.postgres).await?;
            print_rows(&result, format)?;
        }
        Commands::ClearConnections { db: target } => {
            let terminated = db::clear_connections(&target, &settings.postgres).await?;
            println!("Terminated {} connection(s) to {}", terminated, target);
        }
        Commands::Load { file, table, delimiter } => {
            let rows = db::load_delimited_file(&file, table.as_deref(), delimiter, &settings.postgres).await?;
            println!("Loaded {} rows from {}", rows, file.display());
        }
        Commands::CreateLoad { ddl, file, table, delimiter } => {
            let ddl = std::fs::read_to_string(&ddl)
                .with_context(|| format!("Failed to read DDL from {}", ddl.display()))?;
            let rows = db::create_and_load(&ddl, &file, table.as_deref(), delimiter, &settings.postgres).await?;
            println!("Loaded {} rows from {}", rows, file.display());
        }
        Commands::Housekeeping { groups, groups_file } => {
            let registry = match groups_file {
                Some(path) => TableGroups::load(&path)
                    .with_context(|| format!("Failed to load table groups from {}", path.display()))?,
                None => TableGroups::default(),
            };
            let requested: Vec<String> = if groups.is_empty() {
                DEFAULT_GROUP_NAMES.iter().map(|s| s.to_string()).collect()
            } else {
                groups
            };
            let dropped = db::drop_table_groups(&requested, &registry, &settings.postgres).await?;
            for statement in dropped {
                println!("{}", statement);
            }
        }
        Commands::Pivot { records, pivot } => {
            let records = read_records(&records)?;
            let labels = pivot.label_map()?;
            let table = TableReshaper::new(&labels).to_table(&records, &pivot.required_spec()?)?;
            print_table(&table, format)?;
        }
        Commands::Aggregate { collection, pipeline, pivot } => {
            let content = std::fs::read_to_string(&pipeline)
                .with_context(|| format!("Failed to read pipeline from {}", pipeline.display()))?;
            let stages = pipeline_from_json(&serde_json::from_str(&content)?)?;
            let spec = pivot.required_spec()?;
            let labels = pivot.label_map()?;

            let store = DocStore::connect(&settings.docstore).await?;
            let results = store.aggregate(&collection, stages).await?;
            let table = TableReshaper::new(&labels).to_table(&results, &spec)?;
            print_table(&table, format)?;
        }
        Commands::Report { collection, min_speed, labels } => {
            let labels = load_labels(&labels)?;
            let store = DocStore::connect(&settings.docstore).await?;
            let table = reports::accidents_by_speed_and_severity(&store, &collection, &labels, min_speed).await?;
            print_table(&table, format)?;
        }
    }

    Ok(())
}

fn resolve_settings(overrides: &ConnectionArgs) -> Result<Settings> {
    let mut settings = Settings::from_env().context("Failed to read settings from the environment")?;
    let pg = &mut settings.postgres;

    if let Some(v) = &overrides.dbname {
        pg.dbname = v.clone();
    }
    if let Some(v) = &overrides.host {
        pg.host = v.clone();
    }
    if let Some(v) = overrides.port {
        pg.port = v;
    }
    if let Some(v) = &overrides.user {
        pg.user = v.clone();
    }
    if let Some(v) = &overrides.password {
        pg.password = v.clone();
    }
    if let Some(v) = &overrides.mongo_uri {
        settings.docstore.uri = v.clone();
    }
    if let Some(v) = &overrides.mongo_db {
        settings.docstore.database = v.clone();
    }

    Ok(settings)
}

fn load_labels(path: &Path) -> Result<LabelMap> {
    LabelMap::load(path).with_context(|| format!("Failed to load labels from {}", path.display()))
}

fn read_records(path: &Path) -> Result<Vec<Value>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
    };

    match serde_json::from_str(&content)? {
        Value::Array(records) => Ok(records),
        _ => bail!("{} must contain a JSON array of records", path.display()),
    }
}

fn print_table(table: &LabelTable, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print!("{}", table),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(table)?),
    }
    Ok(())
}

fn print_rows(result: &db::QueryResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => println!("{}", result.to_dataframe()?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.rows)?),
    }
    Ok(())
}
