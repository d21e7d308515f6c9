//! lurry — render and run named SQL templates
//!
//! # Usage
//!
//! ```bash
//! # Render a query
//! lurry --source queries/ render app.User search -p name="O'Brien" -p active=true
//!
//! # Run it
//! lurry --source queries/ --database-url mysql://localhost/app exec app.User search -p limit=5
//!
//! # What is registered
//! lurry --source queries/ list
//! ```

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use lurry::executor::RowMap;
use lurry::prelude::*;
use lurry::template::Segment;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lurry")]
#[command(version)]
#[command(about = "Named SQL templates, rendered for your database", long_about = None)]
#[command(after_help = "EXAMPLES:
    lurry --source queries/ list
    lurry --source queries/ render app.User byId -p id=7
    lurry --source queries/ --dialect mysql render app.User byName -p name=\"O'Brien\"
    lurry --database-url sqlite://app.db exec app.Order byIds -p ids=[1,2,3]")]
struct Cli {
    /// Config file (default: <config dir>/lurry/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Definition file or directory; repeatable, later ones override
    #[arg(short, long = "source", global = true)]
    sources: Vec<PathBuf>,

    /// Format for files without a known extension
    #[arg(long, global = true)]
    format: Option<Format>,

    /// Dialect to escape for (skips detection)
    #[arg(long, global = true)]
    dialect: Option<Dialect>,

    /// Database connection URL
    #[arg(long, env = "LURRY_DATABASE_URL", global = true)]
    database_url: Option<String>,

    /// Verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the rendered SQL
    Render {
        entity: String,
        query: String,
        /// Parameter as key=value; the value is parsed as JSON when valid
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
    },
    /// List every registered query
    List,
    /// Show how a template was compiled
    Explain { entity: String, query: String },
    /// Render and execute against the database
    Exec {
        entity: String,
        query: String,
        #[arg(short = 'p', long = "param")]
        params: Vec<String>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        output: OutputFormat,
    },
    /// Show supported dialects and how they escape
    Dialects,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "lurry=debug",
        _ => "lurry=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Dialects = cli.command {
        show_dialects();
        return Ok(());
    }

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Render {
            entity,
            query,
            params,
        } => {
            let engine = QueryEngine::from_config(&config)?;
            let params = parse_params(params)?;
            let sql = engine.render_sql(entity, query, &params)?;
            println!("{}", sql);
            if config.dialect.is_none() && engine.template(entity, query)?.uses_dialect() {
                eprintln!(
                    "{}",
                    "⚠ No dialect given; escaped with the default strategy. Use --dialect".yellow()
                );
            }
        }
        Commands::List => {
            let engine = QueryEngine::from_config(&config)?;
            let keys = engine.keys()?;
            if keys.is_empty() {
                println!("{}", "(no queries)".dimmed());
            }
            for key in &keys {
                println!("{}{}{}", key.entity.as_str().cyan(), "::".dimmed(), key.query.as_str().white());
            }
        }
        Commands::Explain { entity, query } => {
            let engine = QueryEngine::from_config(&config)?;
            explain(&engine, entity, query)?;
        }
        Commands::Exec {
            entity,
            query,
            params,
            output,
        } => {
            let url = config
                .database_url
                .as_deref()
                .context("no database URL. Use --database-url or set LURRY_DATABASE_URL")?;
            let params = parse_params(params)?;
            tracing::debug!("Connecting to {}", url);
            let db = LurryDB::connect(url, QueryEngine::builder().config(&config)).await?;

            let sql = db.render(entity, query, &params)?;
            if cli.verbose > 0 {
                eprintln!("{} {}", "SQL:".dimmed(), sql.yellow());
            }
            if returns_rows(&sql) {
                let rows = db.fetch_all(entity, query, &params).await?;
                format_output(&rows, output);
            } else {
                let affected = db.execute(entity, query, &params).await?;
                println!("{} {} rows affected", "✓".green(), affected);
            }
        }
        Commands::Dialects => {}
    }

    Ok(())
}

/// File config with command-line flags on top.
fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if !cli.sources.is_empty() {
        config.sources = cli.sources.clone();
    }
    if cli.format.is_some() {
        config.format = cli.format;
    }
    if cli.dialect.is_some() {
        config.dialect = cli.dialect;
    }
    if cli.database_url.is_some() {
        config.database_url = cli.database_url.clone();
    }
    if config.sources.is_empty() {
        bail!("no definition sources. Use --source or set `sources` in the config file");
    }
    Ok(config)
}

fn parse_params(raw: &[String]) -> anyhow::Result<Params> {
    let mut params = Params::new();
    for item in raw {
        let (key, value) = item
            .split_once('=')
            .with_context(|| format!("invalid parameter '{}', expected key=value", item))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}

fn returns_rows(sql: &str) -> bool {
    let first = sql
        .trim_start()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    matches!(first.as_str(), "select" | "with" | "show" | "values" | "explain" | "pragma")
}

fn explain(engine: &QueryEngine, entity: &str, query: &str) -> anyhow::Result<()> {
    let raw = engine
        .raw_template(entity, query)?
        .ok_or_else(|| LurryError::not_found(entity, query))?
        .to_string();
    let template = engine.template(entity, query)?;

    println!("{} {}", "Query:".dimmed(), QueryKey::new(entity, query).to_string().cyan().bold());
    println!("{} {}", "Template:".dimmed(), raw.yellow());
    println!();
    println!("{}", "Segments:".green().bold());
    for segment in template.segments() {
        match segment {
            Segment::Text(text) => println!("  {} {:?}", "text".dimmed(), text),
            Segment::Expr(expr) => println!("  {} {}", "expr".cyan(), expr.to_string().white()),
        }
    }
    println!();
    let uses = if template.uses_dialect() { "yes".yellow() } else { "no".green() };
    println!("{} {}", "Dialect-dependent:".dimmed(), uses);
    Ok(())
}

fn show_dialects() {
    println!(
        "{:10} {:10} {:14} {}",
        "Dialect".white().bold(),
        "Strategy".white().bold(),
        "O'Brien".white().bold(),
        "Products".white().bold()
    );
    println!("{}", "─".repeat(70).dimmed());

    for dialect in Dialect::ALL {
        let strategy = dialect.strategy();
        println!(
            "{:10} {:10} {:14} {}",
            dialect.name().cyan().bold(),
            strategy.name().yellow(),
            strategy.escape_str("O'Brien"),
            dialect.product_names().join(", ").dimmed()
        );
    }
}

fn format_output(results: &[RowMap], format: &OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        }
        OutputFormat::Table => {
            let mut columns: Vec<&String> = results[0].keys().collect();
            columns.sort();

            let widths: Vec<usize> = columns
                .iter()
                .map(|c| {
                    results
                        .iter()
                        .filter_map(|row| row.get(*c))
                        .map(|v| val_to_string(v).chars().count())
                        .fold(c.chars().count(), usize::max)
                })
                .collect();

            let header: Vec<String> = columns
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:width$}", c, width = w))
                .collect();
            println!("{}", header.join(" │ ").white().bold());

            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());

            for row in results {
                let cells: Vec<String> = columns
                    .iter()
                    .zip(&widths)
                    .map(|(c, w)| {
                        let val = row.get(*c).map(val_to_string).unwrap_or_default();
                        format!("{:width$}", val, width = w)
                    })
                    .collect();
                println!("{}", cells.join(" │ "));
            }

            println!();
            println!("{} row(s) returned", results.len().to_string().cyan());
        }
    }
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}
