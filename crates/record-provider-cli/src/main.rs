//! recordctl - command-line access to one document collection
//!
//! Binds an untyped record shape to `--database` / `--collection` and
//! exposes every provider operation as a subcommand.
//!
//! ## Commands
//!
//! - `list`: page through documents
//! - `get`: fetch one document
//! - `find`: list documents matching query expressions
//! - `create` / `update` / `remove`: write operations
//! - `watch`: print realtime events until interrupted

mod telemetry;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use record_provider::{events, Client, Document, Provider, Query, Record};
use serde_json::{Map, Value};
use tracing::info;

type Fields = Map<String, Value>;
type Untyped = Record<Fields>;

#[derive(Parser)]
#[command(name = "recordctl")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Read, write and watch documents in one collection", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Database id
    #[arg(long, env = "APPWRITE_DATABASE", global = true)]
    database: Option<String>,

    /// Collection id
    #[arg(long, env = "APPWRITE_COLLECTION", global = true)]
    collection: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a page of documents
    List {
        /// Number of documents to skip
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Number of documents to return
        #[arg(short, long, default_value = "25")]
        limit: u64,
    },

    /// Fetch one document by id
    Get { id: String },

    /// List documents matching query expressions
    Find {
        /// Raw query expression (JSON), may be repeated
        #[arg(short, long = "query")]
        queries: Vec<String>,

        /// Equality filter as attribute=value, may be repeated
        #[arg(short = 'w', long = "where")]
        equals: Vec<String>,
    },

    /// Create a document from a JSON object
    Create {
        /// Document fields as a JSON object
        #[arg(short, long)]
        data: String,

        /// Document id (generated by the server if omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Update a document with the fields of a JSON object
    Update {
        id: String,

        /// Fields to update as a JSON object
        #[arg(short, long)]
        data: String,
    },

    /// Delete a document
    Remove { id: String },

    /// Print realtime events for the collection until Ctrl-C
    Watch {
        /// Channel pattern; $DB_ID and $COLLECTION_ID are substituted
        #[arg(short, long, default_value = events::DOCUMENTS)]
        pattern: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    telemetry::init(cli.json, cli.verbose);

    let database = cli
        .database
        .context("No database id given (use --database or APPWRITE_DATABASE)")?;
    let collection = cli
        .collection
        .context("No collection id given (use --collection or APPWRITE_COLLECTION)")?;

    let client = Client::from_env().context("Failed to configure database client")?;
    let provider: Provider<Untyped> = Provider::new(Arc::new(client), database, collection);

    match cli.command {
        Commands::List { offset, limit } => {
            let records = provider.list(offset, limit).await?;
            print_records(&records)
        }
        Commands::Get { id } => {
            let record = provider
                .get(&id)
                .await
                .with_context(|| format!("Failed to get document {id}"))?;
            print_json(&render(&record))
        }
        Commands::Find { queries, equals } => {
            let mut all = queries;
            for clause in &equals {
                all.push(where_query(clause)?);
            }
            let records = provider.find(&all).await?;
            print_records(&records)
        }
        Commands::Create { data, id } => {
            let fields = parse_object(&data)?;
            let record = match id {
                Some(id) => Record::with_id(id, fields),
                None => Record::new(fields),
            };
            let created = provider.create(&record).await?;
            info!(id = created.id().unwrap_or_default(), "Document created");
            print_json(&render(&created))
        }
        Commands::Update { id, data } => {
            let record = Record::with_id(id, parse_object(&data)?);
            let updated = provider.update(&record, &[]).await?;
            print_json(&render(&updated))
        }
        Commands::Remove { id } => {
            provider
                .remove(id.as_str())
                .await
                .with_context(|| format!("Failed to delete document {id}"))?;
            info!(id = %id, "Document deleted");
            Ok(())
        }
        Commands::Watch { pattern } => {
            let subscription = provider
                .subscribe(&pattern, |event| match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
                })
                .await?;
            info!(channels = ?subscription.channels(), "Watching; press Ctrl-C to stop");

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            subscription.unsubscribe();
            Ok(())
        }
    }
}

/// Parse a `--data` argument, which must be a JSON object.
fn parse_object(raw: &str) -> Result<Fields> {
    match serde_json::from_str::<Value>(raw).context("--data is not valid JSON")? {
        Value::Object(fields) => Ok(fields),
        _ => bail!("--data must be a JSON object"),
    }
}

/// Turn `attribute=value` into an equality query.
///
/// The value is read as JSON when possible (`likes=3`, `done=true`) and as a
/// plain string otherwise.
fn where_query(clause: &str) -> Result<String> {
    let Some((attribute, raw)) = clause.split_once('=') else {
        bail!("--where expects attribute=value, got '{clause}'");
    };
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::from(raw));
    Ok(Query::equal(attribute.trim(), value).into())
}

/// Record as printed: metadata under `id` / `createdAt` / `updatedAt`, then
/// the document fields.
fn render(record: &Untyped) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), Value::from(record.id()));
    out.insert(
        "createdAt".to_string(),
        Value::from(record.created_at().map(|t| t.to_rfc3339())),
    );
    out.insert(
        "updatedAt".to_string(),
        Value::from(record.updated_at().map(|t| t.to_rfc3339())),
    );
    out.extend(record.data.clone());
    Value::Object(out)
}

fn print_records(records: &[Untyped]) -> Result<()> {
    let rendered: Vec<Value> = records.iter().map(render).collect();
    print_json(&Value::Array(rendered))
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
