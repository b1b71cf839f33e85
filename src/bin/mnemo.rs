/// mnemo - command line front-end for the mnemograph memory graph.
///
/// Usage:
///   mnemo upsert --label Service --props '{"name":"Auth"}'   - Write an entity
///   mnemo query --id <id>                                    - Read current state
///   mnemo history --id <id>                                  - Version history
///   mnemo get-at --id <id> --at <timestamp>                  - Point-in-time read
///   mnemo sync --docs-dir docs/graph                         - Reconcile with docs
///   mnemo scan --target ./src                                - Ingest a codebase
///
/// The graph, schema, and storage location come from the configuration
/// file (default: mnemo.yaml).
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::str::FromStr;

use mnemograph::config::MnemoConfig;
use mnemograph::prelude::*;
use mnemograph::scan::RemoteOptions;
use mnemograph::{GraphError, PropMap};

/// mnemograph - schema-enforced bitemporal memory graph
#[derive(Parser)]
#[command(name = "mnemo")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "mnemo.yaml")]
    config: PathBuf,

    /// Actor recorded in the audit log
    #[arg(short, long, global = true, default_value = "cli")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update an entity
    Upsert {
        #[arg(long)]
        label: String,
        /// Entity id; omitted means a fresh one is generated
        #[arg(long)]
        id: Option<String>,
        /// Properties as a JSON object
        #[arg(long)]
        props: String,
    },
    /// Soft-delete an entity
    Delete {
        #[arg(long)]
        id: String,
    },
    /// Create a typed relationship
    Relate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long = "type")]
        rel_type: String,
        #[arg(long)]
        from_label: String,
        #[arg(long)]
        to_label: String,
        /// Edge properties as a JSON object
        #[arg(long)]
        props: Option<String>,
    },
    /// Close the active relationship of a type between two entities
    Unrelate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        #[arg(long = "type")]
        rel_type: String,
    },
    /// Read one entity, or list a label
    Query {
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        label: Option<String>,
    },
    /// Filter current-head states of a label
    Search {
        #[arg(long)]
        label: String,
        /// Repeated filters: property:op:value (op: eq, contains, gt, lt, gte, lte, in)
        #[arg(long = "filter")]
        filters: Vec<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long, default_value_t = false)]
        descending: bool,
    },
    /// Point-in-time read
    GetAt {
        #[arg(long)]
        id: String,
        /// RFC 3339 timestamp
        #[arg(long)]
        at: String,
    },
    /// Version history, newest first
    History {
        #[arg(long)]
        id: String,
    },
    /// Ascending pairwise diffs between versions
    Changelog {
        #[arg(long)]
        id: String,
    },
    /// Property deltas between two versions
    Diff {
        #[arg(long)]
        id: String,
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
    },
    /// Full graph snapshot at a timestamp
    Snapshot {
        #[arg(long)]
        at: String,
        #[arg(long)]
        labels: Vec<String>,
    },
    /// Entities with audit activity after a timestamp
    ChangesSince {
        #[arg(long)]
        since: String,
        #[arg(long)]
        labels: Vec<String>,
        #[arg(long)]
        actors: Vec<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Reconcile the graph with the document tree
    Sync {
        /// Override the configured docs directory
        #[arg(long)]
        docs_dir: Option<PathBuf>,
        /// Override the configured strategy (graph-wins, docs-wins, merge, fail)
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long)]
        labels: Vec<String>,
    },
    /// Validate properties against a label without writing
    Validate {
        #[arg(long)]
        label: String,
        #[arg(long)]
        props: String,
    },
    /// Scan a codebase into the graph
    Scan {
        /// Local path or remote repository URL
        #[arg(long)]
        target: String,
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Dump the compiled schema
    Schema,
    /// Audit log of one entity
    Audit {
        #[arg(long)]
        id: String,
    },
}

fn parse_props(raw: &str) -> Result<PropMap> {
    let value: JsonValue = serde_json::from_str(raw).context("properties must be JSON")?;
    value
        .as_object()
        .cloned()
        .context("properties must be a JSON object")
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .with_context(|| format!("'{raw}' is not an RFC 3339 timestamp"))
}

fn parse_filter(raw: &str) -> Result<SearchFilter> {
    let mut parts = raw.splitn(3, ':');
    let (Some(property), Some(op), Some(value)) = (parts.next(), parts.next(), parts.next())
    else {
        anyhow::bail!("filter '{raw}' is not property:op:value");
    };
    let op = match op {
        "eq" => FilterOp::Eq,
        "contains" => FilterOp::Contains,
        "gt" => FilterOp::Gt,
        "lt" => FilterOp::Lt,
        "gte" => FilterOp::Gte,
        "lte" => FilterOp::Lte,
        "in" => FilterOp::In,
        other => anyhow::bail!("unknown filter op '{other}'"),
    };
    // Values parse as JSON when they can, strings otherwise.
    let value = serde_json::from_str(value).unwrap_or(JsonValue::String(value.to_string()));
    Ok(SearchFilter::new(property, op, value))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn opt_slice(v: &[String]) -> Option<&[String]> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

#[tokio::main]
async fn main() {
    mnemograph::init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = MnemoConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let graph = Mnemograph::from_config(&config).await?;
    let actor = &cli.actor;

    match cli.command {
        Commands::Upsert { label, id, props } => {
            let props = parse_props(&props)?;
            let result = graph
                .pipeline()
                .upsert(&label, id.as_deref(), &props, actor)
                .await?;
            let verb = if result.created { "created" } else { "updated" };
            println!(
                "{} {} {} at v{}",
                "ok:".green().bold(),
                verb,
                result.id.cyan(),
                result.version
            );
        }
        Commands::Delete { id } => {
            graph.pipeline().delete(&id, actor).await?;
            println!("{} deleted {}", "ok:".green().bold(), id.cyan());
        }
        Commands::Relate {
            from,
            to,
            rel_type,
            from_label,
            to_label,
            props,
        } => {
            let props = props.map(|p| parse_props(&p)).transpose()?;
            graph
                .pipeline()
                .relate(&from, &to, &rel_type, &from_label, &to_label, props.as_ref(), actor)
                .await?;
            println!(
                "{} {} -[{}]-> {}",
                "ok:".green().bold(),
                from.cyan(),
                rel_type,
                to.cyan()
            );
        }
        Commands::Unrelate { from, to, rel_type } => {
            graph.pipeline().unrelate(&from, &to, &rel_type, actor).await?;
            println!("{} closed {} -[{}]-> {}", "ok:".green().bold(), from, rel_type, to);
        }
        Commands::Query { id, label } => match (id, label) {
            (Some(id), _) => match graph.reader().get_current(&id).await? {
                Some((entity, state)) => print_json(&serde_json::json!({
                    "entity": entity,
                    "state": state,
                }))?,
                None => println!("{}", "null".dimmed()),
            },
            (None, Some(label)) => {
                let entities = graph.reader().query_by_label(&label).await?;
                print_json(&entities)?;
            }
            (None, None) => anyhow::bail!("query needs --id or --label"),
        },
        Commands::Search {
            label,
            filters,
            limit,
            order_by,
            descending,
        } => {
            let filters: Vec<SearchFilter> = filters
                .iter()
                .map(|f| parse_filter(f))
                .collect::<Result<_>>()?;
            let order = order_by.map(|property| OrderBy {
                property,
                descending,
            });
            let hits = graph
                .reader()
                .search(&label, &filters, limit, order.as_ref())
                .await?;
            print_json(&hits)?;
        }
        Commands::GetAt { id, at } => {
            let t = parse_timestamp(&at)?;
            match graph.reader().get_at_time(&id, t).await? {
                Some((entity, state)) => print_json(&serde_json::json!({
                    "entity": entity,
                    "state": state,
                }))?,
                None => println!("{}", "null".dimmed()),
            }
        }
        Commands::History { id } => {
            let history = graph.reader().history(&id).await?;
            print_json(&history)?;
        }
        Commands::Changelog { id } => {
            let log = graph.reader().changelog(&id).await?;
            print_json(&log)?;
        }
        Commands::Diff { id, from, to } => {
            let diff = graph.reader().diff(&id, from, to).await?;
            print_json(&diff)?;
        }
        Commands::Snapshot { at, labels } => {
            let t = parse_timestamp(&at)?;
            let snapshot = graph.reader().snapshot_at(t, opt_slice(&labels)).await?;
            print_json(&snapshot)?;
        }
        Commands::ChangesSince {
            since,
            labels,
            actors,
            limit,
        } => {
            let t = parse_timestamp(&since)?;
            let changes = graph
                .reader()
                .changes_since(t, opt_slice(&labels), opt_slice(&actors), limit)
                .await?;
            print_json(&changes)?;
        }
        Commands::Sync {
            docs_dir,
            strategy,
            labels,
        } => {
            let docs_dir = docs_dir.unwrap_or_else(|| config.docs.output_dir.clone());
            let strategy = match strategy {
                Some(s) => ConflictStrategy::from_str(&s)?,
                None => config.sync.conflict_strategy,
            };
            let result = graph
                .sync(
                    &docs_dir,
                    config.docs.adapter_name(),
                    strategy,
                    actor,
                    opt_slice(&labels),
                )
                .await?;
            println!(
                "{} created {}, updated {}, deleted {}, unchanged {}, conflicts {}",
                "sync:".green().bold(),
                result.created,
                result.updated,
                result.deleted,
                result.unchanged,
                result.conflicts.len()
            );
            for conflict in &result.conflicts {
                println!(
                    "  {} {} ({}) resolved {}",
                    "conflict:".yellow(),
                    conflict.entity_id,
                    conflict.label,
                    conflict.resolution
                );
            }
            for error in &result.errors {
                println!("  {} {}: {}", "error:".red(), error.entity_id, error.message);
            }
        }
        Commands::Validate { label, props } => {
            let props = parse_props(&props)?;
            match graph.registry().node_validator(&label)?.validate(&props) {
                Ok(normalized) => {
                    println!("{} {label} accepts the properties", "ok:".green().bold());
                    print_json(&JsonValue::Object(normalized))?;
                }
                Err(e @ GraphError::Validation { .. }) => {
                    // Explicit validate failures are the one case the exit
                    // code contract calls out.
                    eprintln!("{} {e}", "invalid:".red().bold());
                    std::process::exit(1);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Scan {
            target,
            dry_run,
            branch,
        } => {
            let mut options = config.scan.to_options(dry_run);
            if let Some(branch) = branch {
                options.remote = RemoteOptions {
                    branch: Some(branch),
                    ..options.remote
                };
            }
            let result = graph.scan(&target, &options, actor).await?;
            println!(
                "{} discovered {}, parsed {}, upserted {}, skipped {}, unmapped {}, relationships {}{}",
                "scan:".green().bold(),
                result.files_discovered,
                result.files_parsed,
                result.entities_upserted,
                result.entities_skipped,
                result.entities_unmapped,
                result.relationships_created,
                if result.dry_run { " (dry run)" } else { "" }
            );
            for error in &result.errors {
                println!("  {} {}", "error:".red(), error);
            }
        }
        Commands::Schema => {
            print_json(graph.registry().schema())?;
        }
        Commands::Audit { id } => {
            let entries = graph.reader().audit(&id).await?;
            print_json(&entries)?;
        }
    }
    Ok(())
}
