use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::time::Duration;

use aipixel::aggregation::AggregationEngine;
use aipixel::classifier::known_agents;
use aipixel::config::Config;
use aipixel::error::{bounded, PipelineError};
use aipixel::models::{Granularity, Plan, Tenant};
use aipixel::storage;

#[derive(Parser)]
#[command(name = "aipixel-admin")]
#[command(about = "AI Pixel tenant and aggregation management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a tenant
    TenantCreate {
        /// Tracking id producers will send
        tracking_id: String,
        /// Display name
        name: String,
        /// free, pro or enterprise
        #[arg(long, default_value = "free")]
        plan: String,
        /// Site domain
        #[arg(long)]
        domain: Option<String>,
        /// Monthly event ceiling (default: the plan's)
        #[arg(long)]
        events_per_month: Option<i64>,
        /// Create the tenant deactivated
        #[arg(long)]
        inactive: bool,
    },
    /// List all tenants with their usage
    Tenants,
    /// Recompute stats for a window, e.g. to backfill after late events
    Aggregate {
        tracking_id: String,
        /// hourly, daily, weekly or monthly
        #[arg(long, default_value = "daily")]
        granularity: String,
        /// RFC 3339 window start
        #[arg(long)]
        from: DateTime<Utc>,
        /// RFC 3339 window end (default: now)
        #[arg(long)]
        to: Option<DateTime<Utc>>,
    },
    /// List the known AI agent signatures in match order
    Agents,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Commands::Agents = cli.command {
        println!("{:<24} {}", "Signature", "Label");
        println!("{}", "-".repeat(50));
        for (signature, label) in known_agents() {
            println!("{:<24} {}", signature, label);
        }
        return Ok(());
    }

    let config = Config::from_env()?;
    let stores = storage::connect(&config.database).await?;
    let timeout = Duration::from_millis(config.ingestion.storage_timeout_ms);

    match cli.command {
        Commands::TenantCreate {
            tracking_id,
            name,
            plan,
            domain,
            events_per_month,
            inactive,
        } => {
            let plan: Plan = plan.parse()?;
            let mut tenant = Tenant::new(&tracking_id, &name, plan, Utc::now());
            tenant.domain = domain;
            tenant.is_active = !inactive;
            if let Some(limit) = events_per_month {
                if limit < 0 {
                    bail!("--events-per-month must not be negative");
                }
                tenant.events_per_month = limit;
            }

            bounded(timeout, stores.scope.upsert_tenant(&tenant)).await?;
            println!(
                "✓ Saved tenant '{}' ({} plan, {} events/month)",
                tenant.tracking_id, tenant.plan, tenant.events_per_month
            );
        }
        Commands::Tenants => {
            let tenants = bounded(timeout, stores.scope.list_tenants()).await?;
            if tenants.is_empty() {
                println!("No tenants found.");
            } else {
                println!(
                    "{:<24} {:<24} {:<12} {:>12} {:>12} {}",
                    "Tracking ID", "Name", "Plan", "Used", "Limit", "Active"
                );
                println!("{}", "-".repeat(96));
                for t in tenants {
                    println!(
                        "{:<24} {:<24} {:<12} {:>12} {:>12} {}",
                        t.tracking_id, t.name, t.plan, t.events_this_month, t.events_per_month, t.is_active
                    );
                }
            }
        }
        Commands::Aggregate {
            tracking_id,
            granularity,
            from,
            to,
        } => {
            let granularity: Granularity = granularity.parse()?;
            let to = to.unwrap_or_else(Utc::now);
            let engine = AggregationEngine::new(&stores, &config.aggregation);

            match engine.aggregate(&tracking_id, from, to, granularity).await {
                Ok(records) => {
                    println!("✓ Aggregated {} {} bucket(s)", records.len(), granularity);
                    for r in records {
                        println!(
                            "  {}  events={} page_views={} ai_bots={} sessions={}",
                            r.period_start.to_rfc3339(),
                            r.total_events,
                            r.page_views,
                            r.ai_bots_detected,
                            r.unique_sessions
                        );
                    }
                }
                Err(PipelineError::AggregationPartial {
                    completed,
                    resume_from,
                    cause,
                }) => {
                    bail!(
                        "aggregation stopped after {} bucket(s): {}. Re-run with --from {}",
                        completed,
                        cause,
                        resume_from.to_rfc3339()
                    );
                }
                Err(e) => return Err(e).context("aggregation failed"),
            }
        }
        Commands::Agents => {}
    }

    Ok(())
}
