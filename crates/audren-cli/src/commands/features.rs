//! Revision feature table command.

use super::common::{load_config, resolve_revision};
use audren_core::{Feature, Revision};
use clap::Args;
use serde::Serialize;
use std::path::Path;

#[derive(Args)]
pub struct FeaturesArgs {
    /// Client revision (defaults to the config's)
    #[arg(short, long)]
    revision: Option<u32>,

    /// Only list features the revision enables
    #[arg(long)]
    enabled: bool,

    /// Print the table as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FeatureRow {
    name: String,
    since: u32,
    enabled: bool,
}

fn rows(revision: Revision, only_enabled: bool) -> Vec<FeatureRow> {
    Feature::ALL
        .iter()
        .map(|&feature| FeatureRow {
            name: format!("{feature:?}"),
            since: feature.min_revision(),
            enabled: feature.is_supported_at(revision),
        })
        .filter(|row| row.enabled || !only_enabled)
        .collect()
}

pub fn run(args: FeaturesArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let revision = resolve_revision(args.revision, &config)?;
    let rows = rows(revision, args.enabled);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    println!("Features at REV{}", revision.get());
    println!("================\n");
    println!("  {:<width$}  Since  Enabled", "Feature");
    for row in &rows {
        println!(
            "  {:<width$}  {:>5}  {}",
            row.name,
            row.since,
            if row.enabled { "yes" } else { "-" }
        );
    }
    let enabled = rows.iter().filter(|r| r.enabled).count();
    println!("\n{enabled} of {} features enabled", Feature::ALL.len());
    Ok(())
}
