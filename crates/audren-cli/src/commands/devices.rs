//! Output device listing command.

use super::common::{behavior_at, load_config, resolve_revision};
use audren_renderer::{DeviceName, list_device_names};
use clap::Args;
use std::path::Path;

/// Device name slots offered to the renderer.
const MAX_DEVICES: usize = 8;

#[derive(Args)]
pub struct DevicesArgs {
    /// Client revision (defaults to the config's)
    #[arg(short, long)]
    revision: Option<u32>,

    /// Print the names as a JSON array
    #[arg(long)]
    json: bool,
}

pub fn run(args: DevicesArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let revision = resolve_revision(args.revision, &config)?;

    let mut names = [DeviceName::default(); MAX_DEVICES];
    let count = list_device_names(&behavior_at(revision), &mut names);
    let names: Vec<&str> = names[..count].iter().map(DeviceName::as_str).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(());
    }

    println!("Output Devices (REV{})", revision.get());
    println!("=====================\n");
    for (idx, name) in names.iter().enumerate() {
        println!("  [{idx}] {name}");
    }
    Ok(())
}
