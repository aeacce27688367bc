//! Prints the JSON schema of `config.toml`, or writes it to the path given
//! as the only argument.

use anyhow::{Context, Result};
use std::path::PathBuf;

fn main() -> Result<()> {
    let schema = toolgraph::Config::json_schema();
    let text = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;

    match std::env::args_os().nth(1).map(PathBuf::from) {
        Some(path) => std::fs::write(&path, format!("{text}\n"))
            .with_context(|| format!("Failed to write schema to {}", path.display()))?,
        None => println!("{text}"),
    }
    Ok(())
}
