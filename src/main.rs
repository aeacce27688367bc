use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use log::{info, warn};
use std::path::{Path, PathBuf};
use toolgraph::persist::{self, LoadReport};
use toolgraph::{Config, ManagerSettings, ToolManager, killzone};

#[derive(Parser, Debug)]
#[command(name = "toolgraph")]
#[command(
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TOOLGRAPH_GIT_HASH"), ")"),
    about = "Input device and tool binding graph for VR frameworks"
)]
struct Cli {
    /// Configuration file (defaults to ~/.config/toolgraph/config.toml)
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Input graph file to load, overriding `bindings.file`
    #[arg(long, short = 'b', value_name = "FILE")]
    bindings: Option<PathBuf>,

    /// Write the resulting input graph to FILE
    #[arg(long, short = 's', value_name = "FILE")]
    save: Option<PathBuf>,

    /// Print the devices and tools on every graph level
    #[arg(long, short = 'l', action = ArgAction::SetTrue)]
    levels: bool,

    /// Write a documented default configuration file and exit
    #[arg(long, action = ArgAction::SetTrue)]
    init_config: bool,
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::get_config_path()?,
    };

    if cli.init_config {
        Config::create_default_file(&config_path)?;
        println!("Wrote default configuration to {}", config_path.display());
        return Ok(());
    }

    let config = Config::load_from(&config_path)?;
    let mut manager = ToolManager::default()
        .with_settings(ManagerSettings::from(&config.input))
        .with_kill_zone(killzone::from_config(&config.kill_zone));
    for device in &config.devices {
        manager.add_device(device.to_spec());
    }

    let bindings = cli.bindings.or_else(|| config.bindings.file.clone());
    if let Some(path) = &bindings {
        let report = persist::load_into_manager(&mut manager, path)?;
        print_report(path, &report);
    }

    if cli.levels {
        print_levels(&manager);
    }

    let save_path = cli
        .save
        .or_else(|| bindings.filter(|_| config.bindings.save_on_exit));
    if let Some(path) = save_path {
        persist::save_manager(&manager, &path)
            .with_context(|| format!("Could not save input graph to {}", path.display()))?;
        println!("Saved input graph to {}", path.display());
    }

    manager.clear();
    info!("Input graph released");
    Ok(())
}

fn print_report(path: &Path, report: &LoadReport) {
    println!(
        "Loaded {}: {} virtual devices, {} tools",
        path.display(),
        report.devices.len(),
        report.tools.len()
    );
    for problem in &report.skipped {
        warn!("{}", problem);
        println!("  skipped {}", problem);
    }
}

fn print_levels(manager: &ToolManager) {
    let graph = manager.graph();
    let devices = manager.devices();
    for level in 0..graph.num_levels() {
        println!("Level {level}");
        let names: Vec<&str> = graph
            .devices_at(level)
            .into_iter()
            .filter_map(|id| devices.get(id).map(|device| device.name()))
            .collect();
        println!("  devices: {}", names.join(", "));
        let tools: Vec<String> = graph
            .tools_at(level)
            .into_iter()
            .filter_map(|id| {
                manager
                    .tool(id)
                    .map(|tool| format!("{} ({})", tool.class_name(), id))
            })
            .collect();
        println!("  tools: {}", tools.join(", "));
    }
}
