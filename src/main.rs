use dream_engine::cli::Args;
use dream_engine::config::{self, EngineConfig, PathConfig};
use dream_engine::core::executor;
use dream_engine::core::{HeadlessHost, RenderEngine, RenderStatus};
use dream_engine::entities::{NodeTree, SceneSnapshot};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::path::Path;
use std::process::ExitCode;

fn init_logger(args: &Args, path_config: &PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .clone()
            .unwrap_or_else(|| config::data_file(config::LOG_FILE, path_config));
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn load_scene(path: Option<&Path>) -> Result<SceneSnapshot> {
    let Some(path) = path else {
        debug!("No scene given, using defaults");
        return Ok(SceneSnapshot::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read scene: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse scene: {}", path.display()))
}

fn run(args: Args) -> Result<ExitCode> {
    let path_config = PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logger(&args, &path_config)?;
    debug!("Command-line args: {:?}", args);

    let config_path = config::config_file(config::CONFIG_FILE, &path_config);
    info!("Config path: {}", config_path.display());
    let engine_config = EngineConfig::load(&config_path)?;

    let tree = NodeTree::load(&args.tree).with_context(|| format!("Failed to load tree: {}", args.tree.display()))?;
    let mut scene = load_scene(args.scene.as_deref())?;
    if args.width.is_some() || args.height.is_some() {
        let (w, h) = scene.resolution();
        scene = scene.with_resolution(args.width.unwrap_or(w), args.height.unwrap_or(h));
    }

    if args.plan {
        let plan = executor::plan(&tree)?;
        for (i, id) in plan.order.iter().enumerate() {
            if let Some(node) = tree.node(*id) {
                let marker = if *id == plan.output { " (output)" } else { "" };
                println!("{:>3}  {:<20} {}{}", i, node.type_name(), node.name, marker);
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut engine = RenderEngine::from_config(&engine_config);
    let mut host = HeadlessHost::new();
    if let Some(dir) = args.preview_dir.as_ref().or(engine_config.output.preview_dir.as_ref()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create preview directory: {}", dir.display()))?;
        host = host.with_preview_dir(dir);
    }

    let status = engine.render(&mut host, &tree, &scene)?;
    match status {
        RenderStatus::Finished => {
            let output = args.output.unwrap_or(engine_config.output.path);
            host.save_result(&output)
                .with_context(|| format!("Failed to save {}", output.display()))?;
            println!("{}", output.display());
            Ok(ExitCode::SUCCESS)
        }
        RenderStatus::Cancelled => {
            warn!("Render cancelled");
            Ok(ExitCode::from(2))
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
