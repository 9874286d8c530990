use clap::Parser;
use std::path::PathBuf;

// Build version with backend info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Backends: ", crate::core::backend::PROCEDURAL, "\n",
    "Target:   ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless renderer for dream node trees
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Node tree to render (JSON)
    #[arg(short = 't', long = "tree", value_name = "TREE")]
    pub tree: PathBuf,

    /// Scene snapshot (JSON); defaults to an empty 512x512 scene
    #[arg(short = 's', long = "scene", value_name = "SCENE")]
    pub scene: Option<PathBuf>,

    /// Output PNG (default: from config, else render.png)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write progressive previews to this directory
    #[arg(long = "preview-dir", value_name = "DIR")]
    pub preview_dir: Option<PathBuf>,

    /// Override render width
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<usize>,

    /// Override render height
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<usize>,

    /// Print the execution order and exit without rendering
    #[arg(long = "plan")]
    pub plan: bool,

    /// Enable debug logging to file (default: dream_engine.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
