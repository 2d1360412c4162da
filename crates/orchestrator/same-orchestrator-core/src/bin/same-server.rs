use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use same_orchestrator::{RetargetContext, RetargetServer, ServerConfig};

#[derive(Parser, Debug)]
#[clap(name = "same-server")]
#[clap(
    about = "Retargets BVH motions onto target skeletons, one request per TCP connection.",
    version
)]
struct Args {
    /// TOML config file; built-in defaults when omitted
    #[clap(long)]
    config: Option<PathBuf>,
    /// The address to listen on
    #[clap(long)]
    listen: Option<String>,
    /// Frames kept from each source motion
    #[clap(long)]
    max_frames: Option<usize>,
    /// Directory retargeted motions are written to
    #[clap(long)]
    output_dir: Option<PathBuf>,
    #[clap(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen_addr = listen;
    }
    if let Some(max_frames) = args.max_frames {
        config.max_frames = max_frames;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;

    simple_logger::init_with_level(config.log_level()?)?;

    let context = RetargetContext::from_config(config)?;
    RetargetServer::new(context).run().await
}
