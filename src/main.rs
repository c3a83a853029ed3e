//! `textburn` CLI - serve the overlay API or render a single file

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use textburn::LayoutPreset;

mod cmd;

#[derive(Parser)]
#[command(name = "textburn")]
#[command(about = "Burn overlay text onto videos with ffmpeg drawtext")]
#[command(version)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Config file (default: <config dir>/textburn/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Listen address, overrides the config file
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Burn text onto a local video file
    Render {
        /// Source video
        input: PathBuf,

        /// Where to write the result
        output: PathBuf,

        /// Overlay text, embedded newlines start a new line
        #[arg(short, long)]
        text: String,

        /// Layout preset (default: from config)
        #[arg(short, long, value_enum)]
        layout: Option<LayoutArg>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Check ffmpeg, font and temp directory
    Check {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LayoutArg {
    BottomBanner,
    CenteredBoxed,
    TopBanner,
}

impl From<LayoutArg> for LayoutPreset {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::BottomBanner => Self::BottomBanner,
            LayoutArg::CenteredBoxed => Self::CenteredBoxed,
            LayoutArg::TopBanner => Self::TopBanner,
        }
    }
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Commands::Serve { config, bind } => {
            cmd::cmd_serve(config.as_deref(), bind).await?;
        }
        Commands::Render {
            input,
            output,
            text,
            layout,
            config,
        } => {
            let layout = layout.map(|l| LayoutPreset::from(l).name());
            cmd::cmd_render(&input, &output, &text, layout, config.as_deref()).await?;
        }
        Commands::Check { config } => {
            cmd::cmd_check(config.as_deref()).await?;
        }
    }

    Ok(())
}
