//! CLI Module
//!
//! Command-line interface for the streamout output engine.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// streamout - chunked audio output engine
#[derive(Parser, Debug)]
#[command(name = "streamout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Stream configuration file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Negotiate a stream and print what was selected
    #[command(name = "probe")]
    Probe {
        /// Offer a primary buffer of this many bytes
        #[arg(long)]
        primary_capacity: Option<u32>,
    },

    /// Stream a PCM WAV file through the engine
    #[command(name = "play")]
    Play {
        /// 8-bit or 16-bit integer PCM WAV file
        input: PathBuf,

        /// Pace playback with the wall clock instead of simulated time
        #[arg(long)]
        realtime: bool,

        /// Offer a primary buffer of this many bytes
        #[arg(long)]
        primary_capacity: Option<u32>,
    },

    /// Write the default configuration
    #[command(name = "init-config")]
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}
