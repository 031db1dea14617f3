// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{crate_version, Parser, Subcommand};
use soundboard::channels::ChannelManager;
use soundboard::config::{self, Board, Preload};
use soundboard::{audio, session};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A single-playback soundboard."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Writes the default board to the given path.
    Init {
        /// Where to write the board.
        path: PathBuf,
    },
    /// Lists and verifies the samples on a board.
    Samples {
        /// The path to the board file.
        board: PathBuf,
    },
    /// Plays a single sample and waits for it to finish.
    Play {
        /// The path to the board file.
        board: PathBuf,
        /// The id of the sample to play.
        id: String,
    },
    /// Starts an interactive session.
    Start {
        /// The path to the board file.
        board: PathBuf,
    },
}

/// Loads the board and builds a channel manager for it.
fn load(path: &Path) -> Result<(Board, ChannelManager), Box<dyn Error>> {
    let board = Board::deserialize(path)?;
    let registry = Arc::new(board.registry()?);
    let device = audio::get_device(board.audio())?;
    info!(device = %device, "Using audio device.");

    let mut manager = ChannelManager::new(registry, device);
    if board.audio().preload() == Preload::Eager {
        manager.preload_all();
    }
    Ok((board, manager))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Init { path } => {
            if path.exists() {
                return Err(format!("{} already exists", path.display()).into());
            }
            config::default_board().save(&path)?;
            println!("Wrote {}.", path.display());
        }
        Commands::Samples { board } => {
            let board = Board::deserialize(&board)?;
            let registry = board.registry()?;

            println!("{} (samples: {}):", board.title(), registry.len());
            for sample in registry.all() {
                let status = if PathBuf::from(sample.source()).is_file() {
                    ""
                } else {
                    " [missing]"
                };
                println!("- {}{}", sample, status);
            }
        }
        Commands::Play { board, id } => {
            let (_board, mut manager) = load(&board)?;
            session::play_once(&mut manager, &id)?;
        }
        Commands::Start { board } => {
            let (board, manager) = load(&board)?;
            session::Session::new(board.title(), board.tagline(), manager, io::stdout())
                .run(session::stdin_lines())?;
        }
    }

    Ok(())
}
