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
//! The terminal front end: renders the board's tiles, turns typed input into
//! play requests and follows the active set to show what's playing.

use std::error::Error;
use std::io::{self, BufRead, Write};
use std::thread;

use crossbeam_channel::{select, Receiver};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::channels::{ActiveSet, ChannelError, ChannelManager, PlayOutcome};
use crate::registry::Registry;

/// A line of user input, interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Play the sample with the given id.
    Play(String),
    /// Stop whatever is playing.
    Stop,
    /// Show the board again.
    Help,
    Quit,
    /// Blank input.
    Nothing,
}

impl Command {
    /// Parses a line of input. Tile numbers are 1-based positions in the
    /// registry; anything else that isn't a keyword is taken as a sample id.
    pub fn parse(line: &str, registry: &Registry) -> Result<Command, String> {
        let line = line.trim();
        match line {
            "" => return Ok(Command::Nothing),
            "q" | "quit" | "exit" => return Ok(Command::Quit),
            "s" | "stop" => return Ok(Command::Stop),
            "?" | "h" | "help" => return Ok(Command::Help),
            _ => {}
        }

        if let Ok(number) = line.parse::<usize>() {
            return match number.checked_sub(1).and_then(|i| registry.all().get(i)) {
                Some(sample) => Ok(Command::Play(sample.id().to_string())),
                None => Err(format!(
                    "no tile {}, pick 1 to {}",
                    number,
                    registry.len()
                )),
            };
        }

        Ok(Command::Play(line.to_string()))
    }
}

/// Renders the tiles, marking the active ones.
pub fn render_board(
    title: &str,
    tagline: Option<&str>,
    registry: &Registry,
    active: &ActiveSet,
) -> String {
    let mut out = format!("{}\n", title);
    if let Some(tagline) = tagline {
        out.push_str(tagline);
        out.push('\n');
    }
    out.push('\n');

    let width = registry.len().to_string().len();
    for (i, sample) in registry.all().iter().enumerate() {
        let marker = if active.contains(sample.id()) { '*' } else { ' ' };
        out.push_str(&format!(
            "{} [{:>width$}] {} ({})\n",
            marker,
            i + 1,
            sample.label(),
            sample.id(),
            width = width
        ));
    }
    out.push_str("\nType a tile number or id to play it, s to stop, q to quit.\n");
    out
}

/// Describes the active set for the status line.
fn describe(registry: &Registry, active: &ActiveSet) -> String {
    let labels: Vec<&str> = active
        .iter()
        .map(|id| registry.by_id(id).map(|s| s.label()).unwrap_or(id))
        .collect();
    if labels.is_empty() {
        "Nothing playing.".to_string()
    } else {
        format!("Now playing: {}", labels.join(", "))
    }
}

/// Reads stdin on a background thread and forwards each line.
pub fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
        debug!("Input closed.");
    });
    rx
}

/// An interactive session over a channel manager.
pub struct Session<W: Write> {
    title: String,
    tagline: Option<String>,
    manager: ChannelManager,
    active: watch::Receiver<ActiveSet>,
    reports: broadcast::Receiver<ChannelError>,
    out: W,
}

impl<W: Write> Session<W> {
    pub fn new(title: &str, tagline: Option<&str>, manager: ChannelManager, out: W) -> Session<W> {
        let active = manager.subscribe();
        let reports = manager.subscribe_reports();
        Session {
            title: title.to_string(),
            tagline: tagline.map(str::to_string),
            manager,
            active,
            reports,
            out,
        }
    }

    /// Runs until the user quits or the input closes. Everything is stopped
    /// before returning.
    pub fn run(&mut self, input: Receiver<String>) -> Result<(), Box<dyn Error>> {
        self.show_board()?;
        let events = self.manager.events().clone();

        loop {
            let mut quit = false;
            select! {
                recv(input) -> line => match line {
                    Ok(line) => quit = self.handle(&line)?,
                    Err(_) => quit = true,
                },
                recv(events) -> event => {
                    if let Ok(event) = event {
                        self.manager.apply(event);
                    }
                }
            }

            if quit {
                self.manager.stop_all();
            }
            self.show_changes()?;
            if quit {
                break;
            }
        }

        info!("Session ended.");
        Ok(())
    }

    /// Handles one line of input. Returns true if the session should end.
    fn handle(&mut self, line: &str) -> Result<bool, Box<dyn Error>> {
        match Command::parse(line, self.manager.registry()) {
            Ok(Command::Play(id)) => match self.manager.play(&id) {
                Ok(PlayOutcome::Started) => {}
                // Start failures arrive as reports.
                Ok(PlayOutcome::StartFailed(_)) => {}
                Err(e) => writeln!(self.out, "! {}", e)?,
            },
            Ok(Command::Stop) => self.manager.stop_all(),
            Ok(Command::Help) => self.show_board()?,
            Ok(Command::Quit) => return Ok(true),
            Ok(Command::Nothing) => {}
            Err(e) => writeln!(self.out, "! {}", e)?,
        }
        Ok(false)
    }

    fn show_board(&mut self) -> Result<(), Box<dyn Error>> {
        let active = self.active.borrow_and_update().clone();
        let board = render_board(
            &self.title,
            self.tagline.as_deref(),
            self.manager.registry(),
            &active,
        );
        write!(self.out, "{}", board)?;
        self.out.flush()?;
        Ok(())
    }

    /// Prints reports and the new status line if the active set changed.
    fn show_changes(&mut self) -> Result<(), Box<dyn Error>> {
        loop {
            match self.reports.try_recv() {
                Ok(report) => writeln!(self.out, "! {}", report)?,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    writeln!(self.out, "! {} more problems not shown", missed)?
                }
                Err(_) => break,
            }
        }

        if self.active.has_changed().unwrap_or(false) {
            let active = self.active.borrow_and_update().clone();
            writeln!(self.out, "{}", describe(self.manager.registry(), &active))?;
        }
        self.out.flush()?;
        Ok(())
    }
}

/// Plays a single sample and blocks until it ends. Faults reported while it
/// plays are logged by the manager and don't end the wait.
pub fn play_once(manager: &mut ChannelManager, id: &str) -> Result<(), Box<dyn Error>> {
    if let PlayOutcome::StartFailed(e) = manager.play(id)? {
        return Err(e.into());
    }

    while !manager.active().is_empty() {
        let event = manager.events().recv()?;
        manager.apply(event);
    }

    info!(sample = id, "Playback finished.");
    Ok(())
}
