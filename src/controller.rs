// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Interactive command loop
//!
//! Owns the active [`WatchConfig`] and the running watch loop. Every change
//! of folder or prefix builds a new configuration, saves it and restarts the
//! watch loop with it.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::{validate_directory, Preferences, WatchConfig, WatcherSettings};
use crate::scanner;
use crate::service::{self, WatchHandle};
use crate::{Result, SeqRenameError};

/// Where the controller is in its life cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// No usable folder yet
    Idle,
    Watching,
    MenuOpen,
    Stopped,
}

/// A command typed while watching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Menu,
    Quit,
    Status,
    Help,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "" => Command::Empty,
            "menu" | "m" => Command::Menu,
            "quit" | "q" | "exit" | "stop" => Command::Quit,
            "status" | "s" => Command::Status,
            "help" | "h" | "?" => Command::Help,
            other => Command::Unknown(other.to_string()),
        }
    }
}

/// An entry of the service menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Status,
    ChangeFolder,
    ChangePrefix,
    Reorganize,
    Resume,
    Stop,
    Invalid,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "1" | "status" => MenuChoice::Status,
            "2" | "folder" => MenuChoice::ChangeFolder,
            "3" | "prefix" => MenuChoice::ChangePrefix,
            "4" | "reorganize" => MenuChoice::Reorganize,
            "5" | "resume" | "r" | "" => MenuChoice::Resume,
            "6" | "quit" | "q" | "stop" => MenuChoice::Stop,
            _ => MenuChoice::Invalid,
        }
    }
}

/// Words that cancel a prompt
fn is_cancel(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "q" | "quit" | "cancel")
}

/// One read from the user
#[derive(Debug)]
enum Input {
    Line(String),
    /// Input closed
    Eof,
    /// Ctrl+C or SIGTERM
    Shutdown,
}

/// Session settings that are not written back to the preferences file
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub reorganize_on_start: bool,
    pub watcher: WatcherSettings,
    /// Prefix from the command line. Wins over the one saved for a folder
    /// until the user picks a prefix from the menu.
    pub prefix_override: Option<String>,
}

impl ControllerOptions {
    pub fn from_preferences(prefs: &Preferences) -> Self {
        Self {
            reorganize_on_start: prefs.reorganize_on_start,
            watcher: prefs.watcher.clone(),
            prefix_override: None,
        }
    }
}

/// Read stdin lines on a dedicated thread so a pending read never holds
/// the runtime open at exit.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

pub struct Controller<W: Write> {
    prefs: Preferences,
    prefs_path: PathBuf,
    options: ControllerOptions,
    config: Option<WatchConfig>,
    watch: Option<WatchHandle>,
    state: ControllerState,
    input: mpsc::Receiver<String>,
    shutdown: watch::Receiver<bool>,
    out: W,
}

impl<W: Write> Controller<W> {
    pub fn new(
        prefs: Preferences,
        prefs_path: PathBuf,
        options: ControllerOptions,
        input: mpsc::Receiver<String>,
        shutdown: watch::Receiver<bool>,
        out: W,
    ) -> Self {
        Self {
            prefs,
            prefs_path,
            options,
            config: None,
            watch: None,
            state: ControllerState::Idle,
            input,
            shutdown,
            out,
        }
    }

    /// Run until the user quits.
    ///
    /// `initial` comes from the command line; without it the saved folder
    /// is resumed, and without that the user is asked. Failing to watch the
    /// first folder is returned as an error.
    pub async fn run(mut self, initial: Option<WatchConfig>) -> Result<()> {
        let initial = match initial {
            Some(config) => Some(config),
            None => match self.prefs.resume() {
                Some(Ok(config)) => Some(config),
                Some(Err(e)) => {
                    writeln!(self.out, "The saved folder cannot be used: {}", e)?;
                    None
                }
                None => None,
            },
        };

        if let Some(config) = initial {
            let reorganize = self.options.reorganize_on_start;
            self.activate(config, reorganize).await?;
        }

        let result = self.event_loop().await;
        self.stop_watching().await;
        writeln!(self.out, "Stopped.")?;
        self.out.flush()?;
        result
    }

    async fn event_loop(&mut self) -> Result<()> {
        loop {
            match self.state {
                ControllerState::Idle => self.idle_step().await?,
                ControllerState::Watching => self.watching_step().await?,
                ControllerState::MenuOpen => self.menu_step().await?,
                ControllerState::Stopped => return Ok(()),
            }
        }
    }

    async fn read_input(&mut self, prompt: &str) -> Result<Input> {
        write!(self.out, "{}", prompt)?;
        self.out.flush()?;

        tokio::select! {
            biased;
            line = self.input.recv() => Ok(match line {
                Some(line) => Input::Line(line.trim().to_string()),
                None => Input::Eof,
            }),
            _ = self.shutdown.changed() => Ok(Input::Shutdown),
        }
    }

    async fn idle_step(&mut self) -> Result<()> {
        writeln!(self.out, "Which folder should be watched? Type 'q' to quit.")?;
        self.print_saved_folders()?;
        let text = match self.read_input("Folder (number or path): ").await? {
            Input::Line(text) => text,
            Input::Eof | Input::Shutdown => {
                self.state = ControllerState::Stopped;
                return Ok(());
            }
        };

        if is_cancel(&text) {
            self.state = ControllerState::Stopped;
            return Ok(());
        }

        match self.config_for_folder(&text) {
            Ok(config) => {
                let reorganize = self.options.reorganize_on_start;
                self.activate(config, reorganize).await
            }
            Err(SeqRenameError::Config(msg)) => {
                writeln!(self.out, "{}", msg)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn watching_step(&mut self) -> Result<()> {
        let text = match self.read_input("> ").await? {
            Input::Line(text) => text,
            Input::Shutdown => {
                self.state = ControllerState::Stopped;
                return Ok(());
            }
            Input::Eof => {
                // Keep renaming as a background service until a signal arrives
                info!("Input closed, still watching. Press Ctrl+C to stop.");
                let _ = self.shutdown.changed().await;
                self.state = ControllerState::Stopped;
                return Ok(());
            }
        };

        match Command::parse(&text) {
            Command::Menu => self.state = ControllerState::MenuOpen,
            Command::Quit => self.state = ControllerState::Stopped,
            Command::Status => self.print_status()?,
            Command::Empty => {}
            Command::Help | Command::Unknown(_) => {
                writeln!(self.out, "Commands: 'menu', 'status', 'quit'")?;
            }
        }
        Ok(())
    }

    async fn menu_step(&mut self) -> Result<()> {
        writeln!(self.out)?;
        writeln!(self.out, "==============================")?;
        writeln!(self.out, "MENU")?;
        writeln!(self.out, "==============================")?;
        writeln!(self.out, "1. Status")?;
        writeln!(self.out, "2. Change folder")?;
        writeln!(self.out, "3. Change prefix")?;
        writeln!(self.out, "4. Reorganize files")?;
        writeln!(self.out, "5. Resume watching")?;
        writeln!(self.out, "6. Stop")?;

        let text = match self.read_input("Choice (1-6): ").await? {
            Input::Line(text) => text,
            Input::Eof | Input::Shutdown => {
                self.state = ControllerState::Stopped;
                return Ok(());
            }
        };

        match MenuChoice::parse(&text) {
            MenuChoice::Status => self.print_status()?,
            MenuChoice::ChangeFolder => self.change_folder().await?,
            MenuChoice::ChangePrefix => self.change_prefix().await?,
            MenuChoice::Reorganize => {
                // Restart around the pass so no append races the renames
                if let Some(config) = self.config.clone() {
                    self.replace_config(config, true).await?;
                }
            }
            MenuChoice::Resume => {
                writeln!(self.out, "Back to watching.")?;
                self.state = ControllerState::Watching;
            }
            MenuChoice::Stop => self.state = ControllerState::Stopped,
            MenuChoice::Invalid => writeln!(self.out, "Please choose a number from 1 to 6.")?,
        }
        Ok(())
    }

    async fn change_folder(&mut self) -> Result<()> {
        self.print_saved_folders()?;
        loop {
            let text = match self.read_input("New folder, number or path (empty to cancel): ").await? {
                Input::Line(text) => text,
                Input::Eof | Input::Shutdown => {
                    self.state = ControllerState::Stopped;
                    return Ok(());
                }
            };
            if text.is_empty() || is_cancel(&text) {
                writeln!(self.out, "Folder unchanged.")?;
                return Ok(());
            }

            match self.config_for_folder(&text) {
                Ok(config) => {
                    let reorganize = self.options.reorganize_on_start;
                    return self.replace_config(config, reorganize).await;
                }
                Err(SeqRenameError::Config(msg)) => writeln!(self.out, "{}", msg)?,
                Err(e) => return Err(e),
            }
        }
    }

    async fn change_prefix(&mut self) -> Result<()> {
        let Some(current) = self.config.clone() else {
            return Ok(());
        };

        loop {
            let prompt = format!("New prefix (current: '{}', empty to cancel): ", current.prefix);
            let text = match self.read_input(&prompt).await? {
                Input::Line(text) => text,
                Input::Eof | Input::Shutdown => {
                    self.state = ControllerState::Stopped;
                    return Ok(());
                }
            };
            if text.is_empty() {
                writeln!(self.out, "Prefix unchanged.")?;
                return Ok(());
            }

            match current.with_prefix(&text) {
                Ok(config) => {
                    // Files already renamed keep their old prefix
                    self.options.prefix_override = None;
                    return self.replace_config(config, false).await;
                }
                Err(SeqRenameError::Config(msg)) => writeln!(self.out, "{}", msg)?,
                Err(e) => return Err(e),
            }
        }
    }

    /// Saved folders with their prefixes, in the order they are listed
    fn saved_folders(&self) -> Vec<(PathBuf, String)> {
        self.prefs
            .folders
            .iter()
            .map(|(dir, prefix)| (dir.clone(), prefix.clone()))
            .collect()
    }

    fn print_saved_folders(&mut self) -> Result<()> {
        let saved = self.saved_folders();
        if saved.is_empty() {
            return Ok(());
        }
        writeln!(self.out, "Saved folders:")?;
        for (i, (dir, prefix)) in saved.iter().enumerate() {
            writeln!(self.out, "  {}. {} (prefix '{}')", i + 1, dir.display(), prefix)?;
        }
        writeln!(self.out, "Or type the path of another folder.")?;
        Ok(())
    }

    /// Folder typed by the user, either a saved folder's number or a path
    fn config_for_folder(&self, text: &str) -> Result<WatchConfig> {
        let saved = self.saved_folders();
        let dir = match text.trim().parse::<usize>() {
            Ok(n) if (1..=saved.len()).contains(&n) => validate_directory(&saved[n - 1].0)?,
            Ok(n) if !Path::new(text.trim()).is_dir() => {
                return Err(SeqRenameError::Config(format!(
                    "There is no saved folder number {}",
                    n
                )))
            }
            _ => validate_directory(Path::new(text))?,
        };
        let prefix = match &self.options.prefix_override {
            Some(prefix) => prefix.as_str(),
            None => self.prefs.prefix_for(&dir),
        };
        WatchConfig::new(&dir, prefix, &self.prefs.extensions)
    }

    /// Swap in a new configuration, going back to the old one if the new
    /// folder cannot be watched
    async fn replace_config(&mut self, config: WatchConfig, reorganize: bool) -> Result<()> {
        let previous = self.config.clone();
        match self.activate(config, reorganize).await {
            Ok(()) => Ok(()),
            Err(e) if !e.is_fatal() => Err(e),
            Err(e) => {
                writeln!(self.out, "{}", e)?;
                match previous {
                    Some(previous) => self.activate(previous, false).await,
                    None => Err(e),
                }
            }
        }
    }

    async fn activate(&mut self, config: WatchConfig, reorganize: bool) -> Result<()> {
        self.stop_watching().await;

        if reorganize {
            self.run_reorganize(&config)?;
        }

        let handle = service::start(config.clone(), self.options.watcher.clone()).await?;

        self.prefs.remember(&config);
        self.save_prefs();

        writeln!(
            self.out,
            "Watching {} with prefix '{}'. Type 'menu' or 'quit'.",
            config.directory.display(),
            config.prefix
        )?;

        self.config = Some(config);
        self.watch = Some(handle);
        if self.state == ControllerState::Idle {
            self.state = ControllerState::Watching;
        }
        Ok(())
    }

    async fn stop_watching(&mut self) {
        if let Some(handle) = self.watch.take() {
            handle.stop().await;
        }
    }

    fn save_prefs(&mut self) {
        if let Err(e) = self.prefs.save(&self.prefs_path) {
            warn!("Could not save preferences to {:?}: {}", self.prefs_path, e);
        }
    }

    fn run_reorganize(&mut self, config: &WatchConfig) -> Result<()> {
        match scanner::reorganize(config) {
            Ok(report) => {
                if report.renamed.is_empty() && report.is_clean() {
                    writeln!(self.out, "{} file(s) already in order.", report.total)?;
                } else {
                    writeln!(
                        self.out,
                        "{} of {} file(s) renamed.",
                        report.renamed.len(),
                        report.total
                    )?;
                }
                for (step, reason) in &report.failed {
                    writeln!(self.out, "Skipped {}: {}", step.from.display(), reason)?;
                }
            }
            Err(e) => writeln!(self.out, "Reorganizing failed: {}", e)?,
        }
        Ok(())
    }

    fn print_status(&mut self) -> Result<()> {
        match &self.config {
            Some(config) => {
                writeln!(self.out, "Folder: {}", config.directory.display())?;
                writeln!(self.out, "Prefix: {}", config.prefix)?;
                writeln!(self.out, "Types:  {}", config.extensions.join(", "))?;
                writeln!(
                    self.out,
                    "State:  {}",
                    if self.watch.is_some() { "watching" } else { "paused" }
                )?;
            }
            None => writeln!(self.out, "No folder selected.")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_parse() {
        assert_eq!(Command::parse("menu"), Command::Menu);
        assert_eq!(Command::parse(" M "), Command::Menu);
        assert_eq!(Command::parse("q"), Command::Quit);
        assert_eq!(Command::parse("QUIT"), Command::Quit);
        assert_eq!(Command::parse(""), Command::Empty);
        assert_eq!(Command::parse("hello"), Command::Unknown("hello".to_string()));
    }

    #[test]
    fn test_menu_choice_parse() {
        assert_eq!(MenuChoice::parse("2"), MenuChoice::ChangeFolder);
        assert_eq!(MenuChoice::parse("prefix"), MenuChoice::ChangePrefix);
        assert_eq!(MenuChoice::parse(""), MenuChoice::Resume);
        assert_eq!(MenuChoice::parse("6"), MenuChoice::Stop);
        assert_eq!(MenuChoice::parse("9"), MenuChoice::Invalid);
    }

    #[test]
    fn test_cancel_words() {
        assert!(is_cancel("q"));
        assert!(is_cancel(" Cancel "));
        assert!(!is_cancel("photos"));
    }

    fn controller(prefs: Preferences, prefs_path: PathBuf) -> Controller<Vec<u8>> {
        let (_tx, rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut options = ControllerOptions::from_preferences(&prefs);
        options.watcher.debounce_ms = 50;
        Controller::new(prefs, prefs_path, options, rx, shutdown_rx, Vec::new())
    }

    #[test]
    fn test_saved_folder_by_number() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let mut prefs = Preferences::default();
        prefs.folders.insert(first.path().to_path_buf(), "Trip".to_string());
        prefs.folders.insert(second.path().to_path_buf(), "Home".to_string());
        let ctl = controller(prefs, first.path().join("prefs.json"));

        let listed = ctl.saved_folders();
        let config = ctl.config_for_folder("2").unwrap();
        assert_eq!(config.directory, listed[1].0);
        assert_eq!(config.prefix, listed[1].1);

        let by_path = ctl.config_for_folder(&first.path().display().to_string()).unwrap();
        assert_eq!(by_path.prefix, "Trip");

        assert!(matches!(ctl.config_for_folder("7"), Err(SeqRenameError::Config(_))));
    }

    #[test]
    fn test_command_line_prefix_beats_saved_one() {
        let photos = TempDir::new().unwrap();
        let mut prefs = Preferences::default();
        prefs.folders.insert(photos.path().to_path_buf(), "Old".to_string());
        let mut ctl = controller(prefs, photos.path().join("prefs.json"));
        ctl.options.prefix_override = Some("Cli".to_string());

        let config = ctl.config_for_folder(&photos.path().display().to_string()).unwrap();
        assert_eq!(config.prefix, "Cli");
        assert_eq!(ctl.config_for_folder("1").unwrap().prefix, "Cli");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unwatchable_folder_restores_previous() {
        let home = TempDir::new().unwrap();
        let photos = TempDir::new().unwrap();
        let gone = TempDir::new().unwrap();
        let mut ctl = controller(Preferences::default(), home.path().join("prefs.json"));

        let previous = WatchConfig::new(photos.path(), "Horizon", &["png".to_string()]).unwrap();
        ctl.activate(previous.clone(), false).await.unwrap();
        assert_eq!(ctl.state, ControllerState::Watching);

        let broken = WatchConfig::new(gone.path(), "Horizon", &["png".to_string()]).unwrap();
        std::fs::remove_dir(gone.path()).unwrap();
        ctl.replace_config(broken, false).await.unwrap();

        assert_eq!(ctl.config.as_ref(), Some(&previous));
        assert!(ctl.watch.is_some());
        assert_eq!(ctl.prefs.watch_dir.as_deref(), Some(photos.path()));
        let text = String::from_utf8_lossy(&ctl.out).into_owned();
        assert!(text.contains("Cannot start watching"), "output: {}", text);

        ctl.stop_watching().await;
    }
}
