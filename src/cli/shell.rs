//! Interactive shell mode
//!
//! Provides a REPL with command history and tab completion. Updates from the
//! background poller are rendered as they arrive, like the tray title and menu.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Config, Editor, Helper};

use crate::bus::Subscription;
use crate::cli::view::TrayView;
use crate::cli::{connect, initial_scope, parse_scope};
use crate::format::Formatter;
use crate::orchestrator::{Orchestrator, WORLD_LABEL};
use crate::poller::Poller;

const COMMANDS: &[&str] = &["select", "refresh", "countries", "status", "help", "exit", "quit"];

type Shared<T> = Arc<Mutex<T>>;

fn lock<T>(shared: &Shared<T>) -> MutexGuard<'_, T> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Command and country completer for the shell
struct ShellCompleter {
    countries: Shared<Vec<String>>,
}

impl ShellCompleter {
    /// Candidates for `line`, with the byte offset the replacement starts at
    fn candidates(&self, line: &str) -> (usize, Vec<String>) {
        // `select` takes the whole rest of the line, so names with spaces complete too
        if let Some(prefix) = line.strip_prefix("select ") {
            let start = line.len() - prefix.len();
            let prefix = prefix.to_lowercase();
            let countries = lock(&self.countries);
            let names = std::iter::once(WORLD_LABEL)
                .chain(countries.iter().map(String::as_str))
                .filter(|name| name.to_lowercase().starts_with(&prefix))
                .map(str::to_string)
                .collect();
            return (start, names);
        }

        if line.contains(' ') {
            return (line.len(), Vec::new());
        }

        let names = COMMANDS
            .iter()
            .filter(|cmd| cmd.starts_with(line))
            .map(|cmd| cmd.to_string())
            .collect();
        (0, names)
    }
}

impl Completer for ShellCompleter {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let (start, names) = self.candidates(&line[..pos]);
        let candidates = names
            .into_iter()
            .map(|name| Pair {
                display: name.clone(),
                replacement: name,
            })
            .collect();
        Ok((start, candidates))
    }
}

impl Hinter for ShellCompleter {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &rustyline::Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for ShellCompleter {}
impl Validator for ShellCompleter {}
impl Helper for ShellCompleter {}

/// Shell session state shared between the prompt and the background tasks
struct Session {
    orchestrator: Orchestrator,
    fmt: Formatter,
    view: Shared<TrayView>,
    countries: Shared<Vec<String>>,
}

impl Session {
    /// Run a single command line.
    /// Returns Ok(true) to continue, Ok(false) to exit gracefully.
    async fn run_command(&self, line: &str) -> Result<bool> {
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));

        match cmd {
            "select" | "refresh" if self.orchestrator.is_fetching() => {
                println!("Fetch in progress, try again once it completes.");
            }
            "select" => {
                self.orchestrator.select_country(parse_scope(rest));
            }
            "refresh" => {
                self.orchestrator.refresh();
            }
            "countries" => self.countries().await,
            "status" => self.status(),
            "help" => print_help(),
            "exit" | "quit" => return Ok(false),
            _ => println!("Unknown command: {} (type 'help' for commands)", cmd),
        }

        Ok(true)
    }

    fn status(&self) {
        let selection = self.orchestrator.selection();
        let view = lock(&self.view);

        println!("{}", view.render());
        println!(
            "Selected: {}{}",
            selection.as_deref().unwrap_or(WORLD_LABEL),
            if view.fetching { " (fetching)" } else { "" }
        );
        if let Some(snapshot) = view.last_good() {
            println!("\n{}", self.fmt.details(snapshot));
        }
    }

    async fn countries(&self) {
        if lock(&self.countries).is_empty() {
            match self.orchestrator.list_countries().await {
                Ok(names) => *lock(&self.countries) = names,
                Err(e) => println!("Failed to fetch countries: {}", e),
            }
        }

        println!("{}", WORLD_LABEL);
        for name in lock(&self.countries).iter() {
            println!("{}", name);
        }
    }
}

/// Render every update until the stream ends
async fn render_updates(mut updates: Subscription, view: Shared<TrayView>) {
    while let Some(event) = updates.recv().await {
        let text = {
            let mut view = lock(&view);
            view.apply(&event);
            view.render()
        };
        println!("\n{}", text);
    }
}

fn print_help() {
    println!(
        r#"covidtray Interactive Shell

Commands:
  select <country>         Show stats for a country ("world" for worldwide)
  refresh                  Fetch fresh data now
  countries                List selectable countries
  status                   Show the current stats
  help                     Show this help
  exit, quit               Exit the shell

Data refreshes automatically in the background.
"#
    );
}

/// Get the history file path
fn history_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("com", "covidtray", "Covidtray")
        .map(|dirs| dirs.data_dir().join("shell_history"))
}

/// Run the interactive shell
pub async fn run() -> Result<()> {
    let config = crate::config::Config::load()?;
    let orchestrator = connect(&config)?;

    let fmt = Formatter::new(&config.display.locale);
    let session = Session {
        orchestrator: orchestrator.clone(),
        fmt,
        view: Arc::new(Mutex::new(TrayView::new(fmt))),
        countries: Arc::new(Mutex::new(Vec::new())),
    };

    let updates = orchestrator.subscribe();
    let updates_id = updates.id();
    let renderer = tokio::spawn(render_updates(updates, session.view.clone()));

    // Populate country completion in the background
    tokio::spawn({
        let orchestrator = orchestrator.clone();
        let countries = session.countries.clone();
        async move {
            match orchestrator.list_countries().await {
                Ok(names) => *lock(&countries) = names,
                Err(e) => tracing::warn!("Failed to fetch countries: {}", e),
            }
        }
    });

    if let Some(country) = initial_scope(None, &config) {
        orchestrator.select_country(Some(country));
    }
    let poller = Poller::new(config.poll_interval()).spawn(orchestrator.clone());

    println!("covidtray Interactive Shell v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'help' for available commands, 'exit' to quit.\n");

    let rl_config = Config::builder()
        .history_ignore_space(true)
        .completion_type(rustyline::CompletionType::List)
        .build();

    let mut rl = Editor::with_config(rl_config)?;
    rl.set_helper(Some(ShellCompleter {
        countries: session.countries.clone(),
    }));

    // Load history
    if let Some(path) = history_path() {
        let _ = rl.load_history(&path);
    }

    loop {
        // readline blocks; keep the runtime's other workers free for updates
        match tokio::task::block_in_place(|| rl.readline("covidtray> ")) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match session.run_command(line).await {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("exit");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    // Save history
    if let Some(path) = history_path() {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(&path);
    }

    poller.shutdown().await;
    orchestrator.bus().unsubscribe(updates_id);
    orchestrator.shutdown();
    let _ = renderer.await;

    Ok(())
}
