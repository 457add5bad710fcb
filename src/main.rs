use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use game_2048::game::{Direction, Grid};
use game_2048::replay;
use game_2048::worker::{self, SolverClient};
use game_2048::{
    Actuator, ActuatorMetadata, FileStorage, GameConfig, GameManager, InputEvent, MemoryStorage, StorageManager,
};

#[derive(Debug, Parser)]
#[command(name = "game-2048", about = "2048 with an out-of-process solver")]
struct Cli {
    /// TOML config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for tile placement (also sent to the solver)
    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    size: Option<usize>,

    #[arg(long)]
    win_value: Option<u32>,

    /// Persist the game and best score to this JSON file
    #[arg(long)]
    state: Option<PathBuf>,

    /// Do not mirror human moves into the solver
    #[arg(long)]
    no_mirror: bool,

    /// Fail solver requests that take longer than this
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Cap expectimax depth
    #[arg(long)]
    depth_cap: Option<u32>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Play from stdin: w/a/s/d (or h/j/k/l), restart, evil, auto, continue, quit
    Play {
        /// Run the solver as a child process instead of a thread
        #[arg(long)]
        process: bool,
    },
    /// Let the solver play until the game ends
    Autorun {
        /// Stop after this many moves
        #[arg(long)]
        max_moves: Option<u64>,
        /// Pause between solver moves
        #[arg(long)]
        delay_ms: Option<u64>,
        /// Place tiles adversarially
        #[arg(long)]
        evil: bool,
        /// Write a replay of the run to this path
        #[arg(long)]
        record: Option<PathBuf>,
        /// Suppress the spinner and final board
        #[arg(long)]
        quiet: bool,
        #[arg(long)]
        process: bool,
    },
    /// Serve the solver protocol on stdin/stdout
    Worker,
    /// Re-apply a recorded game and print the final board
    Replay { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    match cli.cmd {
        Cmd::Worker => {
            let search = config.search;
            tokio::task::spawn_blocking(move || worker::serve_stdio(search))
                .await
                .context("worker thread panicked")?
                .context("serving worker protocol")?;
        }
        Cmd::Replay { ref file } => {
            let recorded = replay::read_from_path(file).with_context(|| format!("reading {}", file.display()))?;
            let game = recorded.play().context("replaying")?;
            println!("{}", game.grid());
            println!("Moves: {} | score: {}", recorded.len(), game.score());
        }
        Cmd::Play { process } => {
            let solver = connect_solver(&cli, &config, process)?;
            let storage = open_storage(&config)?;
            let manager = GameManager::start(config, storage, Box::new(TerminalActuator), Some(solver)).await?;
            play(&manager).await?;
        }
        Cmd::Autorun { max_moves, delay_ms, evil, ref record, quiet, process } => {
            if let Some(delay) = delay_ms {
                config.autorun_delay_ms = delay;
            }
            let solver = connect_solver(&cli, &config, process)?;
            let storage = open_storage(&config)?;
            let pb = (!quiet).then(spinner);
            let actuator = ProgressActuator { pb: pb.clone(), moves: 0 };
            let manager = GameManager::start(config, storage, Box::new(actuator), Some(solver)).await?;
            if evil {
                manager.toggle_evil().await?;
            }

            let start = Instant::now();
            manager.start_autorun(max_moves)?;
            let moves = manager.wait_autorun().await?;
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            let state = manager.snapshot().await;
            if !quiet {
                println!("{}", state.grid);
                let elapsed = start.elapsed().as_secs_f64().max(1e-6);
                println!(
                    "Moves: {} | moves/sec: {:.1} | score: {} | best: {} | won: {} | over: {}",
                    moves,
                    moves as f64 / elapsed,
                    state.score,
                    manager.best_score().await,
                    state.won,
                    state.over
                );
            }
            if let Some(path) = record {
                let recorded = manager.replay().await;
                replay::write_to_path(path, &recorded).with_context(|| format!("writing {}", path.display()))?;
            }
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout carries the board (or the worker protocol); logs go to stderr.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<GameConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            GameConfig::from_toml_path(path).with_context(|| format!("loading config {}", path.display()))?
        }
        None => GameConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(size) = cli.size {
        config.size = size;
    }
    if let Some(win_value) = cli.win_value {
        config.win_value = win_value;
    }
    if cli.state.is_some() {
        config.state_path = cli.state.clone();
    }
    if cli.no_mirror {
        config.mirror_moves = false;
    }
    if cli.timeout_ms.is_some() {
        config.solver_timeout_ms = cli.timeout_ms;
    }
    if cli.depth_cap.is_some() {
        config.search.depth_cap = cli.depth_cap;
    }
    config.validate()?;
    Ok(config)
}

fn open_storage(config: &GameConfig) -> Result<Box<dyn StorageManager>> {
    let storage: Box<dyn StorageManager> = match &config.state_path {
        Some(path) => {
            Box::new(FileStorage::open(path).with_context(|| format!("opening state file {}", path.display()))?)
        }
        None => Box::new(MemoryStorage::new()),
    };
    Ok(storage)
}

fn connect_solver(cli: &Cli, config: &GameConfig, process: bool) -> Result<SolverClient> {
    let channels = if process {
        let exe = std::env::current_exe().context("locating own executable")?;
        let mut args: Vec<OsString> = Vec::new();
        if let Some(path) = &cli.config {
            args.push("--config".into());
            args.push(path.into());
        }
        if let Some(cap) = cli.depth_cap {
            args.push("--depth-cap".into());
            args.push(cap.to_string().into());
        }
        args.push("worker".into());
        worker::spawn_process(exe, args).context("spawning worker process")?
    } else {
        worker::spawn_thread(config.search).context("spawning worker thread")?
    };
    Ok(SolverClient::connect(channels, config.solver_timeout()))
}

async fn play(manager: &GameManager) -> Result<()> {
    eprintln!("w/a/s/d or h/j/k/l to move; restart, evil, auto, continue, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let event = match line.trim() {
            "" => continue,
            "q" | "quit" | "exit" => break,
            "restart" | "new" => InputEvent::Restart,
            "evil" => InputEvent::EvilTile,
            "auto" | "solve" => InputEvent::Autorun,
            "continue" | "keep" => InputEvent::KeepPlaying,
            other => match other.parse::<Direction>() {
                Ok(direction) => InputEvent::Move(direction),
                Err(e) => {
                    eprintln!("{e}");
                    continue;
                }
            },
        };
        if let Err(e) = manager.handle(event).await {
            eprintln!("{e}");
        }
    }
    manager.stop_autorun();
    Ok(())
}

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner} {elapsed_precise} | Moves: {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Prints every frame to stdout.
struct TerminalActuator;

impl Actuator for TerminalActuator {
    fn actuate(&mut self, grid: &Grid, metadata: &ActuatorMetadata) {
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{grid}");
        let _ = writeln!(out, "score: {} | best: {}", metadata.score, metadata.best_score);
        if metadata.over {
            let _ = writeln!(out, "Game over! Type restart to try again.");
        } else if metadata.won && metadata.terminated {
            let _ = writeln!(out, "You win! Type continue to keep going.");
        }
    }

    fn solver_toggled(&mut self, running: bool) {
        println!("solver {}", if running { "running" } else { "stopped" });
    }

    fn evil_toggled(&mut self, enabled: bool) {
        println!("evil tiles {}", if enabled { "on" } else { "off" });
    }
}

/// Feeds the spinner during headless autorun.
struct ProgressActuator {
    pb: Option<ProgressBar>,
    moves: u64,
}

impl Actuator for ProgressActuator {
    fn actuate(&mut self, grid: &Grid, metadata: &ActuatorMetadata) {
        self.moves += 1;
        if let Some(pb) = &self.pb {
            pb.set_message(format!(
                "{} | score: {} | max tile: {}",
                self.moves.saturating_sub(1),
                metadata.score,
                grid.max_value()
            ));
        }
    }
}
