use std::io::{self, BufRead, Write};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use bot_2048::codec::{self, BOARD_SIZE};
use bot_2048::engine::{self as GameEngine, Board};
use bot_2048::expectimax::SearchConfig;
use bot_2048::protocol;
use bot_2048::worker::BotController;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Parser, Debug)]
#[command(name = "bot-2048", about = "Expectimax bot for 2048")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Let the bot play a full game against random spawns.
    Play {
        /// Deepest search iteration per move
        #[arg(long, default_value_t = 3)]
        depth: u32,
        /// Time budget per move in milliseconds
        #[arg(long = "time-ms", default_value_t = 100)]
        time_ms: u64,
        /// RNG seed for tile spawns (random if omitted)
        #[arg(long)]
        seed: Option<u64>,
        /// Stop after this many moves
        #[arg(long)]
        steps: Option<u64>,
        /// Show a spinner instead of printing every board
        #[arg(long, default_value_t = false)]
        quiet: bool,
    },
    /// Answer JSON requests read line by line from stdin.
    Serve,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    GameEngine::new();

    match args.cmd {
        Cmd::Play { depth, time_ms, seed, steps, quiet } => play(depth, time_ms, seed, steps, quiet),
        Cmd::Serve => serve(),
    }
}

fn play(depth: u32, time_ms: u64, seed: Option<u64>, steps: Option<u64>, quiet: bool) -> Result<()> {
    if depth == 0 || time_ms == 0 {
        bail!("--depth and --time-ms must be positive");
    }
    let start = Instant::now();
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    let mut bot = BotController::new(&SearchConfig { max_depth: depth, time_limit_ms: time_ms, ..Default::default() });
    bot.enable();

    let pb = if quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner} {elapsed_precise} | Moves: {msg}")
                .context("spinner template")?
                .tick_chars("⠁⠃⠇⠧⠷⠿⠻⠟⠯⠷⠧⠇⠃"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    } else {
        None
    };

    let mut board = Board::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    let mut score: u64 = 0;
    let mut move_count: u64 = 0;
    if !quiet {
        println!("{}", board);
    }

    loop {
        if board.is_game_over() {
            bot.game_over();
            break;
        }
        if steps.map_or(false, |limit| move_count >= limit) {
            break;
        }
        let grid = codec::decode(board, BOARD_SIZE)?;
        if !bot.request_move(&grid)? {
            bail!("bot refused the move request");
        }
        let response = loop {
            if let Some(response) = bot.poll(Duration::from_millis(50))? {
                break response;
            }
        };
        let Some(dir) = response.chosen_direction() else {
            break;
        };
        let moved = board.apply(dir);
        if !moved.changed {
            bail!("bot chose {} which does not change the board", dir);
        }
        score += moved.score;
        board = moved.board.with_random_tile(&mut rng);
        move_count += 1;

        match &pb {
            Some(pb) => pb.set_message(format!("{} | score: {} | best tile: {}", move_count, score, board.highest_tile())),
            None => println!("{}\n{}", dir, board),
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    bot.disable();
    let elapsed = start.elapsed().as_secs_f64().max(1e-6);
    println!(
        "Moves: {} | moves/sec: {:.1} | score: {} | best tile: {}",
        move_count,
        move_count as f64 / elapsed,
        score,
        board.highest_tile()
    );
    Ok(())
}

fn serve() -> Result<()> {
    info!("serving requests on stdin");
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = protocol::handle_line(&line);
        serde_json::to_writer(&mut stdout, &response)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }
    Ok(())
}
