use rustyline::{Editor, Helper, Config, error::ReadlineError, Context};
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use std::future::Future;

use crate::service::ServiceStatus;

pub const COMMANDS: [&str; 5] = ["status", "health", "start", "stop", "exit"];
const HISTORY: &str = "logs/history.txt";

/*
    @@@
    @CmdCompleter;
    . Plugs into rustyline to provide prefix-based tab-completion over the fixed command list.
*/
struct CmdCompleter {
    commands: Vec<String>,
}
impl Helper for CmdCompleter {}
impl Hinter for CmdCompleter {
    type Hint = String;
}
impl Highlighter for CmdCompleter {}
impl Validator for CmdCompleter {}
impl Completer for CmdCompleter {
    type Candidate = Pair;
    fn complete(&self, line: &str, _pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>), ReadlineError> {
        Ok((0, complete_command(&self.commands, line)))
    }
}

fn complete_command(commands: &[String], line: &str) -> Vec<Pair> {
    commands
        .iter()
        .filter(|cmd| cmd.starts_with(line))
        .map(|cmd| Pair { display: cmd.clone(), replacement: cmd.clone() })
        .collect()
}

/// One line per service for the `status` command.
pub fn format_status(status: &ServiceStatus) -> String {
    let pid = status.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
    let health = if status.healthy { "healthy" } else { "unhealthy" };
    let state = if status.running { "running" } else { "stopped" };
    let last_exit = status.last_exit.map_or_else(|| "-".to_string(), |e| e.to_string());
    format!(
        "{:<12} {:<12} {:<8} {:<8} {:<10} restarts={} last_exit={}",
        status.id, status.name, state, pid, health, status.restarts, last_exit
    )
}

/*
    @@@
    @run_shell();
    . Reads commands with tab completion and persistent history.
    . status / health / start / stop run the matching closure; exit, Ctrl-C or Ctrl-D leave the loop.
    . The caller owns shutdown after the loop returns.
*/
pub async fn run_shell<SFut, HFut, StFut, SpFut, OnStatus, OnHealth, OnStart, OnStop>(
    mut on_status: OnStatus,
    mut on_health: OnHealth,
    mut on_start: OnStart,
    mut on_stop: OnStop,
) -> rustyline::Result<()>
where
    OnStatus: FnMut() -> SFut,
    SFut: Future<Output = ()>,
    OnHealth: FnMut() -> HFut,
    HFut: Future<Output = ()>,
    OnStart: FnMut() -> StFut,
    StFut: Future<Output = ()>,
    OnStop: FnMut() -> SpFut,
    SpFut: Future<Output = ()>,
{
    let config = Config::builder().build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(CmdCompleter {
        commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
    }));
    let _ = rl.load_history(HISTORY);

    loop {
        let line = rl.readline("sidecars> ");
        match line {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(input)?;
                match input {
                    "status" => on_status().await,
                    "health" => on_health().await,
                    "start" => on_start().await,
                    "stop" => on_stop().await,
                    "exit" => break,
                    other => println!("Unknown command: {} (try: {})", other, COMMANDS.join(", ")),
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Err(e) = rl.save_history(HISTORY) {
        eprintln!("could not save history: {}", e);
    }
    Ok(())
}
