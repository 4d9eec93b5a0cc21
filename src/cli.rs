//! Interactive console
//!
//! A small REPL on its own thread: `detect`, `status`, `port <n>`, `quit`.
//! Commands are forwarded to the dispatch loop; the console never touches
//! bridge state itself.

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::bridge::BridgeStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Request the device list from serialosc
    Detect,
    Status,
    /// Edit the device port setting
    Port(String),
    Quit,
}

impl ConsoleCommand {
    /// Parse one console line; `Ok(None)` for lines handled locally
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut parts = line.split_whitespace();
        let Some(word) = parts.next() else {
            return Ok(None);
        };

        let command = match word.to_lowercase().as_str() {
            "detect" | "d" => ConsoleCommand::Detect,
            "status" | "s" => ConsoleCommand::Status,
            "port" | "p" => match parts.next() {
                Some(value) => ConsoleCommand::Port(value.to_string()),
                None => return Err("usage: port <number>  (0 disconnects)".to_string()),
            },
            "quit" | "exit" | "q" => ConsoleCommand::Quit,
            "help" | "?" => {
                print_help();
                return Ok(None);
            }
            other => return Err(format!("unknown command '{}', try 'help'", other)),
        };

        Ok(Some(command))
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  {}       ask serialosc for attached devices", "detect".yellow());
    println!("  {}       show connection state and known devices", "status".yellow());
    println!("  {}  set the device port (0 disconnects)", "port <n>".yellow());
    println!("  {}         stop the bridge", "quit".yellow());
}

/// Start the console thread
///
/// Runs on a plain OS thread: readline blocks, and a blocking tokio task
/// would hold up runtime shutdown.
pub fn spawn_console(tx: mpsc::Sender<ConsoleCommand>) -> Result<()> {
    std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || run_console(tx))?;

    Ok(())
}

fn run_console(tx: mpsc::Sender<ConsoleCommand>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
        warn!("Console unavailable: {}", e);
        return;
        }
    };

    loop {
        match rl.readline("serialosc> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match ConsoleCommand::parse(line) {
                    Ok(Some(command)) => {
                        let quit = command == ConsoleCommand::Quit;
                        if tx.blocking_send(command).is_err() || quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(message) => println!("{}", message.yellow()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                let _ = tx.blocking_send(ConsoleCommand::Quit);
                break;
            }
            Err(e) => {
                // EOF on a detached stdin: keep running without a console
                debug!("Console closed: {}", e);
                break;
            }
        }
    }
}

pub fn print_status(status: &BridgeStatus) {
    println!("\n{}", "=== serialosc-gw status ===".bold().cyan());
    println!("  Connection:   {}", status.connection.to_string().green());
    println!("  Session:      {}", status.session.to_string().green());
    println!("  Device port:  {}", status.configured_port);
    if let Some(id) = &status.bound_device {
        println!("  Bound device: {}", id.bright_white());
    }

    println!("\n{}", "Endpoints:".bold());
    for endpoint in &status.endpoints {
        println!("  {}", endpoint);
    }

    println!("\n{}", "Known devices:".bold());
    if status.devices.is_empty() {
        println!("  {}", "none (try 'detect')".dimmed());
    }
    for device in &status.devices {
        println!(
            "  {} {} port {}",
            device.id.yellow(),
            device.device_type,
            device.port
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("detect"), Ok(Some(ConsoleCommand::Detect)));
        assert_eq!(ConsoleCommand::parse("STATUS"), Ok(Some(ConsoleCommand::Status)));
        assert_eq!(
            ConsoleCommand::parse("port 16000"),
            Ok(Some(ConsoleCommand::Port("16000".to_string())))
        );
        assert_eq!(ConsoleCommand::parse("exit"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(ConsoleCommand::parse("   "), Ok(None));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse("port").is_err());
        assert!(ConsoleCommand::parse("reboot").is_err());
    }
}
