//! CLI utilities for pubsubsql.
//!
//! The utilities present in this module can be used to build an interactive shell on top of
//! [`Client`](crate::Client).
use std::{
    io::{self, BufRead, Write},
    time::Duration,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unrecognized command '{0}'")]
    UnrecognizedCommand(String),

    #[error("invalid '{command}' command, {reason}")]
    InvalidCommandArguments { command: String, reason: String },

    #[error("failed to access terminal: {0}")]
    Io(#[from] io::Error),
}

/// Possible commands from a user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Exit command `.exit`, also produced at end of input
    Exit,
    /// Wait for a single push event `.wait <seconds>`
    Wait(Duration),
    /// Print push events until interrupted `.listen`
    Listen,
    /// Fire-and-forget statement `stream <statement>`
    Stream(String),
    /// Statement executed on the server
    Statement(String),
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim() {
            ".exit" => Ok(Command::Exit),
            ".listen" => Ok(Command::Listen),
            s if s.starts_with(".wait") => {
                let arg = s[".wait".len()..].trim();
                let secs = arg
                    .parse::<f64>()
                    .ok()
                    .filter(|secs| secs.is_finite() && *secs > 0.0)
                    .ok_or_else(|| CommandError::InvalidCommandArguments {
                        command: ".wait".to_string(),
                        reason: "requires a positive number of seconds. Example: .wait 5"
                            .to_string(),
                    })?;
                Ok(Command::Wait(Duration::from_secs_f64(secs)))
            }
            s if s.starts_with('.') => Err(CommandError::UnrecognizedCommand(s.to_string())),
            s => match s.split_once(' ') {
                Some((head, rest)) if head.eq_ignore_ascii_case("stream") => {
                    Ok(Command::Stream(rest.trim().to_string()))
                }
                _ => Ok(Command::Statement(s.to_string())),
            },
        }
    }
}

/// Prompt user for a command.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> Result<Command, CommandError>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")?;
    writer.flush()?;

    if reader.read_line(&mut s)? == 0 {
        return Ok(Command::Exit);
    }

    Command::try_from(s.as_str())
}
