//! Line commands for driving the studio from a terminal.

use std::str::FromStr;

use thiserror::Error;

use crate::managers::studio_manager::{StudioHandle, StudioSnapshot, UploadStatus};

pub const HELP: &str = "commands: filters | filter <name> | start | status | retake | download | retry-camera | back | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Filters,
    Filter(String),
    Start,
    Status,
    Retake,
    Download,
    RetryCamera,
    Back,
    Help,
    Quit,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("usage: filter <name>")]
    MissingFilterName,
    #[error("unknown command '{0}' ({HELP})")]
    Unknown(String),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_lowercase().as_str() {
            "" => Err(ParseError::Empty),
            "filters" => Ok(Command::Filters),
            "filter" if rest.is_empty() => Err(ParseError::MissingFilterName),
            "filter" => Ok(Command::Filter(rest.to_string())),
            "start" | "capture" => Ok(Command::Start),
            "status" => Ok(Command::Status),
            "retake" => Ok(Command::Retake),
            "download" => Ok(Command::Download),
            "retry-camera" | "retry" => Ok(Command::RetryCamera),
            "back" => Ok(Command::Back),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// What the terminal loop should do after a command
#[derive(Debug, PartialEq, Eq)]
pub enum Flow {
    Continue(String),
    Quit,
}

/// Run one command against the studio
pub async fn execute(handle: &StudioHandle, command: Command) -> Result<Flow, String> {
    let text = match command {
        Command::Filters => handle.list_filters().await?.join(", "),
        Command::Filter(name) => format!("Filter set to {}", handle.select_filter(&name).await?),
        Command::Start => format!("Session {} started", handle.start().await?),
        Command::Status => describe(&handle.status().await?),
        Command::Retake => format!("Ready for session {}", handle.retake().await?),
        Command::Download => {
            let strip = handle.download().await?;
            format!("Saved {} ({})", strip.path.display(), strip.caption)
        }
        Command::RetryCamera => {
            handle.retry_camera().await?;
            "Camera restarting".to_string()
        }
        Command::Back => {
            handle.back().await?;
            "Left the studio".to_string()
        }
        Command::Help => HELP.to_string(),
        Command::Quit => {
            handle.shutdown().await?;
            return Ok(Flow::Quit);
        }
    };
    Ok(Flow::Continue(text))
}

pub fn describe(snapshot: &StudioSnapshot) -> String {
    let upload = match &snapshot.upload {
        UploadStatus::NotStarted => "not started".to_string(),
        UploadStatus::InFlight => "uploading".to_string(),
        UploadStatus::Finished(outcome) => match outcome.error_message() {
            None => format!("{} of {} stored", outcome.uploaded_count(), outcome.results.len()),
            Some(message) => format!("failed: {message}"),
        },
    };

    format!(
        "session {} | {:?} | filter {} | {} shots | upload {} | camera {:?}",
        snapshot.generation, snapshot.phase, snapshot.filter, snapshot.shots, upload, snapshot.device
    )
}
