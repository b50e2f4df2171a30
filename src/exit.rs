//! Run outcomes and process exit codes
//!
//! `main` returns whatever [`report`] maps an outcome to; nothing else
//! on the deploy path ends the process.

use std::io::Write;

use crate::ui;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Success,
    UserError { message: String, code: u8 },
    FatalError { message: String, code: u8 },
    /// A termination decided elsewhere, reported unchanged
    Exit { message: Option<String>, code: u8 },
}

impl RunOutcome {
    pub fn fatal(message: impl Into<String>, code: u8) -> Self {
        Self::FatalError {
            message: message.into(),
            code,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::UserError { code, .. }
            | Self::FatalError { code, .. }
            | Self::Exit { code, .. } => *code,
        }
    }
}

/// Print the user-facing message for `outcome` and return its exit code
pub fn report(outcome: &RunOutcome, out: &mut dyn Write, err: &mut dyn Write) -> u8 {
    let written = match outcome {
        RunOutcome::Success => Ok(()),
        RunOutcome::UserError { message, .. } => ui::plain(out, message),
        RunOutcome::FatalError { message, .. } => {
            log::error!("{message}");
            ui::fatal(err, message)
        }
        RunOutcome::Exit { message, .. } => match message {
            Some(message) => ui::info(out, message),
            None => Ok(()),
        },
    };
    if let Err(e) = written {
        log::warn!("Could not write exit message: {e}");
    }
    outcome.code()
}
