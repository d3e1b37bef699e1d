//! Text-to-speech output.

use std::process::Command;

use crate::error::{Error, Result};

/// Blocking speech sink: `speak` returns only after playback finished.
///
/// The loop relies on this so the microphone never reopens while the
/// assistant is still talking.
pub trait Speaker: Send {
    /// Speaks `text` to completion.
    ///
    /// # Errors
    /// Returns an error if `text` is empty or synthesis fails.
    fn speak(&mut self, text: &str) -> Result<()>;
}

/// Speaks through an external program (`say`, `espeak-ng`, ...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    /// Uses `program args... <text>` for every utterance.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// macOS `say`, or `espeak-ng` with the Brazilian Portuguese voice elsewhere.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::new("say", Vec::new())
        } else {
            Self::new("espeak-ng", vec!["-v".into(), "pt-br".into()])
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            return Err(Error::Speech("cannot speak empty text".into()));
        }
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .status()?;
        if !status.success() {
            return Err(Error::Speech(format!("{} exited with {status}", self.program)));
        }
        Ok(())
    }
}
