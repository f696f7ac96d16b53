use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{OcrAdapter, OcrError};

/// Runs an external recognizer that reads an image on stdin and prints text
///
/// The invocation is `<program> stdin stdout -l <languages>`, which is what
/// tesseract expects.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    languages: String,
}

impl CommandRecognizer {
    pub fn new(program: impl Into<String>, languages: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            languages: languages.into(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.arg("stdin").arg("stdout");
        if !self.languages.is_empty() {
            command.arg("-l").arg(&self.languages);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl OcrAdapter for CommandRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<String, OcrError> {
        let mut child = self.command().spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image).await?;
            stdin.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(OcrError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8(output.stdout)?;
        debug!("{} recognized {} chars", self.program, text.len());
        Ok(text.trim().to_string())
    }

    fn name(&self) -> &str {
        "command"
    }
}
