// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Optional formatting pass over validated text.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::ValidationError;

/// Default limit for an external formatter run.
pub const FORMAT_TIMEOUT: Duration = Duration::from_secs(30);

/// A pure `text -> text` transform.
#[async_trait]
pub trait Formatter: Send + Sync {
    fn name(&self) -> &str;

    async fn format(&self, text: &str) -> Result<String, ValidationError>;
}

/// Leaves text unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopFormatter;

#[async_trait]
impl Formatter for NoopFormatter {
    fn name(&self) -> &str {
        "none"
    }

    async fn format(&self, text: &str) -> Result<String, ValidationError> {
        Ok(text.to_string())
    }
}

/// Pipes text through an external command (e.g. `black -q -`).
#[derive(Debug, Clone)]
pub struct CommandFormatter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFormatter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: FORMAT_TIMEOUT,
        }
    }

    /// Build from a command line split into words. `None` when empty.
    pub fn from_command(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, text: &str) -> Result<String, ValidationError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ValidationError::FormatFailed(format!("Failed to spawn {}: {}", self.program, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ValidationError::FormatFailed("Failed to get stdin".to_string()))?;
        let input = text.to_string();
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(input.as_bytes()).await;
            drop(stdin);
            result
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ValidationError::FormatFailed(e.to_string()))?;
        writer
            .await
            .map_err(|e| ValidationError::FormatFailed(e.to_string()))?
            .map_err(|e| ValidationError::FormatFailed(e.to_string()))?;

        if !output.status.success() {
            return Err(ValidationError::FormatFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|e| ValidationError::FormatFailed(format!("non-UTF-8 output: {}", e)))
    }
}

#[async_trait]
impl Formatter for CommandFormatter {
    fn name(&self) -> &str {
        &self.program
    }

    async fn format(&self, text: &str) -> Result<String, ValidationError> {
        tokio::time::timeout(self.timeout, self.run(text))
            .await
            .map_err(|_| {
                ValidationError::FormatFailed(format!(
                    "{} timed out after {:?}",
                    self.program, self.timeout
                ))
            })?
    }
}
