//! Slow path: local agent subprocess

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use super::scrape::AgentOutputCleaner;
use super::{ReplyRequest, ReplySource, ResponseBackend};
use crate::config::AgentConfig;
use crate::{Error, Result};

/// Runs the agent CLI once per command
#[derive(Debug, Clone)]
pub struct AgentBackend {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    to: Option<String>,
    timeout: Duration,
    cleaner: AgentOutputCleaner,
}

impl AgentBackend {
    /// Create the fallback backend from configuration
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            dir: config.dir.clone(),
            to: config.to.clone(),
            timeout: config.timeout,
            cleaner: AgentOutputCleaner,
        }
    }

    /// Full argument list for a message
    #[must_use]
    pub fn command_args(&self, message: &str) -> Vec<String> {
        let mut args = self.args.clone();
        args.push("--message".to_string());
        args.push(message.to_string());
        if let Some(to) = &self.to {
            args.push("--to".to_string());
            args.push(to.clone());
        }
        args
    }
}

#[async_trait]
impl ResponseBackend for AgentBackend {
    fn name(&self) -> &str {
        "agent"
    }

    fn source(&self) -> ReplySource {
        ReplySource::Fallback
    }

    async fn reply(&self, request: &ReplyRequest<'_>) -> Result<String> {
        let mut command = Command::new(&self.program);
        command
            .args(self.command_args(request.command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        tracing::debug!(program = %self.program, "running agent");

        let child = command
            .spawn()
            .map_err(|e| Error::Agent(format!("failed to spawn {}: {e}", self.program)))?;

        // Wait for completion with timeout; dropping the child kills it
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::Agent(format!("agent timed out after {:?}", self.timeout)))??;

        if !output.stderr.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!(stderr = %stderr.trim(), "agent stderr");
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            return Err(Error::Agent(format!("agent exited with code {code}")));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        self.cleaner
            .clean(&stdout)
            .ok_or_else(|| Error::Agent("no reply in agent output".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(to: Option<&str>) -> AgentConfig {
        AgentConfig {
            program: "node".to_string(),
            args: vec!["scripts/run-node.mjs".to_string(), "agent".to_string()],
            dir: None,
            to: to.map(str::to_string),
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_command_args_with_destination() {
        let backend = AgentBackend::new(&config(Some("+15550100")));
        assert_eq!(
            backend.command_args("what's up"),
            vec![
                "scripts/run-node.mjs",
                "agent",
                "--message",
                "what's up",
                "--to",
                "+15550100"
            ]
        );
    }

    #[test]
    fn test_command_args_without_destination() {
        let backend = AgentBackend::new(&config(None));
        assert_eq!(
            backend.command_args("hi"),
            vec!["scripts/run-node.mjs", "agent", "--message", "hi"]
        );
    }
}
