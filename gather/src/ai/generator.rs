//! Query generation backends.

use super::prompt::{analysis_prompt, extract_query, fix_prompt, generation_prompt};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Program invoked by [`ClaudeCli`].
pub const CLAUDE_PROGRAM: &str = "claude";

/// Errors raised by a generator or analyzer.
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// The backend program is not installed.
    #[error("'{0}' command not found in PATH. Please install Claude CLI")]
    NotFound(String),

    /// The backend could not be started.
    #[error("failed to execute {program}: {source}")]
    Spawn {
        /// Program that failed.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The backend exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program that failed.
        program: String,
        /// Exit status.
        status: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The backend produced no usable answer.
    #[error("generator returned an empty response")]
    Empty,
}

/// Turns questions into queries.
#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Generates a query answering `question`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn generate(&self, question: &str, known_tables: &[&str]) -> Result<String, GeneratorError>;

    /// Repairs a query the server rejected.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn fix(
        &self,
        question: &str,
        failed_query: &str,
        error: &str,
        known_tables: &[&str],
    ) -> Result<String, GeneratorError>;
}

/// Summarizes query results.
#[async_trait]
pub trait ResultAnalyzer: Send + Sync {
    /// Analyzes the result files under `results_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    async fn analyze(
        &self,
        question: &str,
        query: &str,
        results_dir: &Path,
    ) -> Result<String, GeneratorError>;
}

/// Backend that shells out to the `claude` command with the prompt as argument.
#[derive(Debug, Clone)]
pub struct ClaudeCli {
    program: PathBuf,
}

impl ClaudeCli {
    /// Finds `claude` on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::NotFound`] if it is not installed.
    pub fn locate() -> Result<Self, GeneratorError> {
        Self::locate_program(CLAUDE_PROGRAM)
    }

    /// Finds the named program on `PATH`.
    ///
    /// # Errors
    ///
    /// Returns [`GeneratorError::NotFound`] if no directory on `PATH` holds it.
    pub fn locate_program(name: &str) -> Result<Self, GeneratorError> {
        let path = std::env::var_os("PATH").unwrap_or_default();
        std::env::split_paths(&path)
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
            .map(Self::with_program)
            .ok_or_else(|| GeneratorError::NotFound(name.to_string()))
    }

    /// Uses an explicit program path.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Returns the program that is invoked.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn ask(&self, prompt: &str) -> Result<String, GeneratorError> {
        let program = self.program.display().to_string();
        let output = Command::new(&self.program)
            .arg(prompt)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GeneratorError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(GeneratorError::Failed {
                program,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn ask_for_query(&self, prompt: &str) -> Result<String, GeneratorError> {
        let query = extract_query(&self.ask(prompt).await?);
        if query.is_empty() {
            return Err(GeneratorError::Empty);
        }
        Ok(query)
    }
}

#[async_trait]
impl QueryGenerator for ClaudeCli {
    async fn generate(&self, question: &str, known_tables: &[&str]) -> Result<String, GeneratorError> {
        self.ask_for_query(&generation_prompt(question, known_tables))
            .await
    }

    async fn fix(
        &self,
        question: &str,
        failed_query: &str,
        error: &str,
        known_tables: &[&str],
    ) -> Result<String, GeneratorError> {
        self.ask_for_query(&fix_prompt(question, failed_query, error, known_tables))
            .await
    }
}

#[async_trait]
impl ResultAnalyzer for ClaudeCli {
    async fn analyze(
        &self,
        question: &str,
        query: &str,
        results_dir: &Path,
    ) -> Result<String, GeneratorError> {
        self.ask(&analysis_prompt(
            question,
            query,
            &results_dir.display().to_string(),
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_missing_program() {
        let err = ClaudeCli::locate_program("definitely-not-installed-4242").unwrap_err();
        assert!(matches!(err, GeneratorError::NotFound(name) if name == "definitely-not-installed-4242"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ask_runs_program_with_prompt() {
        // `echo` prints its argument, so the prompt comes back as the reply.
        let cli = ClaudeCli::with_program("echo");
        let reply = cli.ask("{\"kql\": \"Perf | take 1\"}").await.unwrap();
        assert_eq!(extract_query(&reply), "Perf | take 1");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_program() {
        let err = ClaudeCli::with_program("false").ask("x").await.unwrap_err();
        assert!(matches!(err, GeneratorError::Failed { .. }));
    }
}
