use crate::config::{BuilderConfig, PathsConfig};
use crate::error::{GatewayError, Result};
use crate::process::{diagnostics, run_captured};
use crate::types::IndexCreationRequest;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

pub const DOCUMENT_SOURCE: &str = "document";

/// A fully resolved call of the external index builder.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

impl BuildInvocation {
    /// Only document sources can be built; any request without one is an
    /// unsupported combination.
    pub fn for_request(
        builder: &BuilderConfig,
        paths: &PathsConfig,
        request: &IndexCreationRequest,
        index_path: &Path,
    ) -> Result<Self> {
        if !request.data_sources.iter().any(|s| s == DOCUMENT_SOURCE) {
            return Err(GatewayError::UnsupportedInput(
                "Unsupported data source combination".to_string(),
            ));
        }

        let mut args = builder.args.clone();
        args.extend([
            "--data-dir".to_string(),
            paths.data_dir.display().to_string(),
            "--index-path".to_string(),
            index_path.display().to_string(),
            "--embedding-model".to_string(),
            request.embedding_model.clone(),
            "--backend".to_string(),
            request.backend.clone(),
            "--chunk-size".to_string(),
            request.chunk_size.to_string(),
            "--chunk-overlap".to_string(),
            request.chunk_overlap.to_string(),
        ]);

        Ok(Self {
            program: builder.program.clone(),
            args,
            working_dir: paths.project_root.clone(),
            timeout: Duration::from_secs(builder.timeout_secs),
        })
    }
}

#[async_trait]
pub trait BuildRunner: Send + Sync {
    async fn run(&self, invocation: &BuildInvocation) -> Result<()>;
}

/// Runs the builder as a child process. Dropping the returned future kills
/// the child.
#[derive(Debug, Clone, Default)]
pub struct ProcessBuildRunner;

#[async_trait]
impl BuildRunner for ProcessBuildRunner {
    async fn run(&self, invocation: &BuildInvocation) -> Result<()> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .current_dir(&invocation.working_dir);

        tracing::info!(
            "Running builder: {} {}",
            invocation.program,
            invocation.args.join(" ")
        );

        let output = run_captured(command, invocation.timeout)
            .await
            .map_err(|e| {
                GatewayError::BuildFailed(format!(
                    "could not start '{}': {}",
                    invocation.program, e
                ))
            })?
            .ok_or(GatewayError::BuildTimeout(invocation.timeout.as_secs()))?;

        if !output.status.success() {
            return Err(GatewayError::BuildFailed(diagnostics(&output)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(sources: &[&str]) -> IndexCreationRequest {
        IndexCreationRequest {
            name: "test1".to_string(),
            data_sources: sources.iter().map(|s| s.to_string()).collect(),
            embedding_model: "facebook/contriever".to_string(),
            backend: "hnsw".to_string(),
            chunk_size: 256,
            chunk_overlap: 32,
        }
    }

    #[test]
    fn test_invocation_arguments() {
        let builder = BuilderConfig::default();
        let mut paths = PathsConfig::default();
        paths.project_root = PathBuf::from("/srv/leann");

        let invocation = BuildInvocation::for_request(
            &builder,
            &paths,
            &request(&["document", "email"]),
            Path::new("/srv/leann/indices/test1"),
        )
        .unwrap();

        assert_eq!(invocation.program, "python3");
        assert_eq!(invocation.working_dir, PathBuf::from("/srv/leann"));
        assert_eq!(invocation.timeout, Duration::from_secs(600));
        assert_eq!(
            invocation.args,
            vec![
                "-m",
                "apps.document_rag",
                "--data-dir",
                "./data",
                "--index-path",
                "/srv/leann/indices/test1",
                "--embedding-model",
                "facebook/contriever",
                "--backend",
                "hnsw",
                "--chunk-size",
                "256",
                "--chunk-overlap",
                "32",
            ]
        );
    }

    #[test]
    fn test_unsupported_sources() {
        let result = BuildInvocation::for_request(
            &BuilderConfig::default(),
            &PathsConfig::default(),
            &request(&["email", "wechat"]),
            Path::new("indices/test1"),
        );
        match result {
            Err(GatewayError::UnsupportedInput(message)) => {
                assert_eq!(message, "Unsupported data source combination")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[cfg(unix)]
    fn shell(script: &str, timeout: Duration) -> BuildInvocation {
        BuildInvocation {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            working_dir: std::env::temp_dir(),
            timeout,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_success() {
        let runner = ProcessBuildRunner;
        assert!(runner.run(&shell("exit 0", Duration::from_secs(5))).await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_failure_message() {
        let runner = ProcessBuildRunner;
        let err = runner
            .run(&shell("echo 'model not found' >&2; exit 1", Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Index creation failed: model not found");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_runner_timeout() {
        let runner = ProcessBuildRunner;
        let err = runner
            .run(&shell("sleep 5", Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::BuildTimeout(_)));
    }

    #[tokio::test]
    async fn test_process_runner_missing_program() {
        let runner = ProcessBuildRunner;
        let invocation = BuildInvocation {
            program: "/definitely/not/a/builder".to_string(),
            args: Vec::new(),
            working_dir: std::env::temp_dir(),
            timeout: Duration::from_secs(1),
        };
        assert!(matches!(
            runner.run(&invocation).await,
            Err(GatewayError::BuildFailed(_))
        ));
    }
}
