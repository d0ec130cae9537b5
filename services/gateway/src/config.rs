use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub paths: PathsConfig,
    pub builder: BuilderConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The one frontend origin allowed to call the API cross-origin.
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origin: "http://localhost:3000".to_string(),
        }
    }
}

/// Filesystem layout. Relative paths resolve against `project_root`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub project_root: PathBuf,
    /// Where newly built indices are written.
    pub indices_dir: PathBuf,
    /// Roots scanned, in order, for an index to load at startup.
    pub lookup_dirs: Vec<PathBuf>,
    /// Roots scanned for `GET /api/indices`.
    pub listing_dirs: Vec<PathBuf>,
    /// Data directory handed to the index builder.
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            project_root: PathBuf::from("."),
            indices_dir: PathBuf::from("indices"),
            lookup_dirs: vec![
                PathBuf::from("indices"),
                PathBuf::from("demo/indices"),
                PathBuf::from("examples"),
                PathBuf::from("."),
            ],
            listing_dirs: vec![
                PathBuf::from("indices"),
                PathBuf::from("demo/indices"),
                PathBuf::from("examples"),
            ],
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl PathsConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn indices_root(&self) -> PathBuf {
        self.resolve(&self.indices_dir)
    }

    pub fn lookup_roots(&self) -> Vec<PathBuf> {
        self.lookup_dirs.iter().map(|p| self.resolve(p)).collect()
    }

    pub fn listing_roots(&self) -> Vec<PathBuf> {
        self.listing_dirs.iter().map(|p| self.resolve(p)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    pub program: String,
    /// Arguments placed before the per-build flags.
    pub args: Vec<String>,
    pub timeout_secs: u64,
    pub max_concurrent_builds: usize,
    /// Remove a half-built index directory when its build fails.
    pub cleanup_on_failure: bool,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        BuilderConfig {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "apps.document_rag".to_string()],
            timeout_secs: 600,
            max_concurrent_builds: 2,
            cleanup_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            program: "python3".to_string(),
            args: vec!["-m".to_string(), "leann.search_json".to_string()],
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Loads `GATEWAY_CONFIG` if set, then applies environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let base = match std::env::var("GATEWAY_CONFIG") {
            Ok(path) => Config::from_file(&path)?,
            Err(_) => Config::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> anyhow::Result<Self> {
        if let Ok(host) = std::env::var("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            self.server.port = port.parse()?;
        }
        if let Ok(origin) = std::env::var("GATEWAY_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Ok(root) = std::env::var("GATEWAY_PROJECT_ROOT") {
            self.paths.project_root = PathBuf::from(root);
        }
        if let Ok(program) = std::env::var("GATEWAY_BUILDER_PROGRAM") {
            self.builder.program = program;
        }
        if let Ok(timeout) = std::env::var("GATEWAY_BUILD_TIMEOUT_SECS") {
            self.builder.timeout_secs = timeout.parse()?;
        }
        if let Ok(limit) = std::env::var("GATEWAY_MAX_CONCURRENT_BUILDS") {
            self.builder.max_concurrent_builds = limit.parse()?;
        }
        if let Ok(program) = std::env::var("GATEWAY_SEARCH_PROGRAM") {
            self.engine.program = program;
        }
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("server.port must be non-zero");
        }
        if self.builder.max_concurrent_builds == 0 {
            anyhow::bail!("builder.max_concurrent_builds must be at least 1");
        }
        if self.builder.timeout_secs == 0 || self.engine.timeout_secs == 0 {
            anyhow::bail!("timeouts must be non-zero");
        }
        if self.builder.program.trim().is_empty() {
            anyhow::bail!("builder.program must be set");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.cors_origin, "http://localhost:3000");
        assert_eq!(config.builder.timeout_secs, 600);
    }

    #[test]
    fn test_paths_resolve_against_root() {
        let mut paths = PathsConfig::default();
        paths.project_root = PathBuf::from("/srv/leann");
        assert_eq!(paths.indices_root(), PathBuf::from("/srv/leann/indices"));
        assert_eq!(paths.lookup_roots().len(), 4);
        assert_eq!(paths.listing_roots().len(), 3);
        assert_eq!(
            paths.resolve(Path::new("/abs/dir")),
            PathBuf::from("/abs/dir")
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9100

            [builder]
            max_concurrent_builds = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.builder.max_concurrent_builds, 4);
        assert_eq!(config.builder.timeout_secs, 600);
        assert!(config.builder.cleanup_on_failure);
    }

    #[test]
    fn test_example_file_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.toml");
        let config = Config::from_file(path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.paths.lookup_dirs.len(), 4);
        assert_eq!(config.engine.timeout_secs, 120);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.builder.max_concurrent_builds = 0;
        assert!(config.validate().is_err());
    }
}
