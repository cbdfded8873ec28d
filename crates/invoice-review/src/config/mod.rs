use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
    pub tasks: TaskRunnerKind,
    pub export: ExportConfig,
    pub files: FileStorageConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let store_kind = StoreKind::parse(
            &env::var("REVIEW_STORE").unwrap_or_else(|_| "memory".to_string()),
        )?;
        let database_path = PathBuf::from(
            env::var("REVIEW_DATABASE_PATH").unwrap_or_else(|_| "invoice-review.db".to_string()),
        );
        let lock_timeout_ms = env::var("REVIEW_LOCK_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidLockTimeout)?;
        let seed_file = env::var("REVIEW_SEED_FILE").ok().map(PathBuf::from);

        let tasks =
            TaskRunnerKind::parse(&env::var("TASK_RUNNER").unwrap_or_else(|_| "queue".to_string()))?;

        let ledger_dir = PathBuf::from(
            env::var("EXPORT_LEDGER_DIR").unwrap_or_else(|_| "exports".to_string()),
        );
        let fields = env::var("EXPORT_FIELDS").ok().and_then(|raw| parse_field_list(&raw));

        let storage_dir = PathBuf::from(
            env::var("FILE_STORAGE_DIR").unwrap_or_else(|_| "invoice-files".to_string()),
        );

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            store: StoreConfig {
                kind: store_kind,
                database_path,
                lock_timeout: Duration::from_millis(lock_timeout_ms),
                seed_file,
            },
            tasks,
            export: ExportConfig { ledger_dir, fields },
            files: FileStorageConfig { storage_dir },
        })
    }
}

fn parse_field_list(raw: &str) -> Option<Vec<String>> {
    let fields: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(str::to_string)
        .collect();
    if fields.is_empty() {
        None
    } else {
        Some(fields)
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Backing store for submissions, assignments and comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl StoreKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(ConfigError::InvalidStoreKind(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub database_path: PathBuf,
    /// Upper bound on how long a workflow operation waits for the submission lock.
    pub lock_timeout: Duration,
    /// JSON file of memberships and export connections loaded at startup.
    pub seed_file: Option<PathBuf>,
}

/// How background jobs (extraction processing) are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRunnerKind {
    Inline,
    Queue,
}

impl TaskRunnerKind {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" | "sync" => Ok(Self::Inline),
            "queue" | "async" => Ok(Self::Queue),
            other => Err(ConfigError::InvalidTaskRunner(other.to_string())),
        }
    }
}

/// Destination of approved invoice rows.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub ledger_dir: PathBuf,
    /// Column order for exported rows; `None` exports every invoice key.
    pub fields: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct FileStorageConfig {
    pub storage_dir: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidStoreKind(String),
    InvalidTaskRunner(String),
    InvalidLockTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStoreKind(value) => {
                write!(f, "REVIEW_STORE must be 'memory' or 'sqlite' (found '{value}')")
            }
            ConfigError::InvalidTaskRunner(value) => {
                write!(f, "TASK_RUNNER must be 'inline' or 'queue' (found '{value}')")
            }
            ConfigError::InvalidLockTimeout => {
                write!(f, "REVIEW_LOCK_TIMEOUT_MS must be a whole number of milliseconds")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidStoreKind(_)
            | ConfigError::InvalidTaskRunner(_)
            | ConfigError::InvalidLockTimeout => None,
        }
    }
}

/// Serialises tests that read or write process environment variables.
#[cfg(test)]
pub(crate) fn env_guard() -> &'static std::sync::Mutex<()> {
    static GUARD: std::sync::OnceLock<std::sync::Mutex<()>> = std::sync::OnceLock::new();
    GUARD.get_or_init(|| std::sync::Mutex::new(()))
}
