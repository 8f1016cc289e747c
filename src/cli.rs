//! Command Line Interface (CLI) arguments.

use clap::Parser;

/// simstage command line interface
#[derive(Clone, Debug, Parser)]
pub struct CommandLineArgs {
    /// The IP address on which the server should listen
    #[arg(long, default_value = "0.0.0.0", env = "SIMSTAGE_HOST")]
    pub host: String,
    /// The port to which the server should bind
    #[arg(long, default_value_t = 5000, env = "SIMSTAGE_PORT")]
    pub port: u16,
    /// Flag indicating whether HTTPS should be used
    #[arg(long, default_value_t = false, env = "SIMSTAGE_HTTPS")]
    pub https: bool,
    /// Path to the certificate file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/simstage/certs/cert.pem",
        env = "SIMSTAGE_CERT_FILE"
    )]
    pub cert_file: String,
    /// Path to the key file to be used for HTTPS encryption
    #[arg(
        long,
        default_value = "~/.config/simstage/certs/key.pem",
        env = "SIMSTAGE_KEY_FILE"
    )]
    pub key_file: String,
    /// Maximum time in seconds to wait for operations to complete upon receiving `ctrl+c` signal.
    #[arg(long, default_value_t = 60, env = "SIMSTAGE_SHUTDOWN_TIMEOUT")]
    pub graceful_shutdown_timeout: u64,
    /// Whether to enable sending traces to Jaeger.
    #[arg(long, default_value_t = false, env = "SIMSTAGE_ENABLE_JAEGER")]
    pub enable_jaeger: bool,
    /// Base URL of the Girder REST API
    #[arg(
        long,
        default_value = "http://localhost:8080/api/v1/",
        env = "GIRDER_API_URL"
    )]
    pub girder_api_url: url::Url,
    /// Origin allowed by the CORS policy, or `*` for any origin
    #[arg(long, default_value = "*", env = "CORS_DOMAIN")]
    pub cors_domain: String,
    /// Directory in which per-request scratch space is created. Defaults to the system temporary
    /// directory.
    #[arg(long, env = "SIMSTAGE_SCRATCH_DIR")]
    pub scratch_dir: Option<std::path::PathBuf>,
    /// Glob pattern locating the container file beneath an extracted timestep archive
    #[arg(long, default_value = "**/*.nc", env = "SIMSTAGE_CONTAINER_PATTERN")]
    pub container_pattern: String,
    /// Path or name of the ffmpeg executable
    #[arg(long, default_value = "ffmpeg", env = "SIMSTAGE_FFMPEG")]
    pub ffmpeg: String,
    /// Default movie frame rate in frames per second
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=120), env = "SIMSTAGE_FRAMERATE")]
    pub framerate: u32,
    /// Maximum time in seconds allowed for one encoder run. Zero disables the limit.
    #[arg(long, default_value_t = 300, env = "SIMSTAGE_TRANSCODE_TIMEOUT")]
    pub transcode_timeout: u64,
    /// Maximum number of concurrent connections to the asset store
    #[arg(long, env = "SIMSTAGE_CONNECTION_LIMIT")]
    pub connection_limit: Option<usize>,
    /// Maximum number of concurrent encoder processes
    #[arg(long, env = "SIMSTAGE_TRANSCODE_LIMIT")]
    pub transcode_limit: Option<usize>,
    /// Maximum number of threads to use for decoding containers. Defaults to one less than the
    /// number of CPUs.
    #[arg(long, env = "SIMSTAGE_THREAD_LIMIT")]
    pub thread_limit: Option<usize>,
    /// Whether to use Rayon for execution of CPU-bound tasks.
    #[arg(long, default_value_t = false, env = "SIMSTAGE_USE_RAYON")]
    pub use_rayon: bool,
}

impl CommandLineArgs {
    /// Encoder timeout, or `None` when disabled.
    pub fn transcode_timeout(&self) -> Option<std::time::Duration> {
        (self.transcode_timeout > 0).then(|| std::time::Duration::from_secs(self.transcode_timeout))
    }
}

/// Returns parsed command line arguments.
pub fn parse() -> CommandLineArgs {
    CommandLineArgs::parse()
}
