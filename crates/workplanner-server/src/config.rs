//! Command-line and environment configuration.

use std::path::PathBuf;

use clap::Args;

use workplanner_core::settings::DEFAULT_RPC_WORKERS;
use workplanner_core::Settings;

/// Settings shared by every subcommand. Each flag falls back to an
/// environment variable, then to a default.
#[derive(Args, Debug, Clone)]
pub struct SettingsArgs {
    /// SQLite database (`sqlite://path` or a plain path).
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://workplanner.db")]
    pub database_url: String,

    /// Root directory for generated chart images.
    #[arg(long, env = "WORKPLANNER_DIAGRAMS_PATH", default_value = "out/diagrams")]
    pub diagrams_path: PathBuf,

    /// Directory containing `report.html`.
    #[arg(long, env = "WORKPLANNER_TEMPLATES_PATH", default_value = "templates")]
    pub templates_path: PathBuf,

    /// Root directory for generated PDFs.
    #[arg(long, env = "WORKPLANNER_PDF_PATH", default_value = "out/pdf")]
    pub pdf_path: PathBuf,

    /// Directory holding the TrueType faces of `--font-family`.
    #[arg(
        long,
        env = "WORKPLANNER_FONTS_PATH",
        default_value = "/usr/share/fonts/truetype/liberation"
    )]
    pub fonts_path: PathBuf,

    /// Font family; files are looked up as `{family}-Regular.ttf` etc.
    #[arg(long, env = "WORKPLANNER_FONT_FAMILY", default_value = "LiberationSans")]
    pub font_family: String,

    /// Shared bearer secret. Without it every report call is rejected.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    #[arg(long, env = "WORKPLANNER_RPC_HOST", default_value = "127.0.0.1")]
    pub rpc_host: String,

    #[arg(long, env = "WORKPLANNER_RPC_PORT", default_value_t = 50051)]
    pub rpc_port: u16,

    #[arg(long, env = "WORKPLANNER_HTTP_HOST", default_value = "127.0.0.1")]
    pub http_host: String,

    #[arg(long, env = "WORKPLANNER_HTTP_PORT", default_value_t = 8000)]
    pub http_port: u16,

    /// Concurrent RPC calls building reports.
    #[arg(long, env = "WORKPLANNER_RPC_WORKERS", default_value_t = DEFAULT_RPC_WORKERS)]
    pub rpc_workers: usize,

    /// Managers built in parallel by the all-managers operation.
    #[arg(long, env = "WORKPLANNER_BATCH_PARALLELISM", default_value_t = 4)]
    pub batch_parallelism: usize,
}

impl SettingsArgs {
    pub fn into_settings(self) -> Settings {
        Settings {
            database_url: self.database_url,
            diagrams_path: self.diagrams_path,
            templates_path: self.templates_path,
            pdf_path: self.pdf_path,
            fonts_path: self.fonts_path,
            font_family: self.font_family,
            api_key: self.api_key,
            rpc_host: self.rpc_host,
            rpc_port: self.rpc_port,
            http_host: self.http_host,
            http_port: self.http_port,
            rpc_workers: self.rpc_workers,
            batch_parallelism: self.batch_parallelism,
        }
    }
}
