use assistant_mcp::{AssistantService, Config, McpServer};
use color_eyre::Result;
use tokio::io::BufReader;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Load .env (optional). This allows reading OPENAI_API_KEY from a local .env file.
    // If the file doesn't exist, ignore the error.
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;

    // ログ: stdout はプロトコル専用なので、ファイルと stderr にだけ出す
    let file_appender = rolling::daily(&config.log_dir, "assistant-mcp.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // ファイルにANSIカラー不要
        .with_target(true);
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    let service = AssistantService::from_config(config)?;
    tracing::info!(
        target: "mcp",
        db = ?service.config().db_path,
        model = %service.config().default_model,
        "assistant service ready"
    );

    let server = McpServer::new(service);
    server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await
}
