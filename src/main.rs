use anyhow::Result;
use clap::{Parser, Subcommand};
use mockbox::cli::{RuntimeAction, runtime, setup};
use mockbox::infra::config::default_config_dir;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "mockbox",
    about = "Sobe e gerencia o Microcks e seus serviços em containers locais"
)]
struct Cli {
    /// Diretório de configuração (default: ~/.config/mockbox)
    #[arg(long, env = "MOCKBOX_CONFIG_DIR", default_value_os_t = default_config_dir())]
    config_dir: std::path::PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepara mockbox.toml e o diretório da extensão
    Init,
    #[command(flatten)]
    Runtime(RuntimeAction),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => setup::install(&cli.config_dir),
        Commands::Runtime(action) => runtime::run(action, &cli.config_dir).await,
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
