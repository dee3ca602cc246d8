use anyhow::Result;
use immersive_app::{parse_cli_flags, print_cli_help, run_command_loop, PlayerRuntime};
use tokio::io::BufReader;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();
    let cli = parse_cli_flags(std::env::args().skip(1))?;
    if cli.help {
        print_cli_help();
        return Ok(());
    }

    let config = match cli.config_path.as_deref() {
        Some(path) => immersive_config::load_from_path(path)?,
        None => immersive_config::load_from_env()?,
    };
    tracing::info!(
        general = config.catalogs.general.len(),
        special = config.catalogs.special.len(),
        mode = %config.session.mode,
        "immersive player starting"
    );

    let runtime = PlayerRuntime::new(&config, &cli);
    run_command_loop(
        &runtime,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    let perf = runtime.manager().perf_snapshot();
    tracing::info!(
        attempts = perf.attempts_total,
        sessions = perf.sessions_granted_total,
        "immersive player exiting"
    );
    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();
}
