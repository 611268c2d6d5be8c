//! Tollgate binary: CLI, configuration, gateway startup.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use tollgate::{
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::CheckConfig) => check_config(&cli),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Apply CLI overrides to a loaded configuration.
fn apply_cli_overrides(config: &mut Config, cli: &Cli) {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
}

/// Load and validate the configuration, printing a summary.
fn check_config(cli: &Cli) -> ExitCode {
    match Config::load(cli.config.as_deref()) {
        Ok(config) => {
            println!(
                "Configuration OK: {} API(s), listening on {}:{}",
                config.apis.len(),
                config.server.host,
                config.server.port
            );
            for api in &config.apis {
                println!(
                    "  {} -> {} (oauth2: {}, hmac: {})",
                    api.proxy.listen_path,
                    api.proxy.target_url,
                    api.use_oauth2,
                    api.enable_signature_checking
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Configuration invalid: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the gateway server.
async fn run_server(cli: Cli) -> ExitCode {
    let config = match Config::load(cli.config.as_deref()) {
        Ok(mut config) => {
            apply_cli_overrides(&mut config, &cli);
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        apis = config.apis.len(),
        "Starting gateway"
    );

    let gateway = match Gateway::new(config).await {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cli(port: Option<u16>, host: Option<String>) -> Cli {
        Cli {
            config: None,
            port,
            host,
            log_level: "info".to_string(),
            log_format: None,
            command: None,
        }
    }

    #[test]
    fn apply_cli_overrides_no_overrides_preserves_defaults() {
        let mut config = Config::default();
        let original_port = config.server.port;
        let original_host = config.server.host.clone();

        apply_cli_overrides(&mut config, &make_cli(None, None));

        assert_eq!(config.server.port, original_port);
        assert_eq!(config.server.host, original_host);
    }

    #[test]
    fn apply_cli_overrides_port_override() {
        let mut config = Config::default();
        apply_cli_overrides(&mut config, &make_cli(Some(9999), None));
        assert_eq!(config.server.port, 9999);
    }

    #[test]
    fn apply_cli_overrides_host_override() {
        let mut config = Config::default();
        apply_cli_overrides(&mut config, &make_cli(None, Some("0.0.0.0".to_string())));
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn apply_cli_overrides_all_at_once() {
        let mut config = Config::default();
        apply_cli_overrides(
            &mut config,
            &make_cli(Some(8081), Some("192.168.1.1".to_string())),
        );
        assert_eq!(config.server.port, 8081);
        assert_eq!(config.server.host, "192.168.1.1");
    }
}
