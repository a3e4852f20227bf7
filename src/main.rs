use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use httpreplay::server::ReplayServerBuilder;

/// Holds command line parameters provided by the user.
#[derive(Parser, Debug)]
#[clap(version, about = "Deterministic HTTP interaction replay server")]
struct ExecutionParameters {
    #[clap(short, long, env = "REPLAY_PORT", default_value = "5050")]
    pub port: u16,
    #[clap(short, long, env = "REPLAY_EXPOSE")]
    pub expose: bool,
    /// Directory holding the recorded interaction files (YAML or JSON).
    #[clap(short, long, env = "REPLAY_TRIPS_DIR")]
    pub trips_dir: PathBuf,
    /// Ordered key names the request identity is built from.
    #[clap(
        short = 'k',
        long,
        env = "REPLAY_INDEX_KEYS",
        value_delimiter = ',',
        default_value = "URL,Method"
    )]
    pub index_keys: Vec<String>,
    #[clap(short, long, env = "REPLAY_DISABLE_ACCESS_LOG")]
    pub disable_access_log: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("httpreplay=info")),
        )
        .init();

    let params: ExecutionParameters = ExecutionParameters::parse();

    tracing::info!(
        "Starting {} server V{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("{params:?}");

    let server = match ReplayServerBuilder::new()
        .port(params.port)
        .expose(params.expose)
        .trips_dir(params.trips_dir)
        .index_keys(params.index_keys)
        .print_access_log(!params.disable_access_log)
        .build()
    {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let handle = match server.start().await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("failed to start replay server: {}", e);
            std::process::exit(1);
        }
    };

    // The server terminates itself once every recorded trip is consumed.
    handle.wait().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_params_parsing() {
        let params = ExecutionParameters::try_parse_from(&[
            "httpreplay",
            "--trips-dir",
            "recordings/",
        ])
        .unwrap();
        assert_eq!(params.port, 5050);
        assert_eq!(params.index_keys, vec!["URL", "Method"]);
        assert!(!params.expose);
        assert!(!params.disable_access_log);

        let params = ExecutionParameters::try_parse_from(&[
            "httpreplay",
            "-t",
            "recordings/",
            "-p",
            "8085",
            "-k",
            "URL,Method,Body",
        ])
        .unwrap();
        assert_eq!(params.port, 8085);
        assert_eq!(params.index_keys, vec!["URL", "Method", "Body"]);
    }

    #[test]
    fn test_missing_trips_dir_is_rejected() {
        assert!(ExecutionParameters::try_parse_from(&["httpreplay"]).is_err());
    }
}
