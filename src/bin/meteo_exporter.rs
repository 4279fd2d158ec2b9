// meteo_exporter - Prometheus metrics exporter for the Meteo-France observation API
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use meteo_exporter::client::{AuthenticatedClient, HttpOptions};
use meteo_exporter::http::RequestContext;
use meteo_exporter::metrics::StationMetrics;
use meteo_exporter::poll::Poller;
use meteo_exporter::secrets::{Credentials, InfisicalClient, SecretScope, UniversalAuth, SECRET_PATH};
use meteo_exporter::station::{StationFetcher, DEFAULT_API_URL};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_IP: [u8; 4] = [0, 0, 0, 0];
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_POLLING_SECS: u64 = 30;
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;

#[derive(Debug, Parser)]
#[clap(name = "meteo_exporter", version = clap::crate_version!())]
struct MeteoExporterApplication {
    /// Base URL of the Infisical instance holding Meteo-France credentials
    #[clap(long, env = "INFISICAL_URL")]
    infisical_url: String,

    /// Infisical environment slug to read secrets from (e.g. 'prod')
    #[clap(long, env = "INFISICAL_ENV")]
    infisical_env: String,

    /// Infisical project ID to read secrets from
    #[clap(long, env = "INFISICAL_PROJECT_ID")]
    infisical_project_id: String,

    /// Client ID of the Infisical machine identity (universal auth)
    #[clap(long, env = "INFISICAL_CLIENT_ID")]
    infisical_client_id: String,

    /// Client secret of the Infisical machine identity (universal auth)
    #[clap(long, env = "INFISICAL_CLIENT_SECRET", hide_env_values = true)]
    infisical_client_secret: String,

    /// Fetch observations from the Meteo-France API at this interval, in seconds.
    #[clap(long, env = "POLLING_INTERVAL_SECONDS", default_value_t = DEFAULT_POLLING_SECS)]
    polling_interval_seconds: u64,

    /// Port to expose metrics on, on all interfaces.
    #[clap(long, env = "EXPORTER_PORT", default_value_t = DEFAULT_PORT)]
    exporter_port: u16,

    /// Timeout for each request to Infisical or the Meteo-France API, in milliseconds.
    #[clap(long, env = "TIMEOUT_MILLIS", default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Accept invalid TLS certificates from the Meteo-France API and token endpoint. The
    /// API has historically required this; set to 'false' to verify certificates.
    #[clap(long, env = "ACCEPT_INVALID_CERTS", default_value_t = true, action = clap::ArgAction::Set)]
    accept_invalid_certs: bool,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, env = "LOG_LEVEL", default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = MeteoExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let timeout = Duration::from_millis(opts.timeout_millis);
    let secrets_client = HttpOptions {
        timeout,
        accept_invalid_certs: false,
        follow_redirects: true,
    }
    .build()
    .unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let infisical = InfisicalClient::new(secrets_client, &opts.infisical_url).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize secret store client", error = %e);
        process::exit(1)
    });

    let auth = UniversalAuth {
        client_id: opts.infisical_client_id.clone(),
        client_secret: opts.infisical_client_secret.clone(),
    };
    let scope = SecretScope {
        project_id: opts.infisical_project_id.clone(),
        environment: opts.infisical_env.clone(),
        path: SECRET_PATH.to_owned(),
    };

    // Secrets are only read once. Rotating them requires a restart.
    let secrets = infisical.secrets(&auth, &scope).await.unwrap_or_else(|e| {
        tracing::error!(message = "failed to fetch secrets", infisical_url = %opts.infisical_url, error = %e);
        process::exit(1)
    });

    let creds = Credentials::from_secrets(&secrets).unwrap_or_else(|e| {
        tracing::error!(message = "invalid secrets", path = SECRET_PATH, error = %e);
        process::exit(1)
    });
    tracing::debug!(message = "loaded credentials", credentials = ?creds);

    if opts.accept_invalid_certs {
        tracing::warn!(message = "TLS certificate verification disabled for Meteo-France requests");
    }

    let api_options = HttpOptions {
        timeout,
        accept_invalid_certs: opts.accept_invalid_certs,
        follow_redirects: true,
    };
    let token_options = HttpOptions {
        follow_redirects: false,
        ..api_options
    };

    let (api_client, token_client) = api_options
        .build()
        .and_then(|api| token_options.build().map(|token| (api, token)))
        .unwrap_or_else(|e| {
            tracing::error!(message = "unable to initialize HTTP client", error = %e);
            process::exit(1)
        });

    let client = AuthenticatedClient::new(
        api_client,
        token_client,
        creds.token_url.clone(),
        creds.application_id.clone(),
    );
    let fetcher = StationFetcher::new(client, DEFAULT_API_URL).unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize station client", error = %e);
        process::exit(1)
    });

    let mut registry = StationMetrics::registry();
    let metrics = StationMetrics::new(&mut registry);
    let poller = Poller::new(
        fetcher,
        metrics,
        creds.station_id.clone(),
        Duration::from_secs(opts.polling_interval_seconds),
    );

    let bind = SocketAddr::from((DEFAULT_BIND_IP, opts.exporter_port));
    let context = Arc::new(RequestContext::new(registry));
    let server = axum::Server::try_bind(&bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %bind, error = %e);
            process::exit(1)
        })
        .serve(meteo_exporter::http::app(context).into_make_service());

    tracing::info!(message = "server started", address = %server.local_addr());
    let server = server.with_graceful_shutdown(async {
        // Wait for either SIGTERM or SIGINT to shutdown
        tokio::select! {
            _ = sigterm() => {}
            _ = sigint() => {}
        }
    });

    let polling = tokio::spawn(poller.run());

    tokio::select! {
        res = server => {
            if let Err(e) = res {
                tracing::error!(message = "server error", error = %e);
                process::exit(1)
            }
        }
        res = polling => {
            match res {
                Ok(Ok(never)) => match never {},
                Ok(Err(e)) => tracing::error!(
                    message = "failed to fetch observation",
                    station = %creds.station_id,
                    error = %e,
                ),
                Err(e) => tracing::error!(message = "observation polling task failed", error = %e),
            }

            process::exit(1)
        }
    }

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
