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

//! Prometheus metrics exporter for the Meteo-France observation API
//!
//! ## Features
//!
//! `meteo_exporter` fetches the latest six-minute observation for a single Meteo-France
//! station using the [DPObs] API and emits it as Prometheus metrics. The API is protected
//! by OAuth2 client credentials: an access token is obtained before the first request and
//! refreshed (once per request) whenever the API reports that it has expired.
//!
//! * `meteo_temperature{station_id=$STATION_ID}` - Temperature, in degrees celsius.
//! * `meteo_humidity{station_id=$STATION_ID}` - Relative humidity (0-100).
//! * `meteo_rain{station_id=$STATION_ID}` - Rain over the observation period, in millimeters.
//! * `meteo_wind{station_id=$STATION_ID}` - Average wind speed.
//!
//! [DPObs]: https://portail-api.meteofrance.fr/
//!
//! ## Build
//!
//! `meteo_exporter` is a Rust program and must be built from source using a [Rust toolchain](https://rustup.rs/).
//!
//! ```text
//! cargo build --release
//! ```
//!
//! ## Usage
//!
//! ### Secrets
//!
//! Credentials for the Meteo-France API are not passed on the command line. They are read
//! once at startup from an [Infisical] project, under the path `/Supervision/Meteofrance`.
//! The following secrets must exist there.
//!
//! * `APPLICATION_ID` - Base64 encoded `client_id:client_secret` pair for the token endpoint.
//! * `TOKEN_URL` - URL of the OAuth2 token endpoint.
//! * `STATION_ID` - Meteo-France station to export observations for, e.g. `07149`.
//!
//! [Infisical]: https://infisical.com/
//!
//! ### Run
//!
//! Every option can be given as a flag or as an environment variable.
//!
//! ```text
//! INFISICAL_URL=https://app.infisical.com \
//! INFISICAL_ENV=prod \
//! INFISICAL_PROJECT_ID=... \
//! INFISICAL_CLIENT_ID=... \
//! INFISICAL_CLIENT_SECRET=... \
//! ./meteo_exporter --polling-interval-seconds 60
//! ```
//!
//! Any error while fetching observations is fatal: it is logged and the process exits with
//! a non-zero status. Run it under a supervisor (Systemd, a container runtime) that restarts it.
//!
//! ### Prometheus
//!
//! Prometheus metrics are exposed on port `8000` at `/metrics`. Add the host running
//! `meteo_exporter` as a target under the Prometheus `scrape_configs` section.
//!
//! ```yaml
//! scrape_configs:
//! - job_name: meteo_exporter
//!   static_configs:
//!   - targets: ['example:8000']
//! ```
//!

pub mod client;
pub mod http;
pub mod metrics;
pub mod poll;
pub mod secrets;
pub mod station;
