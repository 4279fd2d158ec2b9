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

use crate::client::{AuthenticatedClient, ClientError};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://public-api.meteofrance.fr/public/DPObs/v1/station/infrahoraire-6m";

// Offset used by the exporter since its first release. Existing dashboards depend on it.
const KELVIN_OFFSET: f64 = 275.15;

/// Fetches the latest observation for a station via an `AuthenticatedClient`.
#[derive(Debug)]
pub struct StationFetcher {
    client: AuthenticatedClient,
    base_url: Url,
}

impl StationFetcher {
    pub fn new(client: AuthenticatedClient, base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        Ok(StationFetcher { client, base_url })
    }

    pub async fn fetch(&mut self, station: &str) -> Result<StationReading, ClientError> {
        let request_url = self.observation_url(station);
        tracing::debug!(message = "making latest observation request", url = %request_url);

        let res = self.client.request(Method::GET, request_url.clone()).await?;
        if !res.status.is_success() {
            return Err(ClientError::Unexpected(res.status, request_url));
        }

        let observations = res.json::<Vec<Observation>>()?;
        observations
            .first()
            .map(StationReading::from)
            .ok_or_else(|| ClientError::EmptyObservations(station.to_owned()))
    }

    fn observation_url(&self, station: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair("id_station", station)
            .append_pair("format", "json");
        url
    }
}

/// One entry of the observation array returned by the API, most recent first.
#[derive(Serialize, Deserialize, Debug)]
pub struct Observation {
    #[serde(alias = "t")]
    pub temperature_kelvin: f64,
    #[serde(alias = "u")]
    pub humidity: f64,
    #[serde(alias = "rr_per")]
    pub rain: f64,
    #[serde(alias = "ff")]
    pub wind_speed: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StationReading {
    pub temperature_celsius: f64,
    pub humidity_percent: f64,
    pub rain_mm: f64,
    pub wind_speed: f64,
}

impl From<&Observation> for StationReading {
    fn from(obs: &Observation) -> Self {
        StationReading {
            temperature_celsius: round2(obs.temperature_kelvin - KELVIN_OFFSET),
            humidity_percent: round2(obs.humidity),
            rain_mm: round2(obs.rain),
            wind_speed: round2(obs.wind_speed),
        }
    }
}

// Ties go to the even neighbor, matching the values published by earlier releases.
fn round2(v: f64) -> f64 {
    (v * 100.0).round_ties_even() / 100.0
}
