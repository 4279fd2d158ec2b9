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

use crate::client::ClientError;
use crate::metrics::StationMetrics;
use crate::station::{StationFetcher, StationReading};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{Instrument, Level};

/// Fetches observations for a single station and records them as metrics.
///
/// Each cycle is run to completion before sleeping for the configured interval, so a
/// slow fetch pushes the next one back by its own duration.
#[derive(Debug)]
pub struct Poller {
    fetcher: StationFetcher,
    metrics: StationMetrics,
    station: String,
    interval: Duration,
}

impl Poller {
    pub fn new(fetcher: StationFetcher, metrics: StationMetrics, station: String, interval: Duration) -> Self {
        Poller {
            fetcher,
            metrics,
            station,
            interval,
        }
    }

    /// Run a single fetch and record cycle. Metrics are left untouched if the fetch fails.
    pub async fn tick(&mut self) -> Result<StationReading, ClientError> {
        tracing::info!(message = "gathering data", station = %self.station);

        let reading = self
            .fetcher
            .fetch(&self.station)
            .instrument(tracing::span!(Level::DEBUG, "meteo_observation"))
            .await?;

        self.metrics.record_reading(&self.station, &reading);
        tracing::debug!(
            message = "recorded new observation",
            station = %self.station,
            temperature = reading.temperature_celsius,
            humidity = reading.humidity_percent,
            rain = reading.rain_mm,
            wind = reading.wind_speed,
        );

        Ok(reading)
    }

    /// Run cycles forever, only returning when one of them fails.
    pub async fn run(mut self) -> Result<Infallible, ClientError> {
        tracing::info!(
            message = "observation polling started",
            station = %self.station,
            interval_secs = self.interval.as_secs(),
        );

        loop {
            self.tick().await?;
            tokio::time::sleep(self.interval).await;
        }
    }
}
