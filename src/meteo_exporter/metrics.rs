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

use crate::station::StationReading;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use std::sync::atomic::AtomicU64;

pub const NAMESPACE: &str = "meteo";

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct StationLabels {
    pub station_id: String,
}

type StationGauge = Family<StationLabels, Gauge<f64, AtomicU64>>;

/// Holder for metrics that can be set from a `StationReading`.
///
/// All metrics are created and registered upon call to `StationMetrics::new()`. They are
/// named after the prefix of the registry they are registered with (`meteo_` for the
/// registry built by `StationMetrics::registry()`) and have a `station_id` label.
#[derive(Debug, Clone)]
pub struct StationMetrics {
    temperature: StationGauge,
    humidity: StationGauge,
    rain: StationGauge,
    wind: StationGauge,
}

impl StationMetrics {
    /// Create an empty registry using the `meteo` prefix.
    pub fn registry() -> Registry {
        Registry::with_prefix(NAMESPACE)
    }

    pub fn new(reg: &mut Registry) -> Self {
        let temperature = StationGauge::default();
        let humidity = StationGauge::default();
        let rain = StationGauge::default();
        let wind = StationGauge::default();

        reg.register("temperature", "Temperature sensor, in celsius", temperature.clone());
        reg.register("humidity", "Humidity sensor (0-100)", humidity.clone());
        reg.register("rain", "Rain sensor, in millimeters", rain.clone());
        reg.register("wind", "Wind sensor", wind.clone());

        Self {
            temperature,
            humidity,
            rain,
            wind,
        }
    }

    /// Overwrite every gauge for the station with values from the reading.
    pub fn record_reading(&self, station: &str, reading: &StationReading) {
        let labels = StationLabels {
            station_id: station.to_owned(),
        };

        self.temperature.get_or_create(&labels).set(reading.temperature_celsius);
        self.humidity.get_or_create(&labels).set(reading.humidity_percent);
        self.rain.get_or_create(&labels).set(reading.rain_mm);
        self.wind.get_or_create(&labels).set(reading.wind_speed);
    }
}
