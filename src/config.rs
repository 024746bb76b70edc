/*
 *  Copyright (C) 2025 Michael Bachmann
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU Affero General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU Affero General Public License for more details.
 *
 *  You should have received a copy of the GNU Affero General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! TOML configuration, one struct per section, loaded once at startup.
//! Every tunable has a `#[serde(default = "...")]` so a config file only
//! needs to override what differs from the factory defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::{
    net::{IpAddr, Ipv4Addr},
    path::Path,
    time::Duration,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pierre: PierreConfig,
    pub frame: FrameConfig,
    pub fx: FxConfig,
    pub dmx: DmxConfig,
    pub units: UnitsConfig,
    pub rtsp: RtspConfig,
    pub clock: ClockConfig,
    pub socket: SocketConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pierre: PierreConfig::default(),
            frame: FrameConfig::default(),
            fx: FxConfig::default(),
            dmx: DmxConfig::default(),
            units: UnitsConfig::default(),
            rtsp: RtspConfig::default(),
            clock: ClockConfig::default(),
            socket: SocketConfig::default(),
        }
    }
}

impl Config {
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_str(&contents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PierreConfig {
    pub working_dir: String,
}

impl Default for PierreConfig {
    fn default() -> Self {
        PierreConfig {
            working_dir: ".".to_owned(),
        }
    }
}

/// `[frame.peaks.magnitudes]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnitudeLimits {
    pub floor: f32,
    pub ceiling: f32,
}

impl Default for MagnitudeLimits {
    fn default() -> Self {
        MagnitudeLimits {
            floor: 2.1,
            ceiling: 32.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeaksConfig {
    pub magnitudes: MagnitudeLimits,
}

impl Default for PeaksConfig {
    fn default() -> Self {
        PeaksConfig {
            magnitudes: MagnitudeLimits::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub peaks: PeaksConfig,
    pub samples: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            peaks: PeaksConfig::default(),
            samples: 352,
        }
    }
}

/// `[fx.majorpeak]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MajorPeakConfig {
    pub magnitudes: MagnitudeLimits,
    #[serde(with = "duration_secs")]
    pub silence_timeout: Duration,
}

impl Default for MajorPeakConfig {
    fn default() -> Self {
        MajorPeakConfig {
            magnitudes: MagnitudeLimits::default(),
            silence_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FxConfig {
    pub majorpeak: MajorPeakConfig,
}

impl Default for FxConfig {
    fn default() -> Self {
        FxConfig {
            majorpeak: MajorPeakConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmxConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DmxConfig {
    fn default() -> Self {
        DmxConfig {
            host: "127.0.0.1".to_owned(),
            port: 9000,
        }
    }
}

/// `[units.<name>]`, one table per fixture, address is the first DMX
/// channel the fixture occupies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitConfig {
    pub address: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitsConfig {
    pub main_pinspot: UnitConfig,
    pub fill_pinspot: UnitConfig,
    pub el_entry: UnitConfig,
    pub el_dance: UnitConfig,
    pub led_forest: UnitConfig,
    pub disco_ball: UnitConfig,
    pub ac_power: UnitConfig,
}

impl Default for UnitsConfig {
    fn default() -> Self {
        UnitsConfig {
            main_pinspot: UnitConfig { address: 1 },
            fill_pinspot: UnitConfig { address: 5 },
            el_entry: UnitConfig { address: 9 },
            el_dance: UnitConfig { address: 10 },
            led_forest: UnitConfig { address: 11 },
            disco_ball: UnitConfig { address: 12 },
            ac_power: UnitConfig { address: 13 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtspConfig {
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub retransmit_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub wip_timeout: Duration,
    pub wip_max: usize,
}

impl Default for RtspConfig {
    fn default() -> Self {
        RtspConfig {
            idle_timeout: Duration::from_secs(30),
            retransmit_timeout: Duration::from_millis(200),
            wip_timeout: Duration::from_millis(250),
            wip_max: 16,
        }
    }
}

/// RTSP listener socket tuning. `bind_address`/`port`
/// are the RTSP TCP listener's own address; per-session audio-data
/// listeners reuse the keepalive/timeout settings but bind to an
/// OS-assigned ephemeral port (advertised back to the sender at SETUP).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub bind_address: IpAddr,
    pub port: u16,
    #[serde(with = "duration_millis_opt")]
    pub keepalive_time: Option<Duration>,
    #[serde(with = "duration_millis_opt")]
    pub keepalive_interval: Option<Duration>,
    pub keepalive_retries: Option<u32>,
    #[serde(with = "duration_millis_opt")]
    pub user_timeout: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 7000,
            keepalive_time: Some(Duration::from_secs(30)),
            keepalive_interval: Some(Duration::from_secs(10)),
            keepalive_retries: Some(3),
            user_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    #[serde(with = "duration_millis")]
    pub max_age: Duration,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            max_age: Duration::from_millis(100),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = Config::default();
        let s = toml::to_string(&cfg).expect("serialize");
        let back = Config::from_str(&s).expect("parse");
        assert_eq!(back.frame.peaks.magnitudes.floor, 2.1);
        assert_eq!(back.fx.majorpeak.silence_timeout, Duration::from_secs(10));
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let s = r#"
            [dmx]
            host = "10.0.0.5"
            port = 6454
        "#;
        let cfg = Config::from_str(s).expect("parse");
        assert_eq!(cfg.dmx.host, "10.0.0.5");
        assert_eq!(cfg.dmx.port, 6454);
        assert_eq!(cfg.frame.samples, 352);
    }
}
