use anyhow::{Result, anyhow};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Candle interval attached to a trading pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    OneMin,
    #[serde(rename = "5m")]
    FiveMin,
    #[serde(rename = "15m")]
    FifteenMin,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "4h")]
    FourHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    pub fn to_seconds(&self) -> i64 {
        match self {
            Interval::OneMin => 60,
            Interval::FiveMin => 300,
            Interval::FifteenMin => 900,
            Interval::OneHour => 3_600,
            Interval::FourHour => 14_400,
            Interval::OneDay => 86_400,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.to_seconds() as u64)
    }

    /// Exchange-facing interval string ("1m", "1h", ...). Binance and the
    /// journal both use this spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::OneMin => "1m",
            Interval::FiveMin => "5m",
            Interval::FifteenMin => "15m",
            Interval::OneHour => "1h",
            Interval::FourHour => "4h",
            Interval::OneDay => "1d",
        }
    }

    /// Coinbase granularity is expressed in seconds.
    pub fn to_coinbase_granularity(&self) -> i64 {
        self.to_seconds()
    }

    /// Checks whether a timestamp sits exactly on an interval boundary.
    pub fn is_boundary(&self, ts: DateTime<Utc>) -> bool {
        ts.timestamp() % self.to_seconds() == 0 && ts.timestamp_subsec_nanos() == 0
    }

    /// Start of the interval period containing `ts`.
    pub fn period_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let secs = ts.timestamp() - ts.timestamp().rem_euclid(self.to_seconds());
        Utc.timestamp_opt(secs, 0).single().unwrap_or(ts)
    }

    /// First boundary strictly after `ts`. Used by the scheduler so missed
    /// ticks are never backfilled.
    pub fn next_boundary(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        self.period_start(ts) + ChronoDuration::seconds(self.to_seconds())
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Interval {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1m" => Ok(Interval::OneMin),
            "5m" => Ok(Interval::FiveMin),
            "15m" => Ok(Interval::FifteenMin),
            "1h" => Ok(Interval::OneHour),
            "4h" => Ok(Interval::FourHour),
            "1d" => Ok(Interval::OneDay),
            _ => Err(anyhow!(
                "Invalid interval: {}. Must be one of 1m, 5m, 15m, 1h, 4h, 1d",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_parsing_round_trip() {
        for s in ["1m", "5m", "15m", "1h", "4h", "1d"] {
            let interval: Interval = s.parse().unwrap();
            assert_eq!(interval.as_str(), s);
        }
        assert!("2h".parse::<Interval>().is_err());
    }

    #[test]
    fn test_next_boundary_is_strictly_in_the_future() {
        let interval = Interval::OneHour;
        let on_boundary = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(
            interval.next_boundary(on_boundary),
            Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()
        );

        let mid_period = Utc.with_ymd_and_hms(2024, 3, 1, 12, 41, 7).unwrap();
        assert_eq!(
            interval.next_boundary(mid_period),
            Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_boundary_alignment() {
        let interval = Interval::FiveMin;
        assert!(interval.is_boundary(Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap()));
        assert!(!interval.is_boundary(Utc.with_ymd_and_hms(2024, 3, 1, 12, 6, 0).unwrap()));
    }
}
