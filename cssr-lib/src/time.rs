//! GPS time handling for display.
//!
//! The decoders carry receive epochs as raw (GPS week, seconds-of-week)
//! pairs; conversion to a human-readable UTC timestamp is a display
//! concern and the only place leap seconds enter the picture.

use hifitime::Epoch;
use serde::{Deserialize, Serialize};

pub const SECONDS_PER_WEEK: u32 = 604_800;

/// A receive epoch: GPS week number plus integer seconds of week.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpsTime {
    pub week: u16,
    pub tow: u32,
}

impl GpsTime {
    #[must_use]
    pub fn new(week: u16, tow: u32) -> Self {
        GpsTime { week, tow }
    }

    /// Convert to a continuous epoch on the GPS time scale.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        Epoch::from_gpst_seconds(
            f64::from(self.week) * f64::from(SECONDS_PER_WEEK) + f64::from(self.tow),
        )
    }

    /// Format as `YYYY-MM-DD hh:mm:ss` in UTC.
    #[must_use]
    pub fn to_utc_string(&self) -> String {
        let (y, m, d, hh, mm, ss, _) = self.epoch().to_gregorian_utc();
        format!("{y:04}-{m:02}-{d:02} {hh:02}:{mm:02}:{ss:02}")
    }
}

impl std::fmt::Display for GpsTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_utc_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gps_epoch_start_is_utc_1980() {
        // GPS and UTC coincided at the GPS epoch.
        let t = GpsTime::new(0, 0);
        assert_eq!(t.to_utc_string(), "1980-01-06 00:00:00");
    }

    #[test]
    fn leap_seconds_are_applied() {
        // 2022-03-26 23:11:44 UTC is GPS week 2202, tow 601922 (18 leap
        // seconds ahead of UTC).
        let t = GpsTime::new(2202, 601_922);
        assert_eq!(t.to_utc_string(), "2022-03-26 23:11:44");
    }
}
