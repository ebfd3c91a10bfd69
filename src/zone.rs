//! Local civil time resolution
//!
//! Day keys, gap anchors and "today" are all local civil dates. A [`LocalZone`]
//! resolves each instant with the offset in effect at that instant, so a scan or
//! a history that spans a daylight-saving change keeps wall-clock anchors at
//! the same local hour on both sides of it.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

use crate::error::UFitnessError;

/// Time zone used to derive local civil dates and wall-clock instants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalZone {
    /// Constant offset from UTC, no daylight-saving changes
    Fixed(FixedOffset),
    /// IANA zone such as `Europe/Berlin`
    Named(Tz),
    /// The zone of the machine running the program
    System,
}

impl Default for LocalZone {
    fn default() -> Self {
        LocalZone::utc()
    }
}

impl LocalZone {
    pub fn utc() -> Self {
        LocalZone::Fixed(Utc.fix())
    }

    /// UTC offset in effect at `instant`
    pub fn offset_at(&self, instant: DateTime<Utc>) -> FixedOffset {
        let utc = instant.naive_utc();
        match self {
            LocalZone::Fixed(offset) => *offset,
            LocalZone::Named(tz) => tz.offset_from_utc_datetime(&utc).fix(),
            LocalZone::System => Local.offset_from_utc_datetime(&utc).fix(),
        }
    }

    /// Wall-clock reading of `instant`
    pub fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset_at(instant)).naive_local()
    }

    /// Local civil date of `instant`
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.to_local(instant).date()
    }

    /// Instant of a local wall-clock reading
    ///
    /// A reading that occurs twice (clocks going back) resolves to the earlier
    /// instant. A reading skipped by clocks going forward is taken with the
    /// offset in effect a day earlier.
    pub fn instant_at(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let resolved = match self {
            LocalZone::Fixed(offset) => offset
                .from_local_datetime(&local)
                .earliest()
                .map(|instant| instant.with_timezone(&Utc)),
            LocalZone::Named(tz) => tz
                .from_local_datetime(&local)
                .earliest()
                .map(|instant| instant.with_timezone(&Utc)),
            LocalZone::System => Local
                .from_local_datetime(&local)
                .earliest()
                .map(|instant| instant.with_timezone(&Utc)),
        };

        resolved.unwrap_or_else(|| {
            let day_before = local.checked_sub_signed(Duration::days(1)).unwrap_or(local);
            let offset = self.offset_at(Utc.from_utc_datetime(&day_before));
            let shifted = local
                .checked_sub_signed(Duration::seconds(i64::from(offset.local_minus_utc())))
                .unwrap_or(local);
            Utc.from_utc_datetime(&shifted)
        })
    }

    /// Instant of local `time` on `date`
    pub fn at(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        self.instant_at(date.and_time(time))
    }

    /// Instant the local day `date` begins
    pub fn midnight(&self, date: NaiveDate) -> DateTime<Utc> {
        self.at(date, NaiveTime::MIN)
    }
}

impl From<FixedOffset> for LocalZone {
    fn from(offset: FixedOffset) -> Self {
        LocalZone::Fixed(offset)
    }
}

impl From<Tz> for LocalZone {
    fn from(tz: Tz) -> Self {
        LocalZone::Named(tz)
    }
}

impl FromStr for LocalZone {
    type Err = UFitnessError;

    /// `local` or `system` for the machine zone, `UTC`, or an IANA name
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            name if name.eq_ignore_ascii_case("local") || name.eq_ignore_ascii_case("system") => {
                Ok(LocalZone::System)
            }
            name if name.eq_ignore_ascii_case("utc") => Ok(LocalZone::utc()),
            name => name
                .parse::<Tz>()
                .map(LocalZone::Named)
                .map_err(|_| UFitnessError::Configuration(format!("Unknown time zone: {}", name))),
        }
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalZone::Fixed(offset) => write!(f, "{}", offset),
            LocalZone::Named(tz) => write!(f, "{}", tz.name()),
            LocalZone::System => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin() -> LocalZone {
        "Europe/Berlin".parse().unwrap()
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_named_zone_follows_daylight_saving() {
        let zone = berlin();
        let winter = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let summer = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();

        assert_eq!(zone.at(winter, hm(9, 0)), Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap());
        assert_eq!(zone.at(summer, hm(9, 0)), Utc.with_ymd_and_hms(2024, 7, 15, 7, 0, 0).unwrap());
    }

    #[test]
    fn test_date_of_uses_offset_at_instant() {
        let zone = berlin();
        // 22:30Z is 00:30 the next day in summer, 23:30 the same day in winter
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 22, 30, 0).unwrap();
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 22, 30, 0).unwrap();
        assert_eq!(zone.date_of(summer), NaiveDate::from_ymd_opt(2024, 7, 16).unwrap());
        assert_eq!(zone.date_of(winter), NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    }

    #[test]
    fn test_skipped_and_repeated_readings() {
        let zone = berlin();
        // 2024-03-31 02:30 does not exist in Berlin
        let spring = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(zone.at(spring, hm(2, 30)), Utc.with_ymd_and_hms(2024, 3, 31, 1, 30, 0).unwrap());

        // 2024-10-27 02:30 happens twice; the first one is taken
        let autumn = NaiveDate::from_ymd_opt(2024, 10, 27).unwrap();
        assert_eq!(zone.at(autumn, hm(2, 30)), Utc.with_ymd_and_hms(2024, 10, 27, 0, 30, 0).unwrap());
    }

    #[test]
    fn test_fixed_zone_and_parsing() {
        let zone = LocalZone::from(FixedOffset::east_opt(-5 * 3600).unwrap());
        let day = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        assert_eq!(zone.midnight(day), Utc.with_ymd_and_hms(2024, 7, 15, 5, 0, 0).unwrap());

        assert_eq!("UTC".parse::<LocalZone>().unwrap(), LocalZone::utc());
        assert_eq!("local".parse::<LocalZone>().unwrap(), LocalZone::System);
        assert!("Mars/Olympus".parse::<LocalZone>().is_err());
        assert_eq!(berlin().to_string(), "Europe/Berlin");
    }
}
