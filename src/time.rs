//! UTC timestamp representation and the date-time tree (spec.md §3,
//! "Date-time tree"). A timestamp is kept in the original's
//! broken-down `struct tm`-like shape because that is exactly what
//! gets persisted (§6) and what buckets entries into
//! `year -> month[12] -> day[32] -> hour[24]`.

use chrono::{Datelike, TimeZone, Timelike, Utc, Weekday};
use rustc_hash::FxHashMap;

/// Broken-down UTC time, mirroring the persisted 18-byte layout (spec.md
/// §6): `sec, min, hour, mday, mon, year, wday, yday, isdst`, plus one
/// reserved pad byte to round the record to 18 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrokenDownTime {
    pub sec: u8,
    pub min: u8,
    pub hour: u8,
    pub mday: u8,
    /// 0-based, matching `struct tm::tm_mon`.
    pub mon: u8,
    pub year: i64,
    /// 0 = Sunday, matching `struct tm::tm_wday`.
    pub wday: u8,
    pub yday: u16,
    /// Always 0 for a UTC-only model; carried for wire-format fidelity.
    pub isdst: i8,
}

impl BrokenDownTime {
    /// Wall-clock "now" in UTC (spec.md §4.E step 3, `now()`).
    pub fn now() -> Self {
        Self::from_chrono(Utc::now())
    }

    pub fn from_chrono(dt: chrono::DateTime<Utc>) -> Self {
        let wday = match dt.weekday() {
            Weekday::Sun => 0,
            Weekday::Mon => 1,
            Weekday::Tue => 2,
            Weekday::Wed => 3,
            Weekday::Thu => 4,
            Weekday::Fri => 5,
            Weekday::Sat => 6,
        };
        Self {
            sec: dt.second() as u8,
            min: dt.minute() as u8,
            hour: dt.hour() as u8,
            mday: dt.day() as u8,
            mon: dt.month0() as u8,
            year: dt.year() as i64,
            wday,
            yday: dt.ordinal0() as u16,
            isdst: 0,
        }
    }

    pub fn to_chrono(&self) -> Option<chrono::DateTime<Utc>> {
        Utc.with_ymd_and_hms(
            self.year as i32,
            self.mon as u32 + 1,
            self.mday as u32,
            self.hour as u32,
            self.min as u32,
            self.sec as u32,
        )
        .single()
    }

    /// `(year, month, day, hour)` bucket the date-time tree chains
    /// entries within. Validated against spec.md 4.E's minute-sorted
    /// bucket semantics.
    pub fn bucket_key(&self) -> (i64, u8, u8, u8) {
        (self.year, self.mon, self.mday, self.hour)
    }

    /// Range-checks the broken-down fields the date-time tree indexes
    /// by (`mon`, `mday`, `hour`) directly into its fixed-size
    /// `months[12]`/`days[32]`/`hours[24]` arrays. Every caller that
    /// builds a `BrokenDownTime` from untrusted input (persisted bytes)
    /// must call this before the value reaches [`DateTimeTree`].
    pub fn validate(&self) -> crate::Result<()> {
        if self.sec >= 60
            || self.min >= 60
            || self.hour >= 24
            || self.mon >= 12
            || self.mday == 0
            || self.mday > 31
        {
            return Err(ffcat_error::CatalogError::InvalidDate);
        }
        Ok(())
    }
}

#[derive(Default)]
struct HourBucket {
    /// Slot index of the first (earliest-minute) member.
    head: Option<u64>,
}

#[derive(Default)]
struct DayNode {
    hours: [HourBucket; 24],
}

#[derive(Default)]
struct MonthNode {
    days: [Option<Box<DayNode>>; 32],
}

#[derive(Default)]
struct YearNode {
    months: [Option<Box<MonthNode>>; 12],
}

/// Per-time-kind index: `year -> month[12] -> day[32] -> hour[24]`,
/// each hour bucket holding the head of a minute-sorted doubly-linked
/// chain of members. The chain pointers themselves live on the member
/// (an `Entry`'s `tod_prev/tod_next` etc.) — this tree only ever stores
/// bucket heads, the same separation of concerns as
/// [`ffcat_index::TranslationIndex`].
#[derive(Default)]
pub struct DateTimeTree {
    years: FxHashMap<i64, YearNode>,
}

impl DateTimeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket_head(&self, t: &BrokenDownTime) -> Option<u64> {
        let year = self.years.get(&t.year)?;
        let month = year.months[t.mon as usize].as_ref()?;
        let day = month.days[t.mday as usize].as_ref()?;
        day.hours[t.hour as usize].head
    }

    pub fn set_bucket_head(&mut self, t: &BrokenDownTime, head: Option<u64>) {
        let year = self.years.entry(t.year).or_default();
        let month = year.months[t.mon as usize].get_or_insert_with(Box::default);
        let day = month.days[t.mday as usize].get_or_insert_with(Box::default);
        day.hours[t.hour as usize].head = head;
    }
}
