use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, Utc};

/// Source of the current moment.
///
/// Creation and completion stamps use `now`; the overdue rule compares due dates against
/// `local_now`, the wall-clock time in the user's zone.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn local_now(&self) -> NaiveDateTime {
        self.now().with_timezone(&Local).naive_local()
    }

    fn today(&self) -> NaiveDate {
        self.local_now().date()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// Starts at `at`, reporting local time in UTC.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self::with_offset(at, Utc.fix())
    }

    pub fn with_offset(at: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(at),
            offset,
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().expect("clock poisoned") = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().expect("clock poisoned");
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock poisoned")
    }

    fn local_now(&self) -> NaiveDateTime {
        self.now().with_timezone(&self.offset).naive_local()
    }
}

/// Issues identifiers for new tasks. The store re-draws on collision, so an
/// implementation only has to make collisions unlikely.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&mut self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `prefix-1`, `prefix-2`, ... Deterministic ids for tests and fixtures.
#[derive(Debug, Clone)]
pub struct SequentialIds {
    prefix: String,
    next: u64,
}

impl SequentialIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 1,
        }
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&mut self) -> String {
        let id = format!("{}-{}", self.prefix, self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, TimeZone};

    #[test]
    fn manual_clock_set_and_advance() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));

        let later = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
        assert_eq!(clock.local_now(), later.naive_utc());
    }

    #[test]
    fn manual_clock_reports_local_time_in_its_zone() {
        // 20:30 UTC on Jan 1 is already Jan 2 in Shanghai.
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 20, 30, 0).unwrap();
        let shanghai = chrono_tz::Asia::Shanghai
            .offset_from_utc_datetime(&at.naive_utc())
            .fix();
        let clock = ManualClock::with_offset(at, shanghai);

        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(clock.local_now().time(), NaiveTime::from_hms_opt(4, 30, 0).unwrap());
    }

    #[test]
    fn sequential_ids_count_up() {
        let mut ids = SequentialIds::new("t");
        assert_eq!(ids.next_id(), "t-1");
        assert_eq!(ids.next_id(), "t-2");
    }

    #[test]
    fn uuid_ids_are_distinct() {
        let mut ids = UuidIds;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
