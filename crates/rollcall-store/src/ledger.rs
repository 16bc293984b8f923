//! Append-only attendance history with per-day-per-identity uniqueness.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, ErrorCode};
use serde::Serialize;

use crate::{Store, StoreError};

/// One attendance event. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: String,
    /// Display name snapshot at the time of marking.
    pub name: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
}

/// Outcome of an append attempt.
#[derive(Debug)]
pub enum AppendOutcome {
    Recorded(AttendanceRecord),
    /// The (student_id, day) uniqueness index rejected the insert — another
    /// writer got there first. Recovered locally, never surfaced as an error.
    Duplicate,
}

pub struct AttendanceLedger<'a> {
    pub(crate) store: &'a Store,
}

impl AttendanceLedger<'_> {
    /// Whether the identity already has a record on the given UTC calendar
    /// day. Callers derive `day` from the event's own timestamp, not from
    /// wall-clock at query time, so the check and the write stay consistent
    /// within one request.
    pub fn has_record_today(&self, student_id: &str, day: NaiveDate) -> Result<bool, StoreError> {
        let conn = self.store.lock();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM attendance WHERE student_id = ?1 AND day = ?2)",
            params![student_id, day.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Append a "present" record for the UTC day of `timestamp`.
    ///
    /// Two concurrent marks for the same identity can both pass the
    /// [`has_record_today`](Self::has_record_today) check; the uniqueness
    /// index makes the loser fail with a constraint violation, which comes
    /// back as [`AppendOutcome::Duplicate`].
    pub fn append(
        &self,
        student_id: &str,
        name: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<AppendOutcome, StoreError> {
        let day = timestamp.date_naive();
        let conn = self.store.lock();
        let inserted = conn.execute(
            "INSERT INTO attendance (student_id, name, timestamp, day, status)
             VALUES (?1, ?2, ?3, ?4, 'present')",
            params![student_id, name, timestamp.to_rfc3339(), day.to_string()],
        );

        match inserted {
            Ok(_) => {
                let record = AttendanceRecord {
                    id: conn.last_insert_rowid(),
                    student_id: student_id.to_string(),
                    name: name.to_string(),
                    timestamp,
                    status: "present".to_string(),
                };
                tracing::info!(student_id, %day, "attendance recorded");
                Ok(AppendOutcome::Recorded(record))
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                tracing::debug!(student_id, %day, "attendance already recorded, deduped");
                Ok(AppendOutcome::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All records, newest first.
    pub fn list_all(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.query(
            "SELECT id, student_id, name, timestamp, status
             FROM attendance ORDER BY timestamp DESC, id DESC",
            params![],
        )
    }

    /// Records for one UTC calendar day, newest first.
    pub fn list_for_day(&self, day: NaiveDate) -> Result<Vec<AttendanceRecord>, StoreError> {
        self.query(
            "SELECT id, student_id, name, timestamp, status
             FROM attendance WHERE day = ?1 ORDER BY timestamp DESC, id DESC",
            params![day.to_string()],
        )
    }

    fn query<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.store.lock();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, student_id, name, timestamp, status) = row?;
            records.push(AttendanceRecord {
                id,
                student_id,
                name,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc),
                status,
            });
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn append_then_check_same_day() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        let t = ts(2026, 3, 2, 9);

        assert!(!ledger.has_record_today("s1", t.date_naive()).unwrap());
        let outcome = ledger.append("s1", "Ada", t).unwrap();
        assert!(matches!(outcome, AppendOutcome::Recorded(_)));
        assert!(ledger.has_record_today("s1", t.date_naive()).unwrap());
    }

    #[test]
    fn second_append_same_day_is_duplicate_not_error() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        let morning = ts(2026, 3, 2, 8);
        let noon = ts(2026, 3, 2, 12);

        assert!(matches!(
            ledger.append("s1", "Ada", morning).unwrap(),
            AppendOutcome::Recorded(_)
        ));
        assert!(matches!(
            ledger.append("s1", "Ada", noon).unwrap(),
            AppendOutcome::Duplicate
        ));
        assert_eq!(ledger.list_all().unwrap().len(), 1);
    }

    #[test]
    fn next_day_appends_again() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        ledger.append("s1", "Ada", ts(2026, 3, 2, 9)).unwrap();
        assert!(matches!(
            ledger.append("s1", "Ada", ts(2026, 3, 3, 9)).unwrap(),
            AppendOutcome::Recorded(_)
        ));
        assert_eq!(ledger.list_all().unwrap().len(), 2);
    }

    #[test]
    fn different_identities_same_day_are_independent() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        let t = ts(2026, 3, 2, 9);
        assert!(matches!(
            ledger.append("s1", "Ada", t).unwrap(),
            AppendOutcome::Recorded(_)
        ));
        assert!(matches!(
            ledger.append("s2", "Grace", t).unwrap(),
            AppendOutcome::Recorded(_)
        ));
    }

    #[test]
    fn day_boundary_uses_event_timestamp_utc() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        // 23:59 and 00:01 the next day are different calendar days in UTC
        let late = Utc.with_ymd_and_hms(2026, 3, 2, 23, 59, 0).unwrap();
        let early = Utc.with_ymd_and_hms(2026, 3, 3, 0, 1, 0).unwrap();

        ledger.append("s1", "Ada", late).unwrap();
        assert!(!ledger.has_record_today("s1", early.date_naive()).unwrap());
        assert!(matches!(
            ledger.append("s1", "Ada", early).unwrap(),
            AppendOutcome::Recorded(_)
        ));
    }

    #[test]
    fn list_all_is_timestamp_descending() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        ledger.append("s1", "Ada", ts(2026, 3, 2, 9)).unwrap();
        ledger.append("s2", "Grace", ts(2026, 3, 2, 10)).unwrap();
        ledger.append("s3", "Alan", ts(2026, 3, 1, 9)).unwrap();

        let records = ledger.list_all().unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, ["s2", "s1", "s3"]);
        assert!(records.iter().all(|r| r.status == "present"));
    }

    #[test]
    fn list_for_day_filters_by_day() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        ledger.append("s1", "Ada", ts(2026, 3, 2, 9)).unwrap();
        ledger.append("s2", "Grace", ts(2026, 3, 3, 9)).unwrap();

        let day = ts(2026, 3, 2, 0).date_naive();
        let records = ledger.list_for_day(day).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student_id, "s1");
    }

    #[test]
    fn timestamps_round_trip_through_storage() {
        let store = Store::open_in_memory(4).unwrap();
        let ledger = store.ledger();
        let t = Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 15).unwrap();
        ledger.append("s1", "Ada", t).unwrap();
        assert_eq!(ledger.list_all().unwrap()[0].timestamp, t);
    }
}
