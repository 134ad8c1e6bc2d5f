// ********* Form allocation **********

use crate::poll::db::{format_timestamp, parse_timestamp, seed_counters_tx, SurveyStore};
use crate::poll::*;

use chrono::{DateTime, Duration, DurationRound, Utc};
use rusqlite::{params, Connection, TransactionBehavior};

impl SurveyStore {
    /// Picks the form for a new respondent and records the assignment.
    ///
    /// The read of the counters and the update of the chosen form happen in
    /// one write transaction: two concurrent callers see each other's
    /// assignment.
    pub fn assign_form(&self) -> SurveyResult<FormId> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context(SqlSnafu {})?;

        let seeded = seed_counters_tx(&tx, self.catalog())?;
        if seeded == self.catalog().forms().len() {
            info!(
                "No counters found, starting with form {}",
                self.catalog().first_form_id()
            );
        }
        let counters: Vec<FormCounter> = read_counters(&tx)?
            .into_iter()
            .filter(|c| self.catalog().form(c.form_id).is_some())
            .collect();
        debug!("assign_form: counters: {:?}", counters);
        let form_id =
            choose_form(&counters).unwrap_or_else(|| self.catalog().first_form_id());
        let submission_count = counters
            .iter()
            .find(|c| c.form_id == form_id)
            .map_or(0, |c| c.submission_count);

        let latest = counters.iter().filter_map(|c| c.last_assigned).max();
        let stamp = next_stamp(Utc::now(), latest);
        tx.execute(
            "UPDATE form_counters
             SET last_assigned = ?1, assignment_count = assignment_count + 1
             WHERE form_id = ?2",
            params![format_timestamp(stamp), form_id],
        )
        .context(SqlSnafu {})?;
        tx.commit().context(SqlSnafu {})?;
        info!(
            "Assigned form {} ({} submissions so far)",
            form_id, submission_count
        );
        Ok(form_id)
    }

    /// The counters of all the stored forms, ordered by form id.
    pub fn form_counters(&self) -> SurveyResult<Vec<FormCounter>> {
        let conn = self.conn()?;
        read_counters(&conn)
    }
}

pub(crate) fn read_counters(conn: &Connection) -> SurveyResult<Vec<FormCounter>> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT form_id, submission_count, assignment_count, last_assigned
             FROM form_counters ORDER BY form_id",
        )
        .context(SqlSnafu {})?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })
        .context(SqlSnafu {})?;
    let mut res: Vec<FormCounter> = Vec::new();
    for row in rows {
        let (form_id, submission_count, assignment_count, last_assigned) =
            row.context(SqlSnafu {})?;
        let last_assigned = match last_assigned {
            Some(s) => Some(parse_timestamp(&s)?),
            None => None,
        };
        res.push(FormCounter {
            form_id,
            submission_count: submission_count.max(0) as u64,
            assignment_count: assignment_count.max(0) as u64,
            last_assigned,
        });
    }
    Ok(res)
}

// Stored stamps have a microsecond resolution. Two assignments never share a
// stamp, so the rotation among equally filled forms stays strict.
fn next_stamp(now: DateTime<Utc>, latest: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let step = Duration::microseconds(1);
    let now = now.duration_trunc(step).unwrap_or(now);
    match latest {
        Some(l) if l >= now => l + step,
        _ => now,
    }
}
