// ********* Reporting queries **********

use crate::poll::db::SurveyStore;
use crate::poll::*;

use rusqlite::{Connection, TransactionBehavior};

impl SurveyStore {
    /// The submission count of every configured form, 0 for the forms
    /// without a counter.
    pub fn get_form_statistics(&self) -> SurveyResult<BTreeMap<FormId, u64>> {
        let conn = self.conn()?;
        let mut res: BTreeMap<FormId, u64> = self
            .catalog()
            .form_ids()
            .into_iter()
            .map(|id| (id, 0))
            .collect();
        let mut stmt = conn
            .prepare_cached("SELECT form_id, submission_count FROM form_counters ORDER BY form_id")
            .context(SqlSnafu {})?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, FormId>(0)?, row.get::<_, i64>(1)?)))
            .context(SqlSnafu {})?;
        for row in rows {
            let (form_id, count) = row.context(SqlSnafu {})?;
            if let Some(entry) = res.get_mut(&form_id) {
                *entry = count.max(0) as u64;
            }
        }
        Ok(res)
    }

    /// The top and bottom names of every question of the catalog.
    ///
    /// All the counts are read from one snapshot of the storage.
    pub fn get_question_rankings(&self) -> SurveyResult<BTreeMap<String, QuestionRanking>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .context(SqlSnafu {})?;

        let mut votes_by_question: HashMap<String, HashMap<String, u64>> = HashMap::new();
        for col in self.columns() {
            votes_by_question.insert(col.question_id.to_string(), tally(&tx, col.tally_sql)?);
        }
        let per_form = match self.rules().exposure_policy {
            ExposurePolicy::CompletedSubmissions => per_form_counts(
                &tx,
                "SELECT form_id, COUNT(*) FROM submissions GROUP BY form_id",
            )?,
            ExposurePolicy::Assignments => per_form_counts(
                &tx,
                "SELECT form_id, assignment_count FROM form_counters",
            )?,
        };
        tx.commit().context(SqlSnafu {})?;
        debug!("get_question_rankings: exposures per form: {:?}", per_form);

        let exposures = exposure_counts(self.catalog(), &per_form);
        let rankings = rank_questions(
            self.catalog(),
            &votes_by_question,
            &exposures,
            self.rules(),
        );
        info!("Computed rankings for {} questions", rankings.len());
        Ok(rankings)
    }
}

fn tally(conn: &Connection, sql: &str) -> SurveyResult<HashMap<String, u64>> {
    let mut stmt = conn.prepare_cached(sql).context(SqlSnafu {})?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .context(SqlSnafu {})?;
    let mut res: HashMap<String, u64> = HashMap::new();
    for row in rows {
        let (name, count) = row.context(SqlSnafu {})?;
        res.insert(name, count.max(0) as u64);
    }
    Ok(res)
}

fn per_form_counts(conn: &Connection, sql: &str) -> SurveyResult<HashMap<FormId, u64>> {
    let mut stmt = conn.prepare_cached(sql).context(SqlSnafu {})?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, FormId>(0)?, row.get::<_, i64>(1)?)))
        .context(SqlSnafu {})?;
    let mut res: HashMap<FormId, u64> = HashMap::new();
    for row in rows {
        let (form_id, count) = row.context(SqlSnafu {})?;
        res.insert(form_id, count.max(0) as u64);
    }
    Ok(res)
}
