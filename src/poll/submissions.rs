// ********* Submissions **********

use crate::poll::db::{
    format_timestamp, parse_timestamp, seed_counters_tx, SurveyStore, ANSWER_COLUMNS,
};
use crate::poll::*;

use chrono::{DateTime, Utc};
use log::warn;
use rusqlite::{params, Connection, TransactionBehavior};

/// What the store reports back after a completed survey.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SubmissionReceipt {
    pub submission_id: i64,
    pub form_id: FormId,
    /// The new submission count of the form, or `None` if the counter could
    /// not be updated. The submission is stored in both cases.
    pub submission_count: Option<u64>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct StoredSubmission {
    pub id: i64,
    pub form_id: FormId,
    pub session_id: String,
    pub submitted_at: DateTime<Utc>,
    /// Question id -> selected name.
    pub answers: BTreeMap<String, String>,
    pub top_choice: Option<String>,
    pub bottom_choice: Option<String>,
}

const INSERT_SUBMISSION: &str = "INSERT INTO submissions (
    form_id, session_id, submission_datetime,
    question_1_answer, question_2_answer, question_3_answer,
    question_4_answer, question_5_answer,
    top_choice, bottom_choice
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)";

impl SurveyStore {
    /// Stores a completed survey and counts it for its form.
    ///
    /// Every question of the catalog must be answered. The submission row and
    /// the counter update commit together, except when the counter update
    /// fails: the submission is then kept and the counter is left behind (see
    /// `reconcile_counters`).
    pub fn save_submission(
        &self,
        form_id: FormId,
        session_id: &str,
        answers: &BTreeMap<String, String>,
        top_choice: Option<&str>,
        bottom_choice: Option<&str>,
    ) -> SurveyResult<SubmissionReceipt> {
        ensure!(
            self.catalog().form(form_id).is_some(),
            UnknownFormSnafu { form_id }
        );
        let missing: Vec<usize> = self
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, col)| {
                answers
                    .get(col.question_id)
                    .map_or(true, |a| a.trim().is_empty())
            })
            // Numbered as the respondent sees them, in catalog order.
            .map(|(pos, _)| pos + 1)
            .collect();
        ensure!(missing.is_empty(), MissingAnswersSnafu { questions: missing });

        // Every column is covered by the catalog, so each lookup succeeds.
        let column_values: Vec<&str> = ANSWER_COLUMNS
            .iter()
            .map(|col| answers.get(col.question_id).map_or("", |a| a.as_str()))
            .collect();

        let mut conn = self.conn()?;
        let mut tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context(SqlSnafu {})?;
        tx.execute(
            INSERT_SUBMISSION,
            params![
                form_id,
                session_id,
                format_timestamp(Utc::now()),
                column_values[0],
                column_values[1],
                column_values[2],
                column_values[3],
                column_values[4],
                top_choice,
                bottom_choice
            ],
        )
        .context(SqlSnafu {})?;
        let submission_id = tx.last_insert_rowid();

        let submission_count = {
            let mut sp = tx.savepoint().context(SqlSnafu {})?;
            match bump_counter(&sp, form_id) {
                Ok(count) => {
                    sp.commit().context(SqlSnafu {})?;
                    Some(count)
                }
                Err(e) => {
                    warn!(
                        "Submission {} saved but the counter of form {} was not updated: {}",
                        submission_id, form_id, e
                    );
                    sp.rollback().context(SqlSnafu {})?;
                    None
                }
            }
        };
        tx.commit().context(SqlSnafu {})?;
        info!(
            "Stored submission {} for form {} (session {})",
            submission_id, form_id, session_id
        );
        Ok(SubmissionReceipt {
            submission_id,
            form_id,
            submission_count,
        })
    }

    /// The stored submissions, oldest first, optionally restricted to one form.
    pub fn list_submissions(&self, form_id: Option<FormId>) -> SurveyResult<Vec<StoredSubmission>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, form_id, session_id, submission_datetime,
                    question_1_answer, question_2_answer, question_3_answer,
                    question_4_answer, question_5_answer,
                    top_choice, bottom_choice
                 FROM submissions
                 WHERE ?1 IS NULL OR form_id = ?1
                 ORDER BY id",
            )
            .context(SqlSnafu {})?;
        let rows = stmt
            .query_map([form_id], |row| {
                let mut answers: Vec<String> = Vec::new();
                for idx in 4..9 {
                    answers.push(row.get(idx)?);
                }
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    answers,
                    row.get::<_, Option<String>>(9)?,
                    row.get::<_, Option<String>>(10)?,
                ))
            })
            .context(SqlSnafu {})?;
        let mut res: Vec<StoredSubmission> = Vec::new();
        for row in rows {
            let (id, form_id, session_id, submitted_at, values, top_choice, bottom_choice) =
                row.context(SqlSnafu {})?;
            let answers: BTreeMap<String, String> = self
                .columns()
                .iter()
                .map(|col| (col.question_id.to_string(), values[col.index - 1].clone()))
                .collect();
            res.push(StoredSubmission {
                id,
                form_id,
                session_id,
                submitted_at: parse_timestamp(&submitted_at)?,
                answers,
                top_choice,
                bottom_choice,
            });
        }
        debug!("list_submissions: {} rows for {:?}", res.len(), form_id);
        Ok(res)
    }

    /// Recomputes the submission counts from the stored submissions.
    ///
    /// Returns the forms whose count changed, with the previous and the new count.
    pub fn reconcile_counters(&self) -> SurveyResult<HashMap<FormId, (u64, u64)>> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context(SqlSnafu {})?;
        seed_counters_tx(&tx, self.catalog())?;
        tx.execute(
            "INSERT OR IGNORE INTO form_counters (form_id)
             SELECT DISTINCT form_id FROM submissions",
            [],
        )
        .context(SqlSnafu {})?;
        let drift: Vec<(FormId, i64, i64)> = {
            let mut stmt = tx
                .prepare(
                    "SELECT c.form_id, c.submission_count,
                        (SELECT COUNT(*) FROM submissions s WHERE s.form_id = c.form_id)
                     FROM form_counters c ORDER BY c.form_id",
                )
                .context(SqlSnafu {})?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, FormId>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .context(SqlSnafu {})?;
            let mut res = Vec::new();
            for row in rows {
                let (form_id, stored, actual) = row.context(SqlSnafu {})?;
                if stored != actual {
                    res.push((form_id, stored, actual));
                }
            }
            res
        };
        let mut changed: HashMap<FormId, (u64, u64)> = HashMap::new();
        for (form_id, stored, actual) in drift {
            tx.execute(
                "UPDATE form_counters SET submission_count = ?1 WHERE form_id = ?2",
                params![actual, form_id],
            )
            .context(SqlSnafu {})?;
            warn!(
                "Form {}: counter was {}, {} submissions stored",
                form_id, stored, actual
            );
            changed.insert(form_id, (stored.max(0) as u64, actual as u64));
        }
        tx.commit().context(SqlSnafu {})?;
        Ok(changed)
    }
}

fn bump_counter(conn: &Connection, form_id: FormId) -> rusqlite::Result<u64> {
    conn.execute(
        "INSERT OR IGNORE INTO form_counters (form_id) VALUES (?1)",
        [form_id],
    )?;
    let count: i64 = conn.query_row(
        "UPDATE form_counters SET submission_count = submission_count + 1
         WHERE form_id = ?1 RETURNING submission_count",
        [form_id],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::db::testing::*;

    fn full_answers(name: &str) -> BTreeMap<String, String> {
        ["q1", "q2", "q3", "q4", "q5"]
            .iter()
            .map(|q| (q.to_string(), name.to_string()))
            .collect()
    }

    fn count_rows(store: &SurveyStore, form_id: FormId) -> i64 {
        store
            .conn()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM submissions WHERE form_id = ?1",
                [form_id],
                |r| r.get(0),
            )
            .unwrap()
    }

    fn counter_of(store: &SurveyStore, form_id: FormId) -> u64 {
        store
            .form_counters()
            .unwrap()
            .into_iter()
            .find(|c| c.form_id == form_id)
            .unwrap()
            .submission_count
    }

    #[test]
    fn save_counts_one_submission() {
        let (_dir, store) = temp_store();
        let receipt = store
            .save_submission(3, "s-1", &full_answers("Philanthri"), Some("Short names"), None)
            .unwrap();
        assert_eq!(receipt.form_id, 3);
        assert_eq!(receipt.submission_count, Some(1));
        assert_eq!(count_rows(&store, 3), 1);
        assert_eq!(counter_of(&store, 3), 1);
        assert_eq!(counter_of(&store, 1), 0);

        let stored = store.list_submissions(Some(3)).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].session_id, "s-1");
        assert_eq!(stored[0].answers["q5"], "Philanthri");
        assert_eq!(stored[0].top_choice.as_deref(), Some("Short names"));
        assert_eq!(stored[0].bottom_choice, None);
        assert!(store.list_submissions(Some(1)).unwrap().is_empty());
    }

    #[test]
    fn incomplete_answers_store_nothing() {
        let (_dir, store) = temp_store();
        let mut answers = full_answers("Philanthri");
        answers.remove("q2");
        answers.insert("q4".to_string(), "  ".to_string());
        let err = store
            .save_submission(3, "s-1", &answers, None, None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please answer all questions before submitting. Missing: Questions 2, 4"
        );
        assert_eq!(count_rows(&store, 3), 0);
        assert_eq!(counter_of(&store, 3), 0);

        let err = store
            .save_submission(42, "s-1", &full_answers("x"), None, None)
            .unwrap_err();
        assert!(matches!(err, SurveyError::UnknownForm { form_id: 42 }));
    }

    #[test]
    fn missing_answers_follow_the_catalog_order() {
        use crate::poll::session::SurveySession;
        use brand_survey::builder::CatalogBuilder;

        let names = ["Philanthrifind", "Give-io", "Donathropy", "Kinderfully"];
        let catalog = CatalogBuilder::new()
            .form(1, "Survey Form A", &names)
            .question("q2", "Which name is the most trustworthy?")
            .question("q1", "Which name is the most memorable?")
            .question("q3", "Which name sounds the most professional?")
            .question("q4", "Which name would you be most likely to recommend?")
            .question("q5", "Which name do you like most overall?")
            .build()
            .unwrap();
        let (_dir, store) = temp_store_with(catalog, SurveyRules::DEFAULT_RULES);

        let mut answers = full_answers("Give-io");
        answers.remove("q2");
        let err = store
            .save_submission(1, "s-1", &answers, None, None)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please answer Question 1 before submitting."
        );
        assert_eq!(count_rows(&store, 1), 0);

        let mut session = SurveySession::with_id("s-1");
        session.resume(store.catalog(), 1).unwrap();
        for q in ["q1", "q3", "q4", "q5"] {
            session.answer(store.catalog(), q, "Give-io").unwrap();
        }
        let from_session = session.submit(&store).unwrap_err();
        assert_eq!(from_session.to_string(), err.to_string());
    }

    #[test]
    fn missing_counter_row_is_created() {
        let (_dir, store) = temp_store();
        store
            .conn()
            .unwrap()
            .execute("DELETE FROM form_counters WHERE form_id = 2", [])
            .unwrap();
        let receipt = store
            .save_submission(2, "s-2", &full_answers("Give-io"), None, None)
            .unwrap();
        assert_eq!(receipt.submission_count, Some(1));
        assert_eq!(counter_of(&store, 2), 1);
    }

    #[test]
    fn concurrent_saves_are_all_counted() {
        let (_dir, store) = temp_store();
        std::thread::scope(|s| {
            for t in 0..8 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..5 {
                        store
                            .save_submission(1, &format!("s-{}-{}", t, i), &full_answers("Give-io"), None, None)
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(count_rows(&store, 1), 40);
        assert_eq!(counter_of(&store, 1), 40);
    }

    #[test]
    fn counter_failure_keeps_the_submission() {
        let (_dir, store) = temp_store();
        store
            .conn()
            .unwrap()
            .execute("DROP TABLE form_counters", [])
            .unwrap();
        let receipt = store
            .save_submission(1, "s-1", &full_answers("Give-io"), None, None)
            .unwrap();
        assert_eq!(receipt.submission_count, None);
        assert_eq!(count_rows(&store, 1), 1);
    }

    #[test]
    fn reconcile_fixes_drift() {
        let (_dir, store) = temp_store();
        for i in 0..3 {
            store
                .save_submission(4, &format!("s-{}", i), &full_answers("Causenex"), None, None)
                .unwrap();
        }
        store
            .conn()
            .unwrap()
            .execute(
                "UPDATE form_counters SET submission_count = 1 WHERE form_id = 4",
                [],
            )
            .unwrap();
        let changed = store.reconcile_counters().unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[&4], (1, 3));
        assert_eq!(counter_of(&store, 4), 3);
        assert!(store.reconcile_counters().unwrap().is_empty());
    }
}
