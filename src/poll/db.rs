// ********* Storage **********

use crate::poll::*;

use chrono::{DateTime, SecondsFormat, Utc};
use log::warn;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use snafu::IntoError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POOL_SIZE: u32 = 10;
/// How long a caller waits for a pooled connection before giving up.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The storage column holding the answers to one question.
#[derive(Debug)]
pub struct AnswerColumn {
    pub question_id: &'static str,
    pub column: &'static str,
    /// The number of the question, as shown to respondents.
    pub index: usize,
    pub tally_sql: &'static str,
}

pub static ANSWER_COLUMNS: [AnswerColumn; 5] = [
    AnswerColumn {
        question_id: "q1",
        column: "question_1_answer",
        index: 1,
        tally_sql: "SELECT question_1_answer, COUNT(*) FROM submissions GROUP BY question_1_answer",
    },
    AnswerColumn {
        question_id: "q2",
        column: "question_2_answer",
        index: 2,
        tally_sql: "SELECT question_2_answer, COUNT(*) FROM submissions GROUP BY question_2_answer",
    },
    AnswerColumn {
        question_id: "q3",
        column: "question_3_answer",
        index: 3,
        tally_sql: "SELECT question_3_answer, COUNT(*) FROM submissions GROUP BY question_3_answer",
    },
    AnswerColumn {
        question_id: "q4",
        column: "question_4_answer",
        index: 4,
        tally_sql: "SELECT question_4_answer, COUNT(*) FROM submissions GROUP BY question_4_answer",
    },
    AnswerColumn {
        question_id: "q5",
        column: "question_5_answer",
        index: 5,
        tally_sql: "SELECT question_5_answer, COUNT(*) FROM submissions GROUP BY question_5_answer",
    },
];

/// Maps every question of the catalog to its storage column, in catalog order.
///
/// Every column must be covered: a submission row cannot leave an answer empty.
pub fn answer_columns(catalog: &Catalog) -> SurveyResult<Vec<&'static AnswerColumn>> {
    let mut res: Vec<&'static AnswerColumn> = Vec::new();
    for q in catalog.questions() {
        let col = ANSWER_COLUMNS
            .iter()
            .find(|c| c.question_id == q.id)
            .context(UnmappedQuestionSnafu {
                question_id: q.id.clone(),
            })?;
        res.push(col);
    }
    for col in ANSWER_COLUMNS.iter() {
        if catalog.question(col.question_id).is_none() {
            return MissingQuestionSnafu {
                question_id: col.question_id,
            }
            .fail();
        }
    }
    Ok(res)
}

const CREATE_FORM_COUNTERS: &str = "CREATE TABLE IF NOT EXISTS form_counters (
    form_id INTEGER PRIMARY KEY,
    submission_count INTEGER NOT NULL DEFAULT 0,
    assignment_count INTEGER NOT NULL DEFAULT 0,
    last_assigned TEXT
)";

const CREATE_SUBMISSIONS: &str = "CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    form_id INTEGER NOT NULL,
    session_id TEXT NOT NULL,
    submission_datetime TEXT NOT NULL,
    question_1_answer TEXT NOT NULL,
    question_2_answer TEXT NOT NULL,
    question_3_answer TEXT NOT NULL,
    question_4_answer TEXT NOT NULL,
    question_5_answer TEXT NOT NULL,
    top_choice TEXT,
    bottom_choice TEXT
)";

const CREATE_SUBMISSIONS_FORM_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_submissions_form ON submissions(form_id)";

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub pool_size: u32,
    pub acquire_timeout: Duration,
}

impl StoreSettings {
    /// Accepts `sqlite://<path>`, `file:<path>` or a bare file path.
    pub fn from_url(url: &str) -> SurveyResult<StoreSettings> {
        let trimmed = url.trim();
        let without_scheme = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = trimmed.strip_prefix("file:") {
            rest
        } else if trimmed.contains("://") {
            return InvalidDatabaseUrlSnafu {
                url,
                reason: "only SQLite databases are supported",
            }
            .fail();
        } else {
            trimmed
        };
        // Connection options are not supported.
        let path = without_scheme.split('?').next().unwrap_or_default();
        if path.is_empty() {
            return InvalidDatabaseUrlSnafu {
                url,
                reason: "no database file given",
            }
            .fail();
        }
        if path == ":memory:" {
            return InvalidDatabaseUrlSnafu {
                url,
                reason: "in-memory databases are not shared between pooled connections",
            }
            .fail();
        }
        Ok(StoreSettings {
            path: PathBuf::from(path),
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: ACQUIRE_TIMEOUT,
        })
    }
}

pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// The shared storage of the survey, safe to use from several threads.
pub struct SurveyStore {
    pool: Pool<SqliteConnectionManager>,
    catalog: Catalog,
    rules: SurveyRules,
    columns: Vec<&'static AnswerColumn>,
}

impl SurveyStore {
    pub fn connect(
        settings: &StoreSettings,
        catalog: Catalog,
        rules: SurveyRules,
    ) -> SurveyResult<SurveyStore> {
        let columns = answer_columns(&catalog)?;
        let manager = SqliteConnectionManager::file(&settings.path).with_init(|c| {
            c.busy_timeout(BUSY_TIMEOUT)?;
            c.pragma_update(None, "journal_mode", "WAL")
        });
        let pool = Pool::builder()
            .max_size(settings.pool_size)
            .connection_timeout(settings.acquire_timeout)
            .build(manager)
            .context(PoolBuildSnafu {
                path: settings.path.display().to_string(),
            })?;
        debug!(
            "connect: pool of {} connections to {:?}, answer columns: {:?}",
            settings.pool_size,
            settings.path,
            columns.iter().map(|c| c.column).collect::<Vec<_>>()
        );
        Ok(SurveyStore {
            pool,
            catalog,
            rules,
            columns,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn rules(&self) -> &SurveyRules {
        &self.rules
    }

    /// The storage columns of the questions, in catalog order.
    pub fn columns(&self) -> &[&'static AnswerColumn] {
        &self.columns
    }

    /// Waits for a free connection, up to the acquisition timeout.
    pub(crate) fn conn(&self) -> SurveyResult<SqliteConnection> {
        self.pool.get().context(PoolCheckoutSnafu {})
    }

    pub fn check_connection(&self) -> SurveyResult<()> {
        let conn = self.conn()?;
        let one: i64 = conn
            .query_row("SELECT 1", [], |row| row.get(0))
            .context(SqlSnafu {})?;
        debug!("check_connection: got {}", one);
        info!("Database connection successful");
        Ok(())
    }

    /// Creates the tables, upgrades older layouts and registers the configured forms.
    ///
    /// Running it again on an initialized database changes nothing.
    pub fn init_schema(&self) -> SurveyResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)
            .context(SqlSnafu {})?;
        tx.execute(CREATE_FORM_COUNTERS, []).context(SqlSnafu {})?;
        tx.execute(CREATE_SUBMISSIONS, []).context(SqlSnafu {})?;
        add_column_if_missing(&tx, "submissions", "top_choice", "TEXT")?;
        add_column_if_missing(&tx, "submissions", "bottom_choice", "TEXT")?;
        add_column_if_missing(
            &tx,
            "form_counters",
            "assignment_count",
            "INTEGER NOT NULL DEFAULT 0",
        )?;
        tx.execute(CREATE_SUBMISSIONS_FORM_INDEX, [])
            .context(SqlSnafu {})?;
        let seeded = seed_counters_tx(&tx, &self.catalog)?;
        tx.commit().context(SqlSnafu {})?;
        if seeded > 0 {
            info!("Registered {} new forms", seeded);
        }
        info!("Database tables created successfully");
        Ok(())
    }
}

fn add_column_if_missing(
    conn: &Connection,
    table: &str,
    column: &str,
    decl: &str,
) -> SurveyResult<()> {
    let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
    match conn.execute(&sql, []) {
        Ok(_) => {
            warn!("Added missing column {}.{}", table, column);
            Ok(())
        }
        Err(err) if is_duplicate_column(&err) => Ok(()),
        Err(err) => Err(SqlSnafu {}.into_error(err)),
    }
}

fn is_duplicate_column(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            message.contains("duplicate column name")
        }
        _ => false,
    }
}

/// Inserts a zeroed counter row for every configured form that has none.
///
/// Returns the number of rows created.
pub(crate) fn seed_counters_tx(conn: &Connection, catalog: &Catalog) -> SurveyResult<usize> {
    let mut stmt = conn
        .prepare_cached("INSERT OR IGNORE INTO form_counters (form_id) VALUES (?1)")
        .context(SqlSnafu {})?;
    let mut inserted = 0;
    for form_id in catalog.form_ids() {
        inserted += stmt.execute([form_id]).context(SqlSnafu {})?;
    }
    Ok(inserted)
}

/// Fixed width, so that the textual order is the chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> SurveyResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .context(CorruptTimestampSnafu { value })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use brand_survey::builder::CatalogBuilder;
    use tempfile::TempDir;

    /// A store backed by a fresh database file. The directory must outlive the store.
    pub fn temp_store_with(catalog: Catalog, rules: SurveyRules) -> (TempDir, SurveyStore) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let settings = StoreSettings {
            path: dir.path().join("survey.db"),
            pool_size: 4,
            acquire_timeout: Duration::from_secs(10),
        };
        let store = SurveyStore::connect(&settings, catalog, rules).unwrap();
        store.init_schema().unwrap();
        (dir, store)
    }

    pub fn temp_store() -> (TempDir, SurveyStore) {
        temp_store_with(
            CatalogBuilder::reference().build().unwrap(),
            SurveyRules::DEFAULT_RULES,
        )
    }
}
