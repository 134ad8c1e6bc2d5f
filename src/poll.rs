use log::{debug, info};

use brand_survey::*;
use snafu::{prelude::*, Snafu};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use std::collections::{BTreeMap, HashMap};

use crate::args::{Args, Command};
use crate::poll::config_reader::*;
use crate::poll::db::SurveyStore;
use crate::poll::session::SurveySession;
use crate::poll::submissions::{StoredSubmission, SubmissionReceipt};

pub mod aggregator;
pub mod allocator;
pub mod config_reader;
pub mod db;
pub mod report;
pub mod session;
pub mod submissions;

/// The families of failures, as seen by an operator or a respondent.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ErrorKind {
    /// The program cannot start. Nothing respondent-facing may run.
    Configuration,
    /// The storage could not be reached or failed. The interaction may be retried.
    StorageUnavailable,
    /// The input of the respondent must be corrected.
    Validation,
    Internal,
}

#[derive(Debug, Snafu)]
pub enum SurveyError {
    #[snafu(display("DATABASE_URL is not set: configure the storage target before running the survey"))]
    MissingDatabaseUrl {},
    #[snafu(display("Unsupported storage target {url:?}: {reason}"))]
    InvalidDatabaseUrl { url: String, reason: String },
    #[snafu(display("DATABASE_POOL_SIZE must be a positive integer, got {value:?}"))]
    InvalidPoolSize { value: String },
    #[snafu(display("Error opening configuration file {path}"))]
    OpeningConfig {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing configuration file {path}: {source}"))]
    ParsingConfig {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Invalid catalog: {source}"))]
    InvalidCatalog { source: CatalogErrors },
    #[snafu(display("Invalid rules: {message}"))]
    InvalidRules { message: String },
    #[snafu(display("Question {question_id:?} has no storage column, expected one of q1 to q5"))]
    UnmappedQuestion { question_id: String },
    #[snafu(display("Question {question_id:?} is required by the storage schema but missing from the catalog"))]
    MissingQuestion { question_id: String },

    #[snafu(display("Failed to open the storage at {path}: {source}"))]
    PoolBuild { source: r2d2::Error, path: String },
    #[snafu(display("Storage unavailable: {source}"))]
    PoolCheckout { source: r2d2::Error },
    #[snafu(display("Storage error: {source}"))]
    Sql { source: rusqlite::Error },
    #[snafu(display("Stored timestamp {value:?} is not valid"))]
    CorruptTimestamp {
        source: chrono::ParseError,
        value: String,
    },

    #[snafu(display("{}", missing_answers_message(questions)))]
    MissingAnswers { questions: Vec<usize> },
    #[snafu(display("{name:?} is not a choice of form {form_id}"))]
    UnknownChoice { name: String, form_id: FormId },
    #[snafu(display("Unknown question {question_id:?}"))]
    UnknownQuestion { question_id: String },
    #[snafu(display("Unknown form {form_id}"))]
    UnknownForm { form_id: FormId },
    #[snafu(display("The {field} answer is {length} characters long, the maximum is {max}"))]
    FreeTextTooLong {
        field: &'static str,
        length: usize,
        max: usize,
    },
    #[snafu(display("Answers must be written as <question>=<name>, got {raw:?}"))]
    MalformedAnswer { raw: String },
    #[snafu(display("No form loaded. Please start the survey first."))]
    NoFormAssigned {},
    #[snafu(display("This survey was already submitted. Please start a new one."))]
    AlreadySubmitted {},

    #[snafu(display("Error rendering JSON: {source}"))]
    RenderingJson { source: serde_json::Error },
}

impl SurveyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SurveyError::MissingDatabaseUrl { .. }
            | SurveyError::InvalidDatabaseUrl { .. }
            | SurveyError::InvalidPoolSize { .. }
            | SurveyError::OpeningConfig { .. }
            | SurveyError::ParsingConfig { .. }
            | SurveyError::InvalidCatalog { .. }
            | SurveyError::InvalidRules { .. }
            | SurveyError::UnmappedQuestion { .. }
            | SurveyError::MissingQuestion { .. } => ErrorKind::Configuration,
            SurveyError::PoolBuild { .. }
            | SurveyError::PoolCheckout { .. }
            | SurveyError::Sql { .. }
            | SurveyError::CorruptTimestamp { .. } => ErrorKind::StorageUnavailable,
            SurveyError::MissingAnswers { .. }
            | SurveyError::UnknownChoice { .. }
            | SurveyError::UnknownQuestion { .. }
            | SurveyError::UnknownForm { .. }
            | SurveyError::FreeTextTooLong { .. }
            | SurveyError::MalformedAnswer { .. }
            | SurveyError::NoFormAssigned { .. }
            | SurveyError::AlreadySubmitted { .. } => ErrorKind::Validation,
            SurveyError::RenderingJson { .. } => ErrorKind::Internal,
        }
    }

    /// True if the same interaction may succeed when attempted again unchanged.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StorageUnavailable
    }

    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Configuration => 2,
            ErrorKind::StorageUnavailable => 3,
            ErrorKind::Validation => 4,
            ErrorKind::Internal => 1,
        }
    }

    /// The message shown to a respondent after a failed command.
    ///
    /// Storage details are not disclosed: the respondent is only asked to retry.
    /// Only a failed submit is reported as a failed save.
    pub fn respondent_message(&self, command: &Command) -> String {
        match (self.kind(), command) {
            (ErrorKind::StorageUnavailable, Command::Submit { .. }) => {
                "Failed to save submission. Please try again.".to_string()
            }
            (ErrorKind::StorageUnavailable, _) => {
                "The survey is temporarily unavailable. Please try again.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

pub type SurveyResult<T> = Result<T, SurveyError>;

fn missing_answers_message(questions: &[usize]) -> String {
    match questions {
        [q] => format!("Please answer Question {} before submitting.", q),
        _ => {
            let listed: Vec<String> = questions.iter().map(|q| q.to_string()).collect();
            format!(
                "Please answer all questions before submitting. Missing: Questions {}",
                listed.join(", ")
            )
        }
    }
}

fn form_to_json(session_id: &str, form: &Form, catalog: &Catalog) -> JSValue {
    let questions: Vec<JSValue> = catalog
        .questions()
        .iter()
        .map(|q| json!({"id": q.id, "text": q.text}))
        .collect();
    json!({
        "sessionId": session_id,
        "formId": form.id,
        "title": form.title,
        "names": form.names,
        "questions": questions
    })
}

fn statistics_to_json(catalog: &Catalog, stats: &BTreeMap<FormId, u64>) -> Vec<JSValue> {
    stats
        .iter()
        .map(|(form_id, count)| {
            let title = catalog
                .form(*form_id)
                .map(|f| f.title.clone())
                .unwrap_or_else(|| format!("Survey Form {}", form_id));
            json!({"formId": form_id, "title": title, "submissions": count})
        })
        .collect()
}

fn rankings_to_json(rankings: &BTreeMap<String, QuestionRanking>) -> JSValue {
    let mut res: JSMap<String, JSValue> = JSMap::new();
    for (question_id, ranking) in rankings {
        let top: Vec<JSValue> = ranking
            .top
            .iter()
            .map(|nv| json!({"name": nv.name, "count": nv.votes}))
            .collect();
        let bottom: Vec<JSValue> = match &ranking.bottom {
            BottomRanking::ByVotes(l) => l
                .iter()
                .map(|nv| json!({"name": nv.name, "count": nv.votes}))
                .collect(),
            BottomRanking::ByExposureGap(l) => l
                .iter()
                .map(|eg| {
                    json!({
                        "name": eg.name,
                        "exposureCount": eg.exposure_count,
                        "voteCount": eg.vote_count,
                        "gap": eg.gap
                    })
                })
                .collect(),
        };
        res.insert(question_id.clone(), json!({"top": top, "bottom": bottom}));
    }
    JSValue::Object(res)
}

fn receipt_to_json(session_id: &str, receipt: &SubmissionReceipt) -> JSValue {
    json!({
        "sessionId": session_id,
        "submissionId": receipt.submission_id,
        "formId": receipt.form_id,
        "counterUpdated": receipt.submission_count.is_some(),
        "submissionCount": receipt.submission_count
    })
}

fn submission_to_json(s: &StoredSubmission) -> JSValue {
    json!({
        "id": s.id,
        "formId": s.form_id,
        "sessionId": s.session_id,
        "submittedAt": db::format_timestamp(s.submitted_at),
        "answers": s.answers,
        "topChoice": s.top_choice,
        "bottomChoice": s.bottom_choice
    })
}

fn print_json(js: &JSValue) -> SurveyResult<()> {
    let pretty = serde_json::to_string_pretty(js).context(RenderingJsonSnafu {})?;
    println!("{}", pretty);
    Ok(())
}

fn parse_answer_args(raw_answers: &[String]) -> SurveyResult<Vec<(String, String)>> {
    let mut res: Vec<(String, String)> = Vec::new();
    for raw in raw_answers {
        let (question_id, name) = raw
            .split_once('=')
            .context(MalformedAnswerSnafu { raw: raw.clone() })?;
        res.push((question_id.trim().to_string(), name.trim().to_string()));
    }
    Ok(res)
}

fn run_assign(store: &SurveyStore, session_id: Option<String>) -> SurveyResult<()> {
    let mut session = match session_id {
        Some(id) => SurveySession::with_id(&id),
        None => SurveySession::new(),
    };
    let form_id = session.begin(store)?;
    let form = store
        .catalog()
        .form(form_id)
        .context(UnknownFormSnafu { form_id })?;
    print_json(&form_to_json(session.session_id(), form, store.catalog()))
}

fn run_submit(
    store: &SurveyStore,
    form_id: FormId,
    session_id: &str,
    raw_answers: &[String],
    top_choice: Option<String>,
    bottom_choice: Option<String>,
) -> SurveyResult<()> {
    let catalog = store.catalog();
    let max_chars = store.rules().max_free_text_chars;
    let mut session = SurveySession::with_id(session_id);
    session.resume(catalog, form_id)?;
    for (question_id, name) in parse_answer_args(raw_answers)? {
        session.answer(catalog, &question_id, &name)?;
    }
    if let Some(text) = top_choice {
        session.set_top_choice(&text, max_chars)?;
    }
    if let Some(text) = bottom_choice {
        session.set_bottom_choice(&text, max_chars)?;
    }
    let receipt = session.submit(store)?;
    print_json(&receipt_to_json(session.session_id(), &receipt))
}

fn run_results(store: &SurveyStore, as_json: bool) -> SurveyResult<()> {
    let stats = store.get_form_statistics()?;
    let rankings = store.get_question_rankings()?;
    if as_json {
        print_json(&json!({
            "statistics": statistics_to_json(store.catalog(), &stats),
            "rankings": rankings_to_json(&rankings)
        }))
    } else {
        print!(
            "{}",
            report::render_results(store.catalog(), &stats, &rankings)
        );
        Ok(())
    }
}

fn run_export(store: &SurveyStore, form_id: Option<FormId>) -> SurveyResult<()> {
    let submissions = store.list_submissions(form_id)?;
    let l: Vec<JSValue> = submissions.iter().map(submission_to_json).collect();
    print_json(&JSValue::Array(l))
}

/// Runs one command of the command line.
///
/// The configuration is fully validated, and the storage reached, before any
/// command runs.
pub fn run(args: &Args) -> SurveyResult<()> {
    let (catalog, rules) = load_survey(args.config.as_deref())?;
    let settings = store_settings_from_env()?;
    debug!("run: settings: {:?} rules: {:?}", settings, rules);

    let store = SurveyStore::connect(&settings, catalog, rules)?;
    store.check_connection()?;
    store.init_schema()?;

    match &args.command {
        Command::Init => {
            info!("Storage ready at {}", settings.path.display());
            Ok(())
        }
        Command::Assign { session } => run_assign(&store, session.clone()),
        Command::Submit {
            form,
            session,
            answers,
            top_choice,
            bottom_choice,
        } => run_submit(
            &store,
            *form,
            session,
            answers,
            top_choice.clone(),
            bottom_choice.clone(),
        ),
        Command::Results { json } => run_results(&store, *json),
        Command::Stats => {
            let stats = store.get_form_statistics()?;
            print_json(&JSValue::Array(statistics_to_json(store.catalog(), &stats)))
        }
        Command::Reconcile => {
            let changed: HashMap<FormId, (u64, u64)> = store.reconcile_counters()?;
            for (form_id, (before, after)) in changed.iter() {
                info!(
                    "Form {}: submission count corrected from {} to {}",
                    form_id, before, after
                );
            }
            let stats = store.get_form_statistics()?;
            print_json(&JSValue::Array(statistics_to_json(store.catalog(), &stats)))
        }
        Command::Export { form } => run_export(&store, *form),
    }
}
