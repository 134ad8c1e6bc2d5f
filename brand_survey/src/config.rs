// ********* Catalog data structures ***********

use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::Display;

/// Identifier of a form. Always strictly positive.
pub type FormId = u32;

/// The number of candidate names offered by every form.
pub const NAMES_PER_FORM: usize = 4;

/// A fixed bundle of candidate names shown to one respondent.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Form {
    pub id: FormId,
    pub title: String,
    /// Exactly `NAMES_PER_FORM` names, unique within the form.
    /// The same name may appear on several forms.
    pub names: Vec<String>,
}

impl Form {
    /// True if the given name is one of the candidates of this form.
    pub fn offers(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }
}

/// A question shared by all the forms.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Question {
    pub id: String,
    pub text: String,
}

/// The immutable set of forms and questions for the lifetime of the process.
///
/// A catalog can only be obtained through validation, either with
/// `Catalog::new` or with the `builder::CatalogBuilder`.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Catalog {
    // Sorted by increasing form id.
    forms: Vec<Form>,
    questions: Vec<Question>,
}

impl Catalog {
    pub fn new(forms: Vec<Form>, questions: Vec<Question>) -> Result<Catalog, CatalogErrors> {
        if forms.is_empty() {
            return Err(CatalogErrors::NoForms);
        }
        if questions.is_empty() {
            return Err(CatalogErrors::NoQuestions);
        }
        let mut sorted_forms = forms;
        sorted_forms.sort_by_key(|f| f.id);
        for (idx, form) in sorted_forms.iter().enumerate() {
            if form.id == 0 {
                return Err(CatalogErrors::InvalidFormId(form.id));
            }
            if idx > 0 && sorted_forms[idx - 1].id == form.id {
                return Err(CatalogErrors::DuplicateFormId(form.id));
            }
            if form.names.len() != NAMES_PER_FORM {
                return Err(CatalogErrors::WrongNameCount {
                    form_id: form.id,
                    found: form.names.len(),
                });
            }
            for (pos, name) in form.names.iter().enumerate() {
                if name.trim().is_empty() {
                    return Err(CatalogErrors::EmptyName { form_id: form.id });
                }
                if form.names[..pos].contains(name) {
                    return Err(CatalogErrors::DuplicateName {
                        form_id: form.id,
                        name: name.clone(),
                    });
                }
            }
        }
        for (pos, q) in questions.iter().enumerate() {
            if q.id.trim().is_empty() {
                return Err(CatalogErrors::EmptyQuestionId);
            }
            if questions[..pos].iter().any(|q2| q2.id == q.id) {
                return Err(CatalogErrors::DuplicateQuestion(q.id.clone()));
            }
        }
        Ok(Catalog {
            forms: sorted_forms,
            questions,
        })
    }

    /// The forms, ordered by form id.
    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    /// The questions, in presentation order.
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn form(&self, form_id: FormId) -> Option<&Form> {
        self.forms.iter().find(|f| f.id == form_id)
    }

    pub fn form_ids(&self) -> Vec<FormId> {
        self.forms.iter().map(|f| f.id).collect()
    }

    /// The deterministic default form: the one with the lowest id.
    pub fn first_form_id(&self) -> FormId {
        // Not empty by construction.
        self.forms[0].id
    }

    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// All the distinct names across all the forms, sorted alphabetically.
    pub fn all_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .forms
            .iter()
            .flat_map(|f| f.names.iter().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Errors detected when validating a catalog.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum CatalogErrors {
    NoForms,
    NoQuestions,
    InvalidFormId(FormId),
    DuplicateFormId(FormId),
    WrongNameCount { form_id: FormId, found: usize },
    EmptyName { form_id: FormId },
    DuplicateName { form_id: FormId, name: String },
    EmptyQuestionId,
    DuplicateQuestion(String),
}

impl Error for CatalogErrors {}

impl Display for CatalogErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogErrors::NoForms => write!(f, "the catalog defines no form"),
            CatalogErrors::NoQuestions => write!(f, "the catalog defines no question"),
            CatalogErrors::InvalidFormId(id) => {
                write!(f, "form id {} is invalid, ids start at 1", id)
            }
            CatalogErrors::DuplicateFormId(id) => write!(f, "form id {} is defined twice", id),
            CatalogErrors::WrongNameCount { form_id, found } => write!(
                f,
                "form {} has {} names, expected {}",
                form_id, found, NAMES_PER_FORM
            ),
            CatalogErrors::EmptyName { form_id } => write!(f, "form {} has an empty name", form_id),
            CatalogErrors::DuplicateName { form_id, name } => {
                write!(f, "form {} lists the name {:?} twice", form_id, name)
            }
            CatalogErrors::EmptyQuestionId => write!(f, "a question has an empty id"),
            CatalogErrors::DuplicateQuestion(id) => {
                write!(f, "question id {:?} is defined twice", id)
            }
        }
    }
}

// ******** Counters *********

/// The bookkeeping row of one form.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct FormCounter {
    pub form_id: FormId,
    pub submission_count: u64,
    /// How many times the form was handed out, completed or not.
    pub assignment_count: u64,
    pub last_assigned: Option<DateTime<Utc>>,
}

impl FormCounter {
    pub fn fresh(form_id: FormId) -> FormCounter {
        FormCounter {
            form_id,
            submission_count: 0,
            assignment_count: 0,
            last_assigned: None,
        }
    }
}

// ******** Output data structures *********

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct NameVotes {
    pub name: String,
    pub votes: u64,
}

/// How often a name was shown versus how often it was picked for one question.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ExposureGap {
    pub name: String,
    pub exposure_count: u64,
    pub vote_count: u64,
    /// exposure_count - vote_count. Negative only with inconsistent data
    /// (answers naming candidates that were not on the form).
    pub gap: i64,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum BottomRanking {
    /// Fewest votes first.
    ByVotes(Vec<NameVotes>),
    /// Largest gap first.
    ByExposureGap(Vec<ExposureGap>),
}

impl BottomRanking {
    pub fn is_empty(&self) -> bool {
        match self {
            BottomRanking::ByVotes(v) => v.is_empty(),
            BottomRanking::ByExposureGap(v) => v.is_empty(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        match self {
            BottomRanking::ByVotes(v) => v.iter().map(|nv| nv.name.clone()).collect(),
            BottomRanking::ByExposureGap(v) => v.iter().map(|eg| eg.name.clone()).collect(),
        }
    }
}

/// The most and least appealing names for one question.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct QuestionRanking {
    pub top: Vec<NameVotes>,
    pub bottom: BottomRanking,
}

// ********* Rules **********

/// How the bottom of a ranking is computed.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum RankingStrategy {
    /// Names with the fewest votes, among the names that received votes.
    VoteCount,
    /// Names seen the most often but picked the least often.
    ExposureGap,
}

/// What counts as one exposure of a name.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ExposurePolicy {
    /// A completed submission on a form listing the name.
    CompletedSubmissions,
    /// Any assignment of a form listing the name, including abandoned visits.
    Assignments,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct SurveyRules {
    pub ranking_strategy: RankingStrategy,
    pub exposure_policy: ExposurePolicy,
    /// How many names are reported at the top and at the bottom.
    pub ranking_depth: usize,
    /// Maximum number of characters of each optional free-text answer.
    pub max_free_text_chars: usize,
}

impl SurveyRules {
    pub const DEFAULT_RULES: SurveyRules = SurveyRules {
        ranking_strategy: RankingStrategy::ExposureGap,
        exposure_policy: ExposurePolicy::CompletedSubmissions,
        ranking_depth: 3,
        max_free_text_chars: 2000,
    };
}
