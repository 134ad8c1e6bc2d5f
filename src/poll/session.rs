// ********* Respondent flow **********

use crate::poll::db::SurveyStore;
use crate::poll::submissions::SubmissionReceipt;
use crate::poll::*;

use log::warn;
use uuid::Uuid;

/// One respondent visit: the assigned form and the answers collected so far.
///
/// A session is local to its caller. Only `begin` and `submit` reach the
/// storage.
#[derive(Debug, Clone)]
pub struct SurveySession {
    session_id: String,
    form_id: Option<FormId>,
    answers: BTreeMap<String, String>,
    top_choice: Option<String>,
    bottom_choice: Option<String>,
    receipt: Option<SubmissionReceipt>,
}

impl Default for SurveySession {
    fn default() -> Self {
        SurveySession::new()
    }
}

impl SurveySession {
    /// A new visit with a random identifier.
    pub fn new() -> SurveySession {
        SurveySession::with_id(&Uuid::new_v4().to_string())
    }

    pub fn with_id(session_id: &str) -> SurveySession {
        SurveySession {
            session_id: session_id.to_string(),
            form_id: None,
            answers: BTreeMap::new(),
            top_choice: None,
            bottom_choice: None,
            receipt: None,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn form_id(&self) -> Option<FormId> {
        self.form_id
    }

    pub fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    pub fn is_submitted(&self) -> bool {
        self.receipt.is_some()
    }

    /// Asks the store for a form and starts over with no answers.
    pub fn begin(&mut self, store: &SurveyStore) -> SurveyResult<FormId> {
        let form_id = store.assign_form()?;
        self.start(form_id);
        debug!("begin: session {} got form {}", self.session_id, form_id);
        Ok(form_id)
    }

    /// Continues a visit whose form was assigned earlier, without a new assignment.
    pub fn resume(&mut self, catalog: &Catalog, form_id: FormId) -> SurveyResult<()> {
        ensure!(catalog.form(form_id).is_some(), UnknownFormSnafu { form_id });
        self.start(form_id);
        Ok(())
    }

    fn start(&mut self, form_id: FormId) {
        self.form_id = Some(form_id);
        self.answers.clear();
        self.top_choice = None;
        self.bottom_choice = None;
        self.receipt = None;
    }

    /// Records the name picked for one question. A later answer replaces an earlier one.
    pub fn answer(&mut self, catalog: &Catalog, question_id: &str, name: &str) -> SurveyResult<()> {
        let form_id = self.form_id.context(NoFormAssignedSnafu {})?;
        let form = catalog.form(form_id).context(UnknownFormSnafu { form_id })?;
        ensure!(
            catalog.question(question_id).is_some(),
            UnknownQuestionSnafu { question_id }
        );
        ensure!(form.offers(name), UnknownChoiceSnafu { name, form_id });
        self.answers
            .insert(question_id.to_string(), name.to_string());
        Ok(())
    }

    pub fn set_top_choice(&mut self, text: &str, max_chars: usize) -> SurveyResult<()> {
        self.top_choice = free_text("top choice", text, max_chars)?;
        Ok(())
    }

    pub fn set_bottom_choice(&mut self, text: &str, max_chars: usize) -> SurveyResult<()> {
        self.bottom_choice = free_text("bottom choice", text, max_chars)?;
        Ok(())
    }

    /// The 1-based positions of the questions still without an answer.
    pub fn unanswered(&self, catalog: &Catalog) -> Vec<usize> {
        catalog
            .questions()
            .iter()
            .enumerate()
            .filter(|(_, q)| !self.answers.contains_key(&q.id))
            .map(|(idx, _)| idx + 1)
            .collect()
    }

    /// Validates the answers and stores the submission.
    ///
    /// The answers are kept when this fails, so that the respondent can fix
    /// them or retry.
    pub fn submit(&mut self, store: &SurveyStore) -> SurveyResult<SubmissionReceipt> {
        ensure!(self.receipt.is_none(), AlreadySubmittedSnafu {});
        let form_id = self.form_id.context(NoFormAssignedSnafu {})?;
        let missing = self.unanswered(store.catalog());
        ensure!(missing.is_empty(), MissingAnswersSnafu { questions: missing });

        let res = store.save_submission(
            form_id,
            &self.session_id,
            &self.answers,
            self.top_choice.as_deref(),
            self.bottom_choice.as_deref(),
        );
        match res {
            Ok(receipt) => {
                self.receipt = Some(receipt.clone());
                Ok(receipt)
            }
            Err(e) => {
                warn!("Session {}: submission failed: {}", self.session_id, e);
                Err(e)
            }
        }
    }
}

// Blank answers are treated as absent.
fn free_text(field: &'static str, text: &str, max: usize) -> SurveyResult<Option<String>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let length = trimmed.chars().count();
    ensure!(length <= max, FreeTextTooLongSnafu { field, length, max });
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::db::testing::*;

    fn answer_all(session: &mut SurveySession, catalog: &Catalog) {
        let form = catalog.form(session.form_id().unwrap()).unwrap().clone();
        for (idx, q) in catalog.questions().iter().enumerate() {
            let name = &form.names[idx % form.names.len()];
            session.answer(catalog, &q.id, name).unwrap();
        }
    }

    #[test]
    fn complete_flow() {
        let (_dir, store) = temp_store();
        let mut session = SurveySession::new();
        assert_eq!(session.session_id().len(), 36);
        let form_id = session.begin(&store).unwrap();
        assert_eq!(form_id, 1);
        assert_eq!(session.unanswered(store.catalog()), vec![1, 2, 3, 4, 5]);
        answer_all(&mut session, store.catalog());
        session.set_top_choice("  Give-io is short  ", 2000).unwrap();
        session.set_bottom_choice("   ", 2000).unwrap();
        let receipt = session.submit(&store).unwrap();
        assert_eq!(receipt.form_id, 1);
        assert_eq!(receipt.submission_count, Some(1));
        assert!(session.is_submitted());

        let stored = store.list_submissions(None).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].session_id, session.session_id());
        assert_eq!(stored[0].top_choice.as_deref(), Some("Give-io is short"));
        assert_eq!(stored[0].bottom_choice, None);

        let again = session.submit(&store).unwrap_err();
        assert!(matches!(again, SurveyError::AlreadySubmitted { .. }));
    }

    #[test]
    fn missing_answers_are_reported_and_kept() {
        let (_dir, store) = temp_store();
        let catalog = store.catalog();
        let mut session = SurveySession::with_id("visit-1");
        session.resume(catalog, 3).unwrap();
        session.answer(catalog, "q1", "Philanthri").unwrap();
        session.answer(catalog, "q2", "Humanitable").unwrap();
        session.answer(catalog, "q3", "Donanthropy").unwrap();
        session.answer(catalog, "q5", "Give Connects").unwrap();
        let err = session.submit(&store).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Please answer Question 4 before submitting."
        );
        assert_eq!(session.answers().len(), 4);
        assert!(store.list_submissions(None).unwrap().is_empty());

        session.answer(catalog, "q4", "Philanthri").unwrap();
        session.submit(&store).unwrap();
        assert_eq!(store.get_form_statistics().unwrap()[&3], 1);
    }

    #[test]
    fn answers_must_come_from_the_form() {
        let (_dir, store) = temp_store();
        let catalog = store.catalog();
        let mut session = SurveySession::with_id("visit-2");
        let err = session.answer(catalog, "q1", "Give-io").unwrap_err();
        assert!(matches!(err, SurveyError::NoFormAssigned { .. }));

        session.resume(catalog, 1).unwrap();
        let err = session.answer(catalog, "q1", "Causenex").unwrap_err();
        assert!(matches!(err, SurveyError::UnknownChoice { form_id: 1, .. }));
        let err = session.answer(catalog, "q9", "Give-io").unwrap_err();
        assert!(matches!(err, SurveyError::UnknownQuestion { .. }));
        assert!(matches!(
            session.resume(catalog, 7),
            Err(SurveyError::UnknownForm { form_id: 7 })
        ));
    }

    #[test]
    fn free_text_is_capped() {
        let mut session = SurveySession::with_id("visit-3");
        let err = session.set_top_choice("abcdef", 5).unwrap_err();
        assert!(matches!(
            err,
            SurveyError::FreeTextTooLong {
                length: 6,
                max: 5,
                ..
            }
        ));
        session.set_top_choice("  abcde ", 5).unwrap();
        // Characters are counted, not bytes.
        session.set_bottom_choice("ééééé", 5).unwrap();
    }

    #[test]
    fn begin_starts_over() {
        let (_dir, store) = temp_store();
        let mut session = SurveySession::new();
        session.begin(&store).unwrap();
        answer_all(&mut session, store.catalog());
        let second = session.begin(&store).unwrap();
        assert_eq!(second, 2);
        assert_eq!(session.unanswered(store.catalog()).len(), 5);
    }
}
