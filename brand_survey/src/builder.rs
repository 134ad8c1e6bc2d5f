pub use crate::config::*;

/// A builder for assembling a catalog of forms and questions.
///
/// Forms and questions can be added in any order. All the checks are
/// performed when calling `build`.
///
/// ```
/// pub use brand_survey::builder::CatalogBuilder;
/// # use brand_survey::CatalogErrors;
///
/// let catalog = CatalogBuilder::new()
///     .form(1, "Survey Form A", &["Aurora", "Beacon", "Catalyst", "Delta"])
///     .form(2, "Survey Form B", &["Evergreen", "Fusion", "Genesis", "Harmony"])
///     .question("q1", "Which name is the most memorable?")
///     .build()?;
///
/// assert_eq!(catalog.first_form_id(), 1);
/// assert!(catalog.form(2).unwrap().offers("Fusion"));
///
/// # Ok::<(), CatalogErrors>(())
/// ```
#[derive(Default)]
pub struct CatalogBuilder {
    pub(crate) _forms: Vec<Form>,
    pub(crate) _questions: Vec<Question>,
}

impl CatalogBuilder {
    pub fn new() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Adds a form.
    ///
    /// names: the candidate names, in display order.
    pub fn form(mut self, id: FormId, title: &str, names: &[&str]) -> CatalogBuilder {
        self._forms.push(Form {
            id,
            title: title.to_string(),
            names: names.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    /// Adds a question. Questions are presented in the order they are added.
    pub fn question(mut self, id: &str, text: &str) -> CatalogBuilder {
        self._questions.push(Question {
            id: id.to_string(),
            text: text.to_string(),
        });
        self
    }

    pub fn build(self) -> Result<Catalog, CatalogErrors> {
        Catalog::new(self._forms, self._questions)
    }

    /// The catalog of the brand-name study: six forms drawn from thirteen
    /// names, most of them appearing on two forms, and five questions.
    pub fn reference() -> CatalogBuilder {
        CatalogBuilder::new()
            .form(
                1,
                "Survey Form A",
                &["Philanthrifind", "Give-io", "Donathropy", "Kinderfully"],
            )
            .form(
                2,
                "Survey Form B",
                &["Philanthrifound", "Causenex", "Givanthropy", "Tomatchin"],
            )
            .form(
                3,
                "Survey Form C",
                &["Philanthri", "Give Connects", "Donanthropy", "Humanitable"],
            )
            .form(
                4,
                "Survey Form D",
                &["Givio Gives", "Philanthrifound", "Givanthropy", "Humanitable"],
            )
            .form(
                5,
                "Survey Form E",
                &["Give Connects", "Philanthrifind", "Give-io", "Tomatchin"],
            )
            .form(
                6,
                "Survey Form F",
                &["Philanthri", "Givio Gives", "Kinderfully", "Causenex"],
            )
            .question("q1", "Which name is the most memorable?")
            .question("q2", "Which name is the most trustworthy?")
            .question("q3", "Which name sounds the most professional?")
            .question("q4", "Which name would you be most likely to recommend?")
            .question("q5", "Which name do you like most overall?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_catalog_is_valid() {
        let catalog = CatalogBuilder::reference().build().unwrap();
        assert_eq!(catalog.form_ids(), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(catalog.questions().len(), 5);
        assert_eq!(catalog.all_names().len(), 13);
    }

    #[test]
    fn rejects_wrong_name_count() {
        let res = CatalogBuilder::new()
            .form(1, "A", &["a", "b", "c"])
            .question("q1", "?")
            .build();
        assert_eq!(
            res,
            Err(CatalogErrors::WrongNameCount {
                form_id: 1,
                found: 3
            })
        );
    }

    #[test]
    fn rejects_duplicate_names_within_a_form() {
        let res = CatalogBuilder::new()
            .form(1, "A", &["a", "b", "a", "c"])
            .question("q1", "?")
            .build();
        assert_eq!(
            res,
            Err(CatalogErrors::DuplicateName {
                form_id: 1,
                name: "a".to_string()
            })
        );
    }

    #[test]
    fn rejects_duplicate_form_ids_and_zero() {
        let dup = CatalogBuilder::new()
            .form(2, "A", &["a", "b", "c", "d"])
            .form(2, "B", &["e", "f", "g", "h"])
            .question("q1", "?")
            .build();
        assert_eq!(dup, Err(CatalogErrors::DuplicateFormId(2)));
        let zero = CatalogBuilder::new()
            .form(0, "A", &["a", "b", "c", "d"])
            .question("q1", "?")
            .build();
        assert_eq!(zero, Err(CatalogErrors::InvalidFormId(0)));
    }

    #[test]
    fn rejects_empty_catalogs() {
        assert_eq!(
            CatalogBuilder::new().question("q1", "?").build(),
            Err(CatalogErrors::NoForms)
        );
        assert_eq!(
            CatalogBuilder::new()
                .form(1, "A", &["a", "b", "c", "d"])
                .build(),
            Err(CatalogErrors::NoQuestions)
        );
    }

    #[test]
    fn forms_are_sorted_by_id() {
        let catalog = CatalogBuilder::new()
            .form(7, "G", &["a", "b", "c", "d"])
            .form(3, "C", &["a", "e", "f", "g"])
            .question("q1", "?")
            .build()
            .unwrap();
        assert_eq!(catalog.first_form_id(), 3);
        assert_eq!(catalog.form_ids(), vec![3, 7]);
    }
}
