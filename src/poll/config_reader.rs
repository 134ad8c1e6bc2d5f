use crate::poll::db::{answer_columns, StoreSettings};
use crate::poll::*;

use brand_survey::builder::CatalogBuilder;
use serde::{Deserialize, Serialize};
use std::fs;

pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DATABASE_POOL_SIZE_VAR: &str = "DATABASE_POOL_SIZE";

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    pub id: FormId,
    pub title: Option<String>,
    pub names: Vec<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConfig {
    pub id: String,
    pub text: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(rename = "rankingStrategy")]
    pub ranking_strategy: Option<String>,
    #[serde(rename = "exposurePolicy")]
    pub exposure_policy: Option<String>,
    #[serde(rename = "rankingDepth")]
    pub ranking_depth: Option<usize>,
    #[serde(rename = "maxFreeTextChars")]
    pub max_free_text_chars: Option<usize>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    pub forms: Vec<FormConfig>,
    pub questions: Vec<QuestionConfig>,
    pub rules: Option<RulesConfig>,
}

pub fn parse_config(contents: &str, path: &str) -> SurveyResult<SurveyConfig> {
    serde_json::from_str(contents).context(ParsingConfigSnafu { path })
}

pub fn read_config(path: &str) -> SurveyResult<SurveyConfig> {
    let contents = fs::read_to_string(path).context(OpeningConfigSnafu { path })?;
    debug!("read_config: read {} bytes from {}", contents.len(), path);
    parse_config(&contents, path)
}

pub fn validate_rules(rules: &RulesConfig) -> SurveyResult<SurveyRules> {
    let defaults = SurveyRules::DEFAULT_RULES;
    let res = SurveyRules {
        ranking_strategy: match rules.ranking_strategy.as_deref() {
            None | Some("exposureGap") => RankingStrategy::ExposureGap,
            Some("voteCount") => RankingStrategy::VoteCount,
            Some(x) => {
                return InvalidRulesSnafu {
                    message: format!("unknown ranking strategy {:?}", x),
                }
                .fail()
            }
        },
        exposure_policy: match rules.exposure_policy.as_deref() {
            None | Some("completedSubmissions") => ExposurePolicy::CompletedSubmissions,
            Some("assignments") => ExposurePolicy::Assignments,
            Some(x) => {
                return InvalidRulesSnafu {
                    message: format!("unknown exposure policy {:?}", x),
                }
                .fail()
            }
        },
        ranking_depth: match rules.ranking_depth {
            None => defaults.ranking_depth,
            Some(x) if x > 0 => x,
            Some(x) => {
                return InvalidRulesSnafu {
                    message: format!("rankingDepth must be positive, got {}", x),
                }
                .fail()
            }
        },
        max_free_text_chars: rules
            .max_free_text_chars
            .unwrap_or(defaults.max_free_text_chars),
    };
    Ok(res)
}

pub fn build_catalog(config: &SurveyConfig) -> SurveyResult<Catalog> {
    let forms: Vec<Form> = config
        .forms
        .iter()
        .map(|f| Form {
            id: f.id,
            title: match f.title.clone() {
                Some(x) if !x.trim().is_empty() => x,
                _ => format!("Survey Form {}", f.id),
            },
            names: f.names.clone(),
        })
        .collect();
    let questions: Vec<Question> = config
        .questions
        .iter()
        .map(|q| Question {
            id: q.id.clone(),
            text: q.text.clone(),
        })
        .collect();
    Catalog::new(forms, questions).context(InvalidCatalogSnafu {})
}

/// Loads the catalog and the rules, either from a file or the built-in study.
///
/// The catalog is checked against the storage columns, so that every question
/// has a place to be stored.
pub fn load_survey(config_path: Option<&str>) -> SurveyResult<(Catalog, SurveyRules)> {
    let (catalog, rules) = match config_path {
        Some(path) => {
            let config = read_config(path)?;
            let rules = validate_rules(&config.rules.clone().unwrap_or_default())?;
            (build_catalog(&config)?, rules)
        }
        None => (
            CatalogBuilder::reference()
                .build()
                .context(InvalidCatalogSnafu {})?,
            SurveyRules::DEFAULT_RULES,
        ),
    };
    answer_columns(&catalog)?;
    info!(
        "Loaded catalog with {} forms and {} questions",
        catalog.forms().len(),
        catalog.questions().len()
    );
    Ok((catalog, rules))
}

pub fn store_settings(url: Option<String>, pool_size: Option<String>) -> SurveyResult<StoreSettings> {
    let url = match url {
        Some(x) if !x.trim().is_empty() => x,
        _ => return MissingDatabaseUrlSnafu {}.fail(),
    };
    let mut settings = StoreSettings::from_url(&url)?;
    if let Some(raw) = pool_size {
        settings.pool_size = match raw.trim().parse::<u32>() {
            Ok(x) if x > 0 => x,
            _ => return InvalidPoolSizeSnafu { value: raw }.fail(),
        };
    }
    Ok(settings)
}

pub fn store_settings_from_env() -> SurveyResult<StoreSettings> {
    store_settings(
        std::env::var(DATABASE_URL_VAR).ok(),
        std::env::var(DATABASE_POOL_SIZE_VAR).ok(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::db::DEFAULT_POOL_SIZE;
    use std::path::PathBuf;

    const SMALL_CONFIG: &str = r#"{
        "forms": [
            { "id": 1, "title": "Survey Form A", "names": ["Aurora", "Beacon", "Catalyst", "Delta"] },
            { "id": 2, "names": ["Evergreen", "Fusion", "Genesis", "Harmony"] }
        ],
        "questions": [
            { "id": "q1", "text": "Which name is the most memorable?" },
            { "id": "q2", "text": "Which name is the most trustworthy?" },
            { "id": "q3", "text": "Which name sounds the most professional?" },
            { "id": "q4", "text": "Which name would you be most likely to recommend?" },
            { "id": "q5", "text": "Which name do you like most overall?" }
        ],
        "rules": { "rankingStrategy": "voteCount", "maxFreeTextChars": 500 }
    }"#;

    #[test]
    fn parses_a_catalog_file() {
        let config = parse_config(SMALL_CONFIG, "small.json").unwrap();
        let catalog = build_catalog(&config).unwrap();
        assert_eq!(catalog.form_ids(), vec![1, 2]);
        assert_eq!(catalog.form(2).unwrap().title, "Survey Form 2");
        answer_columns(&catalog).unwrap();
        let rules = validate_rules(&config.rules.unwrap()).unwrap();
        assert_eq!(rules.ranking_strategy, RankingStrategy::VoteCount);
        assert_eq!(rules.exposure_policy, ExposurePolicy::CompletedSubmissions);
        assert_eq!(rules.ranking_depth, 3);
        assert_eq!(rules.max_free_text_chars, 500);
    }

    #[test]
    fn reads_a_catalog_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.json");
        fs::write(&path, SMALL_CONFIG).unwrap();
        let (catalog, rules) = load_survey(path.to_str()).unwrap();
        assert_eq!(catalog.forms().len(), 2);
        assert_eq!(rules.ranking_strategy, RankingStrategy::VoteCount);

        let missing = load_survey(Some("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(missing, SurveyError::OpeningConfig { .. }));
        assert_eq!(missing.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn default_survey_is_the_reference_study() {
        let (catalog, rules) = load_survey(None).unwrap();
        assert_eq!(catalog.forms().len(), 6);
        assert_eq!(rules, SurveyRules::DEFAULT_RULES);
    }

    #[test]
    fn rejects_invalid_catalogs() {
        let config = parse_config(
            r#"{"forms": [{"id": 1, "names": ["a", "b", "c"]}], "questions": [{"id": "q1", "text": "?"}]}"#,
            "bad.json",
        )
        .unwrap();
        let err = build_catalog(&config).unwrap_err();
        assert!(matches!(err, SurveyError::InvalidCatalog { .. }));

        let malformed = parse_config("{ not json", "broken.json").unwrap_err();
        assert!(matches!(malformed, SurveyError::ParsingConfig { .. }));
    }

    #[test]
    fn rejects_unknown_rules() {
        let rules = RulesConfig {
            ranking_strategy: Some("random".to_string()),
            ..RulesConfig::default()
        };
        assert!(matches!(
            validate_rules(&rules),
            Err(SurveyError::InvalidRules { .. })
        ));
        let rules = RulesConfig {
            ranking_depth: Some(0),
            ..RulesConfig::default()
        };
        assert!(validate_rules(&rules).is_err());
    }

    #[test]
    fn database_url_is_required() {
        let err = store_settings(None, None).unwrap_err();
        assert!(matches!(err, SurveyError::MissingDatabaseUrl { .. }));
        assert_eq!(err.exit_code(), 2);
        assert!(store_settings(Some("  ".to_string()), None).is_err());
    }

    #[test]
    fn pool_size_is_optional_but_positive() {
        let s = store_settings(Some("sqlite://survey.db".to_string()), None).unwrap();
        assert_eq!(s.path, PathBuf::from("survey.db"));
        assert_eq!(s.pool_size, DEFAULT_POOL_SIZE);
        let s = store_settings(
            Some("survey.db".to_string()),
            Some("4".to_string()),
        )
        .unwrap();
        assert_eq!(s.pool_size, 4);
        let err = store_settings(Some("survey.db".to_string()), Some("0".to_string()))
            .unwrap_err();
        assert!(matches!(err, SurveyError::InvalidPoolSize { .. }));
    }
}
