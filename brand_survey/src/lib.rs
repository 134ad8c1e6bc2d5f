mod config;
use log::debug;

use std::{
    cmp::Reverse,
    collections::{BTreeMap, HashMap},
    ops::AddAssign,
};

pub use crate::config::*;

pub mod builder;
pub mod manual;

// **** Private structures ****

#[derive(Eq, PartialEq, Debug, Clone, Copy, PartialOrd, Ord, Hash)]
struct ExposureCount(u64);

impl ExposureCount {
    const EMPTY: ExposureCount = ExposureCount(0);
}

impl AddAssign for ExposureCount {
    fn add_assign(&mut self, rhs: ExposureCount) {
        self.0 += rhs.0;
    }
}

/// Chooses the form to hand out to a new respondent.
///
/// The form with the fewest submissions wins. Ties are broken by the oldest
/// assignment time, a form that was never assigned coming before any other.
/// Remaining ties go to the lowest form id, so the choice is deterministic.
///
/// Returns `None` only if no counter is provided.
pub fn choose_form(counters: &[FormCounter]) -> Option<FormId> {
    // Option ordering puts None before Some, which is the tie-break we want.
    let chosen = counters
        .iter()
        .min_by_key(|c| (c.submission_count, c.last_assigned, c.form_id))
        .map(|c| c.form_id);
    debug!("choose_form: counters: {:?} chosen: {:?}", counters, chosen);
    chosen
}

/// Computes how many times each name of the catalog was shown.
///
/// Arguments:
/// * `catalog` the forms, which define which names are shown together
/// * `per_form` the number of exposures of each form (completed submissions or
/// assignments, depending on the exposure policy). Forms that are not listed
/// count as never shown.
///
/// Every name of the catalog is returned, including the ones never shown.
pub fn exposure_counts(catalog: &Catalog, per_form: &HashMap<FormId, u64>) -> HashMap<String, u64> {
    let mut res: HashMap<String, ExposureCount> = catalog
        .all_names()
        .into_iter()
        .map(|name| (name, ExposureCount::EMPTY))
        .collect();
    for form in catalog.forms() {
        let shown = ExposureCount(per_form.get(&form.id).cloned().unwrap_or(0));
        for name in form.names.iter() {
            if let Some(ec) = res.get_mut(name) {
                *ec += shown;
            }
        }
    }
    debug!("exposure_counts: per_form: {:?} exposures: {:?}", per_form, res);
    res.into_iter().map(|(name, ec)| (name, ec.0)).collect()
}

/// The names with the most votes, ties broken alphabetically.
fn top_by_votes(votes: &HashMap<String, u64>, depth: usize) -> Vec<NameVotes> {
    let mut sorted: Vec<(&String, u64)> = votes
        .iter()
        .filter(|(_, &v)| v > 0)
        .map(|(name, &v)| (name, v))
        .collect();
    sorted.sort_by_key(|(name, v)| (Reverse(*v), *name));
    sorted
        .into_iter()
        .take(depth)
        .map(|(name, votes)| NameVotes {
            name: name.clone(),
            votes,
        })
        .collect()
}

/// The names with the fewest votes, among the names that received at least one.
fn bottom_by_votes(votes: &HashMap<String, u64>, depth: usize) -> Vec<NameVotes> {
    let mut sorted: Vec<(&String, u64)> = votes
        .iter()
        .filter(|(_, &v)| v > 0)
        .map(|(name, &v)| (name, v))
        .collect();
    sorted.sort_by_key(|(name, v)| (*v, *name));
    sorted
        .into_iter()
        .take(depth)
        .map(|(name, votes)| NameVotes {
            name: name.clone(),
            votes,
        })
        .collect()
}

/// The names with the largest gap between exposures and votes.
///
/// A name that was never shown has no meaningful gap and is left out.
fn bottom_by_exposure_gap(
    votes: &HashMap<String, u64>,
    exposures: &HashMap<String, u64>,
    depth: usize,
) -> Vec<ExposureGap> {
    let mut gaps: Vec<ExposureGap> = exposures
        .iter()
        .filter(|(_, &exposure)| exposure > 0)
        .map(|(name, &exposure_count)| {
            let vote_count = votes.get(name).cloned().unwrap_or(0);
            ExposureGap {
                name: name.clone(),
                exposure_count,
                vote_count,
                gap: exposure_count as i64 - vote_count as i64,
            }
        })
        .collect();
    gaps.sort_by(|a, b| b.gap.cmp(&a.gap).then_with(|| a.name.cmp(&b.name)));
    gaps.truncate(depth);
    gaps
}

/// Ranks the names for a single question.
///
/// Arguments:
/// * `votes` how many times each answer was selected for this question
/// * `exposures` how many times each name was shown (see `exposure_counts`).
/// Only used with the exposure gap strategy.
/// * `rules` the strategy and the depth of the ranking
pub fn rank_question(
    votes: &HashMap<String, u64>,
    exposures: &HashMap<String, u64>,
    rules: &SurveyRules,
) -> QuestionRanking {
    let top = top_by_votes(votes, rules.ranking_depth);
    let bottom = match rules.ranking_strategy {
        RankingStrategy::VoteCount => {
            BottomRanking::ByVotes(bottom_by_votes(votes, rules.ranking_depth))
        }
        RankingStrategy::ExposureGap => BottomRanking::ByExposureGap(bottom_by_exposure_gap(
            votes,
            exposures,
            rules.ranking_depth,
        )),
    };
    QuestionRanking { top, bottom }
}

/// Ranks the names for every question of the catalog.
///
/// `votes_by_question` maps a question id to the tally of its answers. A
/// question without any tally gets empty rankings, so the result always has
/// one entry per question of the catalog.
pub fn rank_questions(
    catalog: &Catalog,
    votes_by_question: &HashMap<String, HashMap<String, u64>>,
    exposures: &HashMap<String, u64>,
    rules: &SurveyRules,
) -> BTreeMap<String, QuestionRanking> {
    let no_votes: HashMap<String, u64> = HashMap::new();
    let mut res: BTreeMap<String, QuestionRanking> = BTreeMap::new();
    for q in catalog.questions() {
        let votes = votes_by_question.get(&q.id).unwrap_or(&no_votes);
        let ranking = rank_question(votes, exposures, rules);
        debug!("rank_questions: question {}: {:?}", q.id, ranking);
        res.insert(q.id.clone(), ranking);
    }
    res
}
