// ********* Results view **********

use crate::poll::*;

const NO_DATA: &str = "No data yet";

/// Renders the statistics and the rankings as plain text.
///
/// Works on empty data: every question is listed, with "No data yet" in
/// place of the missing rankings.
pub fn render_results(
    catalog: &Catalog,
    stats: &BTreeMap<FormId, u64>,
    rankings: &BTreeMap<String, QuestionRanking>,
) -> String {
    let mut lines: Vec<String> = vec!["Survey Results".to_string(), String::new()];

    lines.push("Survey Statistics".to_string());
    for (form_id, count) in stats {
        let title = catalog
            .form(*form_id)
            .map(|f| f.title.clone())
            .unwrap_or_else(|| format!("Survey Form {}", form_id));
        lines.push(format!("  {}: {} submissions", title, count));
    }
    lines.push(String::new());

    lines.push("Question Rankings".to_string());
    for (idx, question) in catalog.questions().iter().enumerate() {
        lines.push(String::new());
        lines.push(format!("Question {}: {}", idx + 1, question.text));
        match rankings.get(&question.id) {
            Some(ranking) => {
                lines.push("  Top Names:".to_string());
                push_top(&mut lines, &ranking.top);
                lines.push("  Bottom Names:".to_string());
                push_bottom(&mut lines, &ranking.bottom);
            }
            None => {
                lines.push(format!("  {}", NO_DATA));
            }
        }
    }
    lines.push(String::new());
    lines.join("\n")
}

fn push_top(lines: &mut Vec<String>, top: &[NameVotes]) {
    if top.is_empty() {
        lines.push(format!("    {}", NO_DATA));
    }
    for (pos, nv) in top.iter().enumerate() {
        lines.push(format!("    {}. {} - {} votes", pos + 1, nv.name, nv.votes));
    }
}

fn push_bottom(lines: &mut Vec<String>, bottom: &BottomRanking) {
    if bottom.is_empty() {
        lines.push(format!("    {}", NO_DATA));
        return;
    }
    match bottom {
        BottomRanking::ByVotes(l) => {
            for (pos, nv) in l.iter().enumerate() {
                lines.push(format!("    {}. {} - {} votes", pos + 1, nv.name, nv.votes));
            }
        }
        BottomRanking::ByExposureGap(l) => {
            for (pos, eg) in l.iter().enumerate() {
                lines.push(format!(
                    "    {}. {} - shown {} times, picked {} times (gap {})",
                    pos + 1,
                    eg.name,
                    eg.exposure_count,
                    eg.vote_count,
                    eg.gap
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brand_survey::builder::CatalogBuilder;

    #[test]
    fn renders_empty_results() {
        let catalog = CatalogBuilder::reference().build().unwrap();
        let stats: BTreeMap<FormId, u64> = catalog.form_ids().into_iter().map(|id| (id, 0)).collect();
        let rankings = rank_questions(
            &catalog,
            &HashMap::new(),
            &HashMap::new(),
            &SurveyRules::DEFAULT_RULES,
        );
        let text = render_results(&catalog, &stats, &rankings);
        assert!(text.contains("Survey Form A: 0 submissions"));
        assert!(text.contains("Question 5: Which name do you like most overall?"));
        assert_eq!(text.matches(NO_DATA).count(), 10);
    }

    #[test]
    fn renders_rankings() {
        let catalog = CatalogBuilder::reference().build().unwrap();
        let stats: BTreeMap<FormId, u64> = [(1, 2)].into_iter().collect();
        let mut rankings: BTreeMap<String, QuestionRanking> = BTreeMap::new();
        rankings.insert(
            "q1".to_string(),
            QuestionRanking {
                top: vec![NameVotes {
                    name: "Give-io".to_string(),
                    votes: 2,
                }],
                bottom: BottomRanking::ByExposureGap(vec![ExposureGap {
                    name: "Kinderfully".to_string(),
                    exposure_count: 2,
                    vote_count: 0,
                    gap: 2,
                }]),
            },
        );
        let text = render_results(&catalog, &stats, &rankings);
        assert!(text.contains("Survey Form A: 2 submissions"));
        assert!(text.contains("Top Names:\n    1. Give-io - 2 votes"));
        assert!(text.contains("1. Kinderfully - shown 2 times, picked 0 times (gap 2)"));
        // The questions without rankings are still listed.
        assert!(text.contains("Question 2: Which name is the most trustworthy?\n  No data yet"));
    }
}
