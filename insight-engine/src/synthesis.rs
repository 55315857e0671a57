use crate::content::ForumAnalysis;
use crate::governance::{GovernanceAnalysis, RiskTier};
use chrono::{DateTime, Utc};
use digest_core::{ReportConfig, RunId};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;
use tracing::info;

fn referendum_reference() -> &'static Regex {
    static REFERENCE: OnceLock<Regex> = OnceLock::new();
    REFERENCE.get_or_init(|| {
        Regex::new(r"(?i)\bref(?:erendum)?\s*#?\s*(\d+)").expect("valid referendum regex")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecommendationKind {
    DataGap,
    Monitoring,
    DecisionDeposit,
    TreasuryReview,
    Engagement,
    CrossReference,
    Participation,
}

impl fmt::Display for RecommendationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecommendationKind::DataGap => "Data gap",
            RecommendationKind::Monitoring => "Monitoring",
            RecommendationKind::DecisionDeposit => "Decision deposit",
            RecommendationKind::TreasuryReview => "Treasury review",
            RecommendationKind::Engagement => "Engagement",
            RecommendationKind::CrossReference => "Cross-reference",
            RecommendationKind::Participation => "Participation",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub kind: RecommendationKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationKind {
    /// A trending keyword appears in a referendum's call.
    KeywordInCall,
    /// A hot topic's title names a referendum.
    TopicReferencesReferendum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub kind: CorrelationKind,
    pub referendum_index: u32,
    pub keyword: Option<String>,
    pub post_id: Option<u64>,
    pub detail: String,
}

/// The merged, immutable artifact of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedReport {
    pub run_id: RunId,
    pub generated_at: DateTime<Utc>,
    pub executive_summary: String,
    pub forum: Option<ForumAnalysis>,
    pub governance: Option<GovernanceAnalysis>,
    pub correlations: Vec<Correlation>,
    pub recommendations: Vec<Recommendation>,
    pub inputs_empty: bool,
}

impl IntegratedReport {
    pub fn has_forum_data(&self) -> bool {
        self.forum.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn has_governance_data(&self) -> bool {
        self.governance.as_ref().is_some_and(|g| !g.is_empty())
    }
}

pub struct ReportSynthesizer<'a> {
    config: &'a ReportConfig,
}

impl<'a> ReportSynthesizer<'a> {
    pub fn new(config: &'a ReportConfig) -> Self {
        Self { config }
    }

    /// Either side may be absent; the report is produced regardless.
    pub fn synthesize(
        &self,
        run_id: RunId,
        generated_at: DateTime<Utc>,
        forum: Option<ForumAnalysis>,
        governance: Option<GovernanceAnalysis>,
    ) -> IntegratedReport {
        let forum_empty = forum.as_ref().map_or(true, ForumAnalysis::is_empty);
        let governance_empty = governance
            .as_ref()
            .map_or(true, GovernanceAnalysis::is_empty);
        let inputs_empty = forum_empty && governance_empty;

        let correlations = match (&forum, &governance) {
            (Some(f), Some(g)) => correlate(f, g),
            _ => Vec::new(),
        };
        let recommendations = self.recommendations(
            forum.as_ref(),
            governance.as_ref(),
            &correlations,
            forum_empty,
            governance_empty,
        );
        let executive_summary =
            executive_summary(forum.as_ref(), governance.as_ref(), &correlations, inputs_empty);

        info!(
            run_id = %run_id,
            correlations = correlations.len(),
            recommendations = recommendations.len(),
            inputs_empty,
            "Synthesized integrated report"
        );

        IntegratedReport {
            run_id,
            generated_at,
            executive_summary,
            forum,
            governance,
            correlations,
            recommendations,
            inputs_empty,
        }
    }

    fn recommendations(
        &self,
        forum: Option<&ForumAnalysis>,
        governance: Option<&GovernanceAnalysis>,
        correlations: &[Correlation],
        forum_empty: bool,
        governance_empty: bool,
    ) -> Vec<Recommendation> {
        let mut out = Vec::new();
        let mut push = |kind, message: String| out.push(Recommendation { kind, message });

        let mut gaps = Vec::new();
        if forum_empty {
            gaps.push("forum activity".to_string());
        }
        if governance_empty {
            gaps.push("on-chain governance".to_string());
        }
        if let Some(g) = governance {
            gaps.extend(g.degraded.iter().map(|d| format!("governance category ({})", d)));
        }
        if !gaps.is_empty() {
            push(
                RecommendationKind::DataGap,
                format!(
                    "No data was available for: {}. Verify the providers before relying on this edition.",
                    gaps.join(", ")
                ),
            );
        }

        if let Some(g) = governance {
            let high: Vec<String> = g
                .referenda_in_tier(RiskTier::High)
                .map(|r| format!("#{}", r.index))
                .collect();
            if !high.is_empty() {
                push(
                    RecommendationKind::Monitoring,
                    format!(
                        "Monitor {} high-risk referenda closely: {}.",
                        high.len(),
                        high.join(", ")
                    ),
                );
            }

            let without_deposit: Vec<String> = g
                .referenda
                .iter()
                .filter(|r| !r.has_decision_deposit)
                .map(|r| format!("#{}", r.index))
                .collect();
            if !without_deposit.is_empty() {
                push(
                    RecommendationKind::DecisionDeposit,
                    format!(
                        "Referenda awaiting a decision deposit may lapse: {}.",
                        without_deposit.join(", ")
                    ),
                );
            }

            if !g.treasury.high_value.is_empty() {
                let ids: Vec<String> = g
                    .treasury
                    .high_value
                    .iter()
                    .map(|p| format!("#{}", p.id))
                    .collect();
                push(
                    RecommendationKind::TreasuryReview,
                    format!(
                        "Review unusually large treasury proposals: {}.",
                        ids.join(", ")
                    ),
                );
            }
        }

        if let Some(f) = forum {
            let engaged: Vec<&str> = f
                .influential_authors
                .iter()
                .filter(|a| a.influence_score > self.config.engagement_threshold)
                .map(|a| a.handle.as_str())
                .collect();
            if !engaged.is_empty() {
                push(
                    RecommendationKind::Engagement,
                    format!(
                        "Engage the most influential contributors: {}.",
                        engaged.join(", ")
                    ),
                );
            }
        }

        if !correlations.is_empty() {
            let referenda: BTreeSet<u32> =
                correlations.iter().map(|c| c.referendum_index).collect();
            let listed: Vec<String> = referenda.iter().map(|i| format!("#{}", i)).collect();
            push(
                RecommendationKind::CrossReference,
                format!(
                    "Forum discussion overlaps with referenda {}; link the threads from the proposals.",
                    listed.join(", ")
                ),
            );
        }

        if let Some(f) = forum {
            if !forum_empty && f.posts_analyzed < self.config.participation_min_posts {
                push(
                    RecommendationKind::Participation,
                    format!(
                        "Only {} forum posts this period; encourage more community discussion.",
                        f.posts_analyzed
                    ),
                );
            }
        }

        out
    }
}

fn correlate(forum: &ForumAnalysis, governance: &GovernanceAnalysis) -> Vec<Correlation> {
    let mut correlations = Vec::new();

    for referendum in &governance.referenda {
        let Some(call) = &referendum.decoded_call else {
            continue;
        };
        let text = call.search_text();
        for keyword in &forum.trending_keywords {
            if text.contains(&keyword.word) {
                correlations.push(Correlation {
                    kind: CorrelationKind::KeywordInCall,
                    referendum_index: referendum.index,
                    keyword: Some(keyword.word.clone()),
                    post_id: None,
                    detail: format!(
                        "Trending keyword '{}' appears in referendum #{} ({})",
                        keyword.word,
                        referendum.index,
                        call.label()
                    ),
                });
            }
        }
    }

    let known: BTreeSet<u32> = governance.referenda.iter().map(|r| r.index).collect();
    for topic in &forum.hot_topics {
        let mut referenced = BTreeSet::new();
        for captures in referendum_reference().captures_iter(&topic.title) {
            let Some(index) = captures.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
                continue;
            };
            if known.contains(&index) && referenced.insert(index) {
                correlations.push(Correlation {
                    kind: CorrelationKind::TopicReferencesReferendum,
                    referendum_index: index,
                    keyword: None,
                    post_id: Some(topic.post_id),
                    detail: format!(
                        "Hot topic \"{}\" discusses referendum #{}",
                        topic.title, index
                    ),
                });
            }
        }
    }

    correlations
}

fn executive_summary(
    forum: Option<&ForumAnalysis>,
    governance: Option<&GovernanceAnalysis>,
    correlations: &[Correlation],
    inputs_empty: bool,
) -> String {
    if inputs_empty {
        return "No forum or governance data could be collected for this period. \
                This report records the gap; no analysis was possible."
            .to_string();
    }

    let mut parts = Vec::new();
    match forum.filter(|f| !f.is_empty()) {
        Some(f) => {
            let mut sentence = format!(
                "The forum saw {} posts from {} contributors.",
                f.posts_analyzed,
                f.influential_authors.len()
            );
            if let Some(top) = f.trending_keywords.first() {
                sentence.push_str(&format!(
                    " The leading keyword was '{}' ({} mentions).",
                    top.word, top.count
                ));
            }
            parts.push(sentence);
        }
        None => parts.push("Forum data was unavailable for this period.".to_string()),
    }
    match governance.filter(|g| !g.is_empty()) {
        Some(g) => parts.push(format!(
            "On-chain governance has {} referenda ({} high risk, {} medium risk), {} treasury proposals ({} flagged as high value) and {} bounties.",
            g.tally.referenda,
            g.tally.high,
            g.tally.medium,
            g.treasury.proposals,
            g.treasury.high_value.len(),
            g.bounties.count
        )),
        None => parts.push("Governance data was unavailable for this period.".to_string()),
    }
    if !correlations.is_empty() {
        parts.push(format!(
            "{} links between forum discussion and referenda were found.",
            correlations.len()
        ));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Author, HotTopic, TrendingKeyword};
    use crate::governance::ScoredReferendum;
    use digest_core::{Balance, DecodedCall};

    fn run() -> (RunId, DateTime<Utc>) {
        let at = DateTime::parse_from_rfc3339("2026-10-18T06:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        (RunId::for_timestamp(at), at)
    }

    fn forum() -> ForumAnalysis {
        let (_, at) = run();
        ForumAnalysis {
            as_of: at,
            posts_analyzed: 3,
            posts_skipped: 0,
            trending_keywords: vec![TrendingKeyword {
                word: "spend".to_string(),
                count: 4,
            }],
            hot_topics: vec![HotTopic {
                post_id: 11,
                title: "Thoughts on Ref #42 and ref 999".to_string(),
                author: "alice".to_string(),
                category: None,
                excerpt: String::new(),
                url: None,
                views: 10,
                replies: 1,
                created_at: at,
                score: 10.0,
            }],
            influential_authors: vec![Author {
                handle: "alice".to_string(),
                post_count: 3,
                engagement: 900,
                mentions: 0,
                influence_score: 900.0,
            }],
            category_activity: Vec::new(),
            tag_activity: Vec::new(),
            daily_activity: Vec::new(),
            governance_discussions: Vec::new(),
        }
    }

    fn governance() -> GovernanceAnalysis {
        let referendum = ScoredReferendum {
            index: 42,
            track_id: 33,
            track_name: "medium_spender".to_string(),
            decoded_call: Some(DecodedCall {
                section: Some("treasury".to_string()),
                method: Some("spend".to_string()),
                args: None,
            }),
            tier: RiskTier::High,
            risk_factors: vec!["no decision deposit placed; referendum may lapse".to_string()],
            ayes: Balance::from(1),
            nays: Balance::zero(),
            support: Balance::from(1),
            approval_percent: "100.00%".to_string(),
            support_percent: "0.0000%".to_string(),
            has_decision_deposit: false,
            submitted_at: Some(1_200_000),
        };
        GovernanceAnalysis {
            tally: crate::governance::TallySummary {
                referenda: 1,
                high: 1,
                ..Default::default()
            },
            referenda: vec![referendum],
            ..Default::default()
        }
    }

    #[test]
    fn test_both_domains_present() {
        let config = ReportConfig::default();
        let (run_id, at) = run();
        let report =
            ReportSynthesizer::new(&config).synthesize(run_id, at, Some(forum()), Some(governance()));

        assert!(!report.inputs_empty);
        let kinds: Vec<RecommendationKind> =
            report.recommendations.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                RecommendationKind::Monitoring,
                RecommendationKind::DecisionDeposit,
                RecommendationKind::Engagement,
                RecommendationKind::CrossReference,
                RecommendationKind::Participation,
            ]
        );

        assert_eq!(report.correlations.len(), 2);
        assert_eq!(report.correlations[0].kind, CorrelationKind::KeywordInCall);
        assert_eq!(
            report.correlations[1].kind,
            CorrelationKind::TopicReferencesReferendum
        );
        assert_eq!(report.correlations[1].post_id, Some(11));
    }

    #[test]
    fn test_governance_only_report() {
        let config = ReportConfig::default();
        let (run_id, at) = run();
        let report = ReportSynthesizer::new(&config).synthesize(run_id, at, None, Some(governance()));

        assert!(report.forum.is_none());
        assert!(!report.inputs_empty);
        assert_eq!(report.recommendations[0].kind, RecommendationKind::DataGap);
        assert!(report.executive_summary.contains("Forum data was unavailable"));
        assert!(report.correlations.is_empty());
    }

    #[test]
    fn test_empty_governance_still_produces_report() {
        let config = ReportConfig::default();
        let (run_id, at) = run();
        let report = ReportSynthesizer::new(&config).synthesize(
            run_id,
            at,
            Some(forum()),
            Some(GovernanceAnalysis::default()),
        );
        assert!(!report.has_governance_data());
        assert!(report.has_forum_data());
        assert_eq!(report.run_id.to_string(), "2026-10-18");
    }

    #[test]
    fn test_both_missing_is_flagged_not_fatal() {
        let config = ReportConfig::default();
        let (run_id, at) = run();
        let report = ReportSynthesizer::new(&config).synthesize(run_id, at, None, None);

        assert!(report.inputs_empty);
        assert_eq!(report.recommendations.len(), 1);
        assert_eq!(report.recommendations[0].kind, RecommendationKind::DataGap);
    }

    #[test]
    fn test_recommendations_are_deterministic() {
        let config = ReportConfig::default();
        let (run_id, at) = run();
        let synthesizer = ReportSynthesizer::new(&config);
        let a = synthesizer.synthesize(run_id, at, Some(forum()), Some(governance()));
        let b = synthesizer.synthesize(run_id, at, Some(forum()), Some(governance()));
        assert_eq!(a, b);
    }
}
