use digest_core::{Balance, NewsletterConfig, RunId};
use insight_engine::{HotTopic, IntegratedReport, RiskTier, ScoredReferendum};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_TREASURY_ITEMS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordItem {
    pub word: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostItem {
    pub title: String,
    pub author: String,
    pub date: String,
    pub views: u64,
    pub replies: u64,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalItem {
    pub title: String,
    pub date: String,
    pub views: u64,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Placeholder set handed to the renderer. List sections are `None` when
/// there is nothing to show, and vanish from the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterContext {
    pub title: String,
    pub date: String,
    pub community_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trending_keywords: Option<Vec<KeywordItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub important_posts: Option<Vec<PostItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance_proposals: Option<Vec<ProposalItem>>,
    pub unsubscribe_link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsletterEdition {
    pub edition_id: String,
    pub run_id: RunId,
    pub subject: String,
    pub context: NewsletterContext,
}

pub struct NewsletterComposer<'a> {
    config: &'a NewsletterConfig,
    token_symbol: String,
    token_decimals: u32,
}

impl<'a> NewsletterComposer<'a> {
    pub fn new(config: &'a NewsletterConfig) -> Self {
        Self {
            config,
            token_symbol: "DOT".to_string(),
            token_decimals: 10,
        }
    }

    /// Units used when printing treasury amounts.
    pub fn with_denomination(mut self, symbol: impl Into<String>, decimals: u32) -> Self {
        self.token_symbol = symbol.into();
        self.token_decimals = decimals;
        self
    }

    pub fn compose(&self, report: &IntegratedReport) -> NewsletterEdition {
        let date = report.run_id.date().format("%B %d, %Y").to_string();
        let title = format!("{} - {}", self.config.title, date);

        let context = NewsletterContext {
            title: title.clone(),
            date,
            community_summary: report.executive_summary.clone(),
            trending_keywords: non_empty(self.keywords(report)),
            important_posts: non_empty(self.posts(report)),
            governance_proposals: non_empty(self.proposals(report)),
            unsubscribe_link: self.config.unsubscribe_url.clone(),
        };
        debug!(
            edition = %report.run_id,
            keywords = context.trending_keywords.as_ref().map_or(0, Vec::len),
            posts = context.important_posts.as_ref().map_or(0, Vec::len),
            proposals = context.governance_proposals.as_ref().map_or(0, Vec::len),
            "Composed newsletter edition"
        );

        NewsletterEdition {
            edition_id: report.run_id.edition_id(),
            run_id: report.run_id,
            subject: title,
            context,
        }
    }

    fn keywords(&self, report: &IntegratedReport) -> Vec<KeywordItem> {
        report
            .forum
            .iter()
            .flat_map(|f| f.trending_keywords.iter())
            .take(self.config.top_keywords)
            .map(|k| KeywordItem {
                word: k.word.clone(),
                count: k.count,
            })
            .collect()
    }

    fn posts(&self, report: &IntegratedReport) -> Vec<PostItem> {
        report
            .forum
            .iter()
            .flat_map(|f| f.hot_topics.iter())
            .take(self.config.top_posts)
            .map(post_item)
            .collect()
    }

    fn proposals(&self, report: &IntegratedReport) -> Vec<ProposalItem> {
        let Some(governance) = report.governance.as_ref() else {
            return Vec::new();
        };

        let mut flagged: Vec<&ScoredReferendum> = governance
            .referenda
            .iter()
            .filter(|r| r.tier >= RiskTier::Medium)
            .collect();
        flagged.sort_by(|a, b| b.tier.cmp(&a.tier).then(a.index.cmp(&b.index)));

        let referenda = flagged.into_iter().map(|r| self.referendum_item(r));
        let treasury = governance
            .treasury
            .high_value
            .iter()
            .take(MAX_TREASURY_ITEMS)
            .map(|p| ProposalItem {
                title: format!("Treasury proposal #{}", p.id),
                date: String::new(),
                views: 0,
                summary: format!(
                    "Requests {} for {}.",
                    self.amount(&p.value),
                    p.beneficiary
                ),
                url: None,
            });

        referenda
            .chain(treasury)
            .take(self.config.top_proposals)
            .collect()
    }

    fn referendum_item(&self, r: &ScoredReferendum) -> ProposalItem {
        let mut summary = format!(
            "Risk level: {}. Track: {}.",
            r.tier.to_string().to_uppercase(),
            r.track_name
        );
        if let Some(factor) = r.risk_factors.first() {
            summary.push(' ');
            summary.push_str(&capitalize(factor));
            summary.push('.');
        }
        ProposalItem {
            title: format!("Referendum #{} - {}", r.index, r.call_label()),
            date: r
                .submitted_at
                .map(|block| format!("block {}", block))
                .unwrap_or_default(),
            views: 0,
            summary,
            url: Some(format!(
                "{}/{}",
                self.config.referendum_url_base.trim_end_matches('/'),
                r.index
            )),
        }
    }

    fn amount(&self, value: &Balance) -> String {
        format!(
            "{} {}",
            value.to_units_string(self.token_decimals, 2),
            self.token_symbol
        )
    }
}

fn post_item(topic: &HotTopic) -> PostItem {
    PostItem {
        title: topic.title.clone(),
        author: topic.author.clone(),
        date: topic.created_at.format("%Y-%m-%d").to_string(),
        views: topic.views,
        replies: topic.replies,
        summary: topic.excerpt.clone(),
        url: topic.url.clone(),
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
