//! Forum analytics: trending keywords, hot topics, tags and author influence.
//!
//! Every ranking has a total order (score, then a stable key) so the same
//! batch always produces byte-identical output.

use crate::text::{extract_mentions, Tokenizer};
use chrono::{DateTime, NaiveDate, Utc};
use digest_core::{ContentConfig, ForumPost};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

const GOVERNANCE_TERMS: &[&str] = &[
    "proposal",
    "referendum",
    "referenda",
    "vote",
    "governance",
    "treasury",
    "bounty",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingKeyword {
    pub word: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotTopic {
    pub post_id: u64,
    pub title: String,
    pub author: String,
    pub category: Option<String>,
    pub excerpt: String,
    pub url: Option<String>,
    pub views: u64,
    pub replies: u64,
    pub created_at: DateTime<Utc>,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub handle: String,
    pub post_count: u64,
    /// Views plus replies across the author's posts.
    pub engagement: u64,
    pub mentions: u64,
    pub influence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryActivity {
    pub category: String,
    pub posts: u64,
    pub views: u64,
    pub replies: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagActivity {
    pub tag: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub posts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumAnalysis {
    pub as_of: DateTime<Utc>,
    pub posts_analyzed: usize,
    pub posts_skipped: usize,
    pub trending_keywords: Vec<TrendingKeyword>,
    pub hot_topics: Vec<HotTopic>,
    pub influential_authors: Vec<Author>,
    pub category_activity: Vec<CategoryActivity>,
    #[serde(default)]
    pub tag_activity: Vec<TagActivity>,
    pub daily_activity: Vec<DailyActivity>,
    pub governance_discussions: Vec<HotTopic>,
}

impl ForumAnalysis {
    pub fn is_empty(&self) -> bool {
        self.posts_analyzed == 0
    }
}

pub struct ContentAnalyzer<'a> {
    config: &'a ContentConfig,
    tokenizer: Tokenizer,
}

impl<'a> ContentAnalyzer<'a> {
    pub fn new(config: &'a ContentConfig) -> Self {
        Self {
            config,
            tokenizer: Tokenizer::new(config.min_token_len, &config.extra_stop_words),
        }
    }

    /// Analyzes a raw batch. `as_of` anchors recency so reruns of the same
    /// day score identically.
    pub fn analyze(&self, records: &[Value], as_of: DateTime<Utc>) -> ForumAnalysis {
        let (posts, skipped) = self.parse_posts(records);
        info!(
            posts = posts.len(),
            skipped, "Analyzing forum batch"
        );

        let hot_topics = self.hot_topics(&posts, as_of);
        let governance_discussions = hot_topics
            .iter()
            .filter(|topic| is_governance_title(&topic.title))
            .cloned()
            .collect();

        ForumAnalysis {
            as_of,
            posts_analyzed: posts.len(),
            posts_skipped: skipped,
            trending_keywords: self.trending_keywords(&posts),
            hot_topics,
            influential_authors: self.influence_ranking(&posts),
            category_activity: category_activity(&posts),
            tag_activity: self.tag_activity(&posts),
            daily_activity: daily_activity(&posts),
            governance_discussions,
        }
    }

    fn parse_posts(&self, records: &[Value]) -> (Vec<ForumPost>, usize) {
        let mut posts = Vec::with_capacity(records.len());
        let mut seen = HashSet::new();
        let mut skipped = 0;

        for record in records {
            match ForumPost::from_record(record) {
                Ok(post) => {
                    if seen.insert(post.id) {
                        posts.push(post);
                    } else {
                        debug!(post_id = post.id, "Duplicate forum post ignored");
                    }
                }
                Err(e) => {
                    warn!(locator = %e.locator, reason = %e.reason, "Skipping malformed forum post");
                    skipped += 1;
                }
            }
        }
        (posts, skipped)
    }

    pub fn trending_keywords(&self, posts: &[ForumPost]) -> Vec<TrendingKeyword> {
        // word -> (count, first-seen position)
        let mut counts: HashMap<String, (u64, usize)> = HashMap::new();
        let mut position = 0usize;

        for post in posts {
            let text = format!("{} {}", post.title, post.excerpt);
            for token in self.tokenizer.tokenize(&text) {
                let entry = counts.entry(token).or_insert((0, position));
                entry.0 += 1;
                position += 1;
            }
        }

        let mut ranked: Vec<(String, u64, usize)> = counts
            .into_iter()
            .map(|(word, (count, first))| (word, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

        ranked
            .into_iter()
            .take(self.config.max_keywords)
            .map(|(word, count, _)| TrendingKeyword { word, count })
            .collect()
    }

    pub fn hot_score(&self, post: &ForumPost, as_of: DateTime<Utc>) -> f64 {
        let age_days = ((as_of - post.created_at).num_seconds().max(0) as f64) / 86_400.0;
        let decay = 0.5f64.powf(age_days / self.config.half_life_days);
        self.config.views_weight * post.views as f64
            + self.config.replies_weight * post.replies as f64
            + self.config.recency_weight * decay
    }

    /// Pinned posts stay on top regardless of traffic, so they are left out.
    pub fn hot_topics(&self, posts: &[ForumPost], as_of: DateTime<Utc>) -> Vec<HotTopic> {
        let mut topics: Vec<HotTopic> = posts
            .iter()
            .filter(|post| !post.pinned)
            .map(|post| HotTopic {
                post_id: post.id,
                title: post.title.clone(),
                author: post.author.clone(),
                category: post.category.clone(),
                excerpt: post.excerpt.clone(),
                url: post.url.clone(),
                views: post.views,
                replies: post.replies,
                created_at: post.created_at,
                score: self.hot_score(post, as_of),
            })
            .collect();

        topics.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.post_id.cmp(&b.post_id)));
        topics.truncate(self.config.max_hot_topics);
        topics
    }

    /// Tags are compared case-insensitively and reported lowercased.
    pub fn tag_activity(&self, posts: &[ForumPost]) -> Vec<TagActivity> {
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for post in posts {
            let tags: HashSet<String> = post.tags.iter().map(|t| t.to_lowercase()).collect();
            for tag in tags {
                *counts.entry(tag).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<TagActivity> = counts
            .into_iter()
            .map(|(tag, count)| TagActivity { tag, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        ranked.truncate(self.config.max_tags);
        ranked
    }

    pub fn influence_ranking(&self, posts: &[ForumPost]) -> Vec<Author> {
        let mut authors: BTreeMap<String, Author> = BTreeMap::new();
        let mut contribution: HashMap<String, f64> = HashMap::new();

        for post in posts {
            let key = post.author.to_lowercase();
            let author = authors.entry(key.clone()).or_insert_with(|| Author {
                handle: post.author.clone(),
                post_count: 0,
                engagement: 0,
                mentions: 0,
                influence_score: 0.0,
            });
            author.post_count += 1;
            author.engagement += post.views + post.replies;
            *contribution.entry(key).or_insert(0.0) += self.config.influence_views_weight
                * post.views as f64
                + self.config.influence_replies_weight * post.replies as f64;
        }

        // Only mentions by someone else count.
        for post in posts {
            let writer = post.author.to_lowercase();
            for handle in extract_mentions(&post.excerpt) {
                if handle == writer {
                    continue;
                }
                if let Some(author) = authors.get_mut(&handle) {
                    author.mentions += 1;
                }
            }
        }

        let mut ranked: Vec<Author> = authors
            .into_iter()
            .map(|(key, mut author)| {
                author.influence_score = contribution.get(&key).copied().unwrap_or(0.0)
                    + self.config.mention_weight * author.mentions as f64;
                author
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.influence_score
                .total_cmp(&a.influence_score)
                .then_with(|| a.handle.cmp(&b.handle))
        });
        ranked
    }
}

fn is_governance_title(title: &str) -> bool {
    let lowered = title.to_lowercase();
    GOVERNANCE_TERMS.iter().any(|term| lowered.contains(term))
}

fn category_activity(posts: &[ForumPost]) -> Vec<CategoryActivity> {
    let mut by_category: BTreeMap<String, CategoryActivity> = BTreeMap::new();
    for post in posts {
        let name = post
            .category
            .clone()
            .unwrap_or_else(|| "Uncategorized".to_string());
        let entry = by_category
            .entry(name.clone())
            .or_insert_with(|| CategoryActivity {
                category: name,
                posts: 0,
                views: 0,
                replies: 0,
            });
        entry.posts += 1;
        entry.views += post.views;
        entry.replies += post.replies;
    }

    let mut activity: Vec<CategoryActivity> = by_category.into_values().collect();
    activity.sort_by(|a, b| b.posts.cmp(&a.posts).then_with(|| a.category.cmp(&b.category)));
    activity
}

fn daily_activity(posts: &[ForumPost]) -> Vec<DailyActivity> {
    let mut by_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for post in posts {
        *by_day.entry(post.created_at.date_naive()).or_insert(0) += 1;
    }
    by_day
        .into_iter()
        .map(|(date, posts)| DailyActivity { date, posts })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_of() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn post(id: u64, author: &str, title: &str, views: u64, replies: u64) -> Value {
        json!({
            "id": id,
            "author": author,
            "title": title,
            "excerpt": "",
            "views": views,
            "replies": replies,
            "created_at": "2026-10-18T00:00:00Z"
        })
    }

    fn five_posts() -> Vec<Value> {
        vec![
            post(1, "alice", "Runtime upgrade timeline", 100, 10),
            post(2, "bob", "Staking dashboard", 50, 2),
            post(3, "alice", "Staking rewards question", 50, 2),
            post(4, "carol", "Validator meetup", 100, 0),
            post(5, "dave", "Treasury proposal for tooling", 10, 30),
        ]
    }

    #[test]
    fn test_five_post_scenario() {
        let config = ContentConfig::default();
        let analysis = ContentAnalyzer::new(&config).analyze(&five_posts(), as_of());

        // alice: (100 + 50) * 1.0 + (10 + 2) * 5.0 = 210
        let top = &analysis.influential_authors[0];
        assert_eq!(top.handle, "alice");
        assert_eq!(top.post_count, 2);
        assert_eq!(top.engagement, 162);
        assert!((top.influence_score - 210.0).abs() < 1e-9);

        let handles: Vec<&str> = analysis
            .influential_authors
            .iter()
            .map(|a| a.handle.as_str())
            .collect();
        assert_eq!(handles, vec!["alice", "dave", "carol", "bob"]);

        // score = 0.3 * views + 2.5 * replies + 5.0 (posted at as_of)
        // 5: 83, 1: 60, 4: 35, 2: 25, 3: 25 (tie broken by id)
        let order: Vec<u64> = analysis.hot_topics.iter().map(|t| t.post_id).collect();
        assert_eq!(order, vec![5, 1, 4, 2, 3]);
        assert!((analysis.hot_topics[0].score - 83.0).abs() < 1e-9);
        assert_eq!(analysis.hot_topics[3].score, analysis.hot_topics[4].score);
    }

    #[test]
    fn test_output_is_deterministic() {
        let config = ContentConfig::default();
        let analyzer = ContentAnalyzer::new(&config);
        let first = analyzer.analyze(&five_posts(), as_of());
        let second = analyzer.analyze(&five_posts(), as_of());

        assert_eq!(
            serde_json::to_string(&first.trending_keywords).unwrap(),
            serde_json::to_string(&second.trending_keywords).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.hot_topics).unwrap(),
            serde_json::to_string(&second.hot_topics).unwrap()
        );
    }

    #[test]
    fn test_keywords_count_then_first_seen() {
        let config = ContentConfig {
            max_keywords: 3,
            ..Default::default()
        };
        let analysis = ContentAnalyzer::new(&config).analyze(&five_posts(), as_of());
        let words: Vec<(&str, u64)> = analysis
            .trending_keywords
            .iter()
            .map(|k| (k.word.as_str(), k.count))
            .collect();
        // "staking" appears twice; the rest once, in first-seen order.
        assert_eq!(
            words,
            vec![("staking", 2), ("runtime", 1), ("upgrade", 1)]
        );
    }

    #[test]
    fn test_malformed_posts_are_skipped() {
        let mut records = five_posts();
        records.push(json!({"id": 6, "title": "no author", "created_at": "2026-10-18T00:00:00Z"}));
        records.push(json!("not even an object"));

        let config = ContentConfig::default();
        let analysis = ContentAnalyzer::new(&config).analyze(&records, as_of());
        assert_eq!(analysis.posts_analyzed, 5);
        assert_eq!(analysis.posts_skipped, 2);
    }

    #[test]
    fn test_mentions_raise_influence() {
        let records = vec![
            json!({"id": 1, "author": "bob", "title": "Hi", "excerpt": "great work @carol",
                   "views": 0, "replies": 0, "created_at": "2026-10-18T00:00:00Z"}),
            json!({"id": 2, "author": "carol", "title": "Hey", "excerpt": "I agree with @carol",
                   "views": 0, "replies": 0, "created_at": "2026-10-18T00:00:00Z"}),
        ];
        let config = ContentConfig::default();
        let analysis = ContentAnalyzer::new(&config).analyze(&records, as_of());

        let carol = &analysis.influential_authors[0];
        assert_eq!(carol.handle, "carol");
        assert_eq!(carol.mentions, 1);
        assert!((carol.influence_score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_recency_decays_by_half_life() {
        let config = ContentConfig::default();
        let analyzer = ContentAnalyzer::new(&config);
        let week_old = ForumPost::from_record(&json!({
            "id": 1, "author": "a", "title": "t", "created_at": "2026-10-11T00:00:00Z"
        }))
        .unwrap();
        assert!((analyzer.hot_score(&week_old, as_of()) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_supplementary_sections() {
        let config = ContentConfig::default();
        let analysis = ContentAnalyzer::new(&config).analyze(&five_posts(), as_of());

        assert_eq!(analysis.category_activity.len(), 1);
        assert_eq!(analysis.category_activity[0].category, "Uncategorized");
        assert_eq!(analysis.category_activity[0].posts, 5);
        assert_eq!(analysis.daily_activity.len(), 1);
        assert_eq!(analysis.governance_discussions.len(), 1);
        assert_eq!(analysis.governance_discussions[0].post_id, 5);
        assert!(analysis.tag_activity.is_empty());
    }

    #[test]
    fn test_pinned_posts_never_rank_as_hot() {
        let mut records = five_posts();
        records.push(json!({
            "id": 6, "author": "mod", "title": "Forum guidelines", "views": 9000,
            "replies": 400, "pinned": true, "created_at": "2026-10-18T00:00:00Z"
        }));

        let config = ContentConfig::default();
        let analysis = ContentAnalyzer::new(&config).analyze(&records, as_of());
        let order: Vec<u64> = analysis.hot_topics.iter().map(|t| t.post_id).collect();
        assert_eq!(order, vec![5, 1, 4, 2, 3]);
        // Still counted everywhere else.
        assert_eq!(analysis.posts_analyzed, 6);
        assert_eq!(analysis.influential_authors[0].handle, "mod");
    }

    #[test]
    fn test_tag_activity_ranks_by_count_then_name() {
        let tagged = |id: u64, tags: &[&str]| {
            json!({"id": id, "author": "a", "title": "t", "tags": tags,
                   "created_at": "2026-10-18T00:00:00Z"})
        };
        let records = vec![
            tagged(1, &["treasury", "OpenGov"]),
            tagged(2, &["opengov", "staking"]),
            tagged(3, &["staking", "bounties"]),
            tagged(4, &["opengov", "OPENGOV"]),
        ];
        let config = ContentConfig {
            max_tags: 3,
            ..Default::default()
        };
        let analysis = ContentAnalyzer::new(&config).analyze(&records, as_of());
        let tags: Vec<(&str, u64)> = analysis
            .tag_activity
            .iter()
            .map(|t| (t.tag.as_str(), t.count))
            .collect();
        assert_eq!(tags, vec![("opengov", 3), ("staking", 2), ("bounties", 1)]);
    }
}
