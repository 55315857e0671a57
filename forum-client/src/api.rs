use crate::ForumProvider;
use async_trait::async_trait;
use digest_core::{
    status_error, CoreError, ForumConfig, ProviderError, RateLimiter, RetryConfig, RetryExecutor,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

const PROVIDER: &str = "discourse";

#[derive(Debug, Clone, Deserialize)]
pub struct LatestResponse {
    #[serde(default)]
    pub users: Vec<DiscourseUser>,
    pub topic_list: TopicList,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscourseUser {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicList {
    #[serde(default)]
    pub topics: Vec<DiscourseTopic>,
    #[serde(default)]
    pub more_topics_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscourseTopic {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub posts_count: u64,
    #[serde(default)]
    pub views: u64,
    pub created_at: String,
    #[serde(default)]
    pub category_id: Option<u64>,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub posters: Vec<DiscoursePoster>,
    #[serde(default)]
    pub last_poster_username: Option<String>,
    /// Plain names on older forums, `{"name": ..}` objects on newer ones.
    #[serde(default)]
    pub tags: Vec<Value>,
    #[serde(default)]
    pub pinned: bool,
}

impl DiscourseTopic {
    pub fn tag_names(&self) -> Vec<String> {
        self.tags
            .iter()
            .filter_map(|tag| match tag {
                Value::String(name) => Some(name.clone()),
                Value::Object(object) => object
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoursePoster {
    pub user_id: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoriesResponse {
    category_list: CategoryList,
}

#[derive(Debug, Clone, Deserialize)]
struct CategoryList {
    categories: Vec<DiscourseCategory>,
}

#[derive(Debug, Clone, Deserialize)]
struct DiscourseCategory {
    id: u64,
    name: String,
}

/// Read-only client for a Discourse forum's public JSON API.
#[derive(Debug)]
pub struct DiscourseClient {
    http_client: Client,
    base_url: Url,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
    max_pages: u32,
}

impl DiscourseClient {
    pub fn new(config: &ForumConfig, retry: RetryConfig) -> Result<Self, CoreError> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|e| CoreError::InvalidInput {
            message: format!("forum base url '{}': {}", config.base_url, e),
        })?;

        let http_client = Client::builder()
            .user_agent(concat!("community-digest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            rate_limiter: Arc::new(RateLimiter::new(config.rate_limit.clone())),
            retry: RetryExecutor::new(retry),
            max_pages: config.max_pages.max(1),
        })
    }

    async fn make_request(&self, endpoint: &str, page: Option<u32>) -> Result<Value, CoreError> {
        let url = self
            .base_url
            .join(endpoint)
            .map_err(|e| CoreError::InvalidInput {
                message: format!("endpoint '{}': {}", endpoint, e),
            })?;
        let start_time = Instant::now();

        let permit = self.rate_limiter.acquire_permit().await?;
        debug!(
            "Acquired rate limit permit for GET {} after {:?}",
            endpoint, permit.queue_wait_time
        );

        let mut request = self.http_client.get(url);
        if let Some(page) = page {
            request = request.query(&[("page", page)]);
        }

        let response = request.send().await.map_err(|e| {
            error!("Network error for GET {}: {}", endpoint, e);
            if e.is_timeout() {
                CoreError::Provider(ProviderError::RequestTimeout {
                    provider: PROVIDER.to_string(),
                })
            } else if e.is_connect() {
                CoreError::Provider(ProviderError::Unavailable {
                    provider: PROVIDER.to_string(),
                    reason: e.to_string(),
                })
            } else {
                CoreError::Network(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Rate limited by forum, retry after {:?} seconds", retry_after);
                self.rate_limiter.record_rate_limited().await;
            } else {
                error!("Request failed with status: {} for {}", status, endpoint);
            }
            return Err(status_error(PROVIDER, status.as_u16(), retry_after, endpoint).into());
        }

        let body: Value = response.json().await.map_err(|e| {
            error!("Failed to parse {} response: {}", endpoint, e);
            CoreError::Provider(ProviderError::InvalidPayload {
                provider: PROVIDER.to_string(),
                details: format!("{} returned non-JSON body", endpoint),
            })
        })?;

        debug!("GET {} completed in {:?}", endpoint, start_time.elapsed());
        Ok(body)
    }

    async fn get_with_retry(&self, endpoint: &str, page: Option<u32>) -> Result<Value, CoreError> {
        let name = match page {
            Some(page) => format!("{} page {}", endpoint, page),
            None => endpoint.to_string(),
        };
        self.retry
            .execute(&name, || self.make_request(endpoint, page))
            .await
            .into_result()
    }

    /// Category id to display name. Failures are not fatal.
    pub async fn get_categories(&self) -> HashMap<u64, String> {
        let body = match self.get_with_retry("categories.json", None).await {
            Ok(body) => body,
            Err(e) => {
                warn!("Could not load forum categories: {}", e);
                return HashMap::new();
            }
        };
        match serde_json::from_value::<CategoriesResponse>(body) {
            Ok(response) => response
                .category_list
                .categories
                .into_iter()
                .map(|c| (c.id, c.name))
                .collect(),
            Err(e) => {
                warn!("Unexpected categories payload: {}", e);
                HashMap::new()
            }
        }
    }

    pub async fn get_latest_page(&self, page: u32) -> Result<LatestResponse, CoreError> {
        let body = self.get_with_retry("latest.json", Some(page)).await?;
        serde_json::from_value(body).map_err(|e| {
            CoreError::Provider(ProviderError::InvalidPayload {
                provider: PROVIDER.to_string(),
                details: format!("latest.json page {}: {}", page, e),
            })
        })
    }

    fn topic_url(&self, topic: &DiscourseTopic) -> String {
        let path = match &topic.slug {
            Some(slug) => format!("t/{}/{}", slug, topic.id),
            None => format!("t/{}", topic.id),
        };
        self.base_url
            .join(&path)
            .map(|u| u.to_string())
            .unwrap_or_default()
    }
}

/// Flattens a listing into raw post records. The original poster is the
/// poster flagged "Original Poster", falling back to the first one listed.
pub fn topics_to_records(
    latest: &LatestResponse,
    categories: &HashMap<u64, String>,
    topic_url: impl Fn(&DiscourseTopic) -> String,
) -> Vec<Value> {
    let usernames: HashMap<i64, &str> = latest
        .users
        .iter()
        .map(|u| (u.id, u.username.as_str()))
        .collect();

    latest
        .topic_list
        .topics
        .iter()
        .map(|topic| {
            let original_poster = topic
                .posters
                .iter()
                .find(|p| p.description.contains("Original Poster"))
                .or_else(|| topic.posters.first())
                .and_then(|p| usernames.get(&p.user_id).copied());
            let category = topic
                .category_id
                .and_then(|id| categories.get(&id).cloned());

            json!({
                "id": topic.id,
                "author": original_poster,
                "title": topic.title,
                "excerpt": topic.excerpt.clone().unwrap_or_default(),
                "category": category,
                "views": topic.views,
                "replies": topic.posts_count.saturating_sub(1),
                "created_at": topic.created_at,
                "url": topic_url(topic),
                "tags": topic.tag_names(),
                "pinned": topic.pinned,
            })
        })
        .collect()
}

#[async_trait]
impl ForumProvider for DiscourseClient {
    async fn fetch_posts(&self) -> Result<Vec<Value>, CoreError> {
        let categories = self.get_categories().await;
        let mut records = Vec::new();

        for page in 0..self.max_pages {
            let latest = self.get_latest_page(page).await?;
            if latest.topic_list.topics.is_empty() {
                break;
            }
            records.extend(topics_to_records(&latest, &categories, |t| self.topic_url(t)));
            if latest.topic_list.more_topics_url.is_none() {
                break;
            }
        }

        info!(
            rate_limited = self.rate_limiter.rate_limited_count(),
            "Retrieved {} topics from {}",
            records.len(),
            self.base_url
        );
        Ok(records)
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_latest() -> LatestResponse {
        serde_json::from_value(json!({
            "users": [
                {"id": 1, "username": "alice"},
                {"id": 2, "username": "bob"}
            ],
            "topic_list": {
                "topics": [{
                    "id": 10,
                    "title": "Treasury spend on tooling",
                    "slug": "treasury-spend-on-tooling",
                    "posts_count": 8,
                    "views": 321,
                    "created_at": "2026-10-17T08:00:00.000Z",
                    "category_id": 5,
                    "tags": ["treasury", {"id": 3, "name": "opengov", "slug": "opengov"}],
                    "pinned": true,
                    "posters": [
                        {"user_id": 2, "description": "Frequent Poster"},
                        {"user_id": 1, "description": "Original Poster, Most Recent Poster"}
                    ]
                }]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_topics_become_post_records() {
        let categories = HashMap::from([(5, "Governance".to_string())]);
        let records = topics_to_records(&sample_latest(), &categories, |t| {
            format!("https://forum.test/t/{}", t.id)
        });

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["author"], "alice");
        assert_eq!(record["replies"], 7);
        assert_eq!(record["category"], "Governance");
        assert_eq!(record["url"], "https://forum.test/t/10");

        let post = digest_core::ForumPost::from_record(record).unwrap();
        assert_eq!(post.views, 321);
        assert_eq!(post.tags, vec!["treasury", "opengov"]);
        assert!(post.pinned);
    }

    #[test]
    fn test_client_rejects_bad_base_url() {
        let config = ForumConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(DiscourseClient::new(&config, RetryConfig::default()).is_err());
    }
}
