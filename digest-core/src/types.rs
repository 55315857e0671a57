use crate::amount::Balance;
use crate::error::{RecordKind, RecordParseError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForumPost {
    pub id: u64,
    pub author: String,
    pub title: String,
    pub excerpt: String,
    pub category: Option<String>,
    pub views: u64,
    pub replies: u64,
    pub created_at: DateTime<Utc>,
    pub url: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Pinned by moderators; kept for counts but never ranked as hot.
    #[serde(default)]
    pub pinned: bool,
}

impl ForumPost {
    /// Validates one raw provider record. `id`, `author`, `title` and
    /// `created_at` are required; counters default to zero, `tags` to none
    /// and `pinned` to false.
    pub fn from_record(record: &Value) -> Result<Self, RecordParseError> {
        let locator = record
            .get("id")
            .map(|id| format!("id={}", id))
            .unwrap_or_else(|| "id=?".to_string());
        let fail = |reason: String| RecordParseError::new(RecordKind::ForumPost, &locator, reason);

        let object = record
            .as_object()
            .ok_or_else(|| fail("record is not a JSON object".to_string()))?;

        let id = object
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| fail("missing or non-numeric field 'id'".to_string()))?;
        let author = required_str(object, "author").map_err(&fail)?;
        let title = required_str(object, "title").map_err(&fail)?;
        let created_raw = required_str(object, "created_at").map_err(&fail)?;
        let created_at = DateTime::parse_from_rfc3339(&created_raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| fail(format!("invalid 'created_at' {}: {}", created_raw, e)))?;

        let views = optional_count(object, "views").map_err(&fail)?;
        let replies = optional_count(object, "replies").map_err(&fail)?;
        let excerpt = object
            .get("excerpt")
            .or_else(|| object.get("body"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let category = object
            .get("category")
            .and_then(Value::as_str)
            .map(str::to_string);
        let url = object.get("url").and_then(Value::as_str).map(str::to_string);
        let tags = match object.get("tags") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string)
                .collect(),
            Some(_) => return Err(fail("field 'tags' is not a list".to_string())),
        };
        let pinned = object
            .get("pinned")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            id,
            author,
            title,
            excerpt,
            category,
            views,
            replies,
            created_at,
            url,
            tags,
            pinned,
        })
    }
}

fn required_str(object: &serde_json::Map<String, Value>, field: &str) -> Result<String, String> {
    match object.get(field).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
        _ => Err(format!("missing required field '{}'", field)),
    }
}

fn optional_count(object: &serde_json::Map<String, Value>, field: &str) -> Result<u64, String> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_u64()
            .ok_or_else(|| format!("field '{}' is not a non-negative integer", field)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referendum {
    pub index: u32,
    pub track: Track,
    #[serde(default)]
    pub proposal: Option<Proposal>,
    pub status: ReferendumStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub info: Option<TrackInfo>,
}

/// Timing windows are block counts; thresholds may be Perbill integers or
/// opaque curve objects, so they are kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    #[serde(default)]
    pub prepare_period: Option<u64>,
    #[serde(default)]
    pub decision_period: Option<u64>,
    #[serde(default)]
    pub confirm_period: Option<u64>,
    #[serde(default)]
    pub min_approval: Option<Value>,
    #[serde(default)]
    pub min_support: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    #[serde(default)]
    pub raw_value: Option<Value>,
    #[serde(default)]
    pub call_data: Option<String>,
    #[serde(default)]
    pub decoded_call: Option<DecodedCall>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedCall {
    #[serde(default)]
    pub section: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub args: Option<Value>,
}

impl DecodedCall {
    pub fn label(&self) -> String {
        format!(
            "{}.{}",
            self.section.as_deref().unwrap_or("unknown"),
            self.method.as_deref().unwrap_or("unknown")
        )
    }

    /// Section, method and serialized arguments, lowercased, for keyword matching.
    pub fn search_text(&self) -> String {
        let mut text = format!(
            "{} {}",
            self.section.as_deref().unwrap_or_default(),
            self.method.as_deref().unwrap_or_default()
        );
        if let Some(args) = &self.args {
            text.push(' ');
            text.push_str(&args.to_string());
        }
        text.to_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferendumStatus {
    pub tally: Tally,
    #[serde(default)]
    pub submitted_at: Option<u64>,
    #[serde(default)]
    pub deciding_at: Option<Value>,
    #[serde(default)]
    pub decision_deposit: Option<DecisionDeposit>,
    #[serde(default)]
    pub confirmation_period: Option<ConfirmationWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tally {
    pub ayes: Balance,
    pub nays: Balance,
    pub support: Balance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionDeposit {
    pub who: String,
    pub amount: Balance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationWindow {
    #[serde(default)]
    pub start: Option<u64>,
    #[serde(default)]
    pub end: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasuryProposal {
    pub id: u32,
    pub proposer: String,
    pub value: Balance,
    pub beneficiary: String,
    pub bond: Balance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounty {
    pub id: u32,
    pub proposer: String,
    pub value: Balance,
    #[serde(default)]
    pub fee: Balance,
    #[serde(default)]
    pub curator_deposit: Balance,
    #[serde(default)]
    pub bond: Balance,
    pub status: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub account: Option<String>,
}

/// Parses a chain record, turning serde failures into a skippable error.
pub fn parse_chain_record<T>(kind: RecordKind, record: &Value) -> Result<T, RecordParseError>
where
    T: serde::de::DeserializeOwned,
{
    let locator = record
        .get("index")
        .or_else(|| record.get("id"))
        .map(|id| format!("#{}", id))
        .unwrap_or_else(|| "#?".to_string());
    serde_json::from_value(record.clone())
        .map_err(|e| RecordParseError::new(kind, locator, e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisScope {
    #[default]
    All,
    ForumOnly,
    GovernanceOnly,
}

impl AnalysisScope {
    pub fn includes_forum(&self) -> bool {
        !matches!(self, AnalysisScope::GovernanceOnly)
    }

    pub fn includes_governance(&self) -> bool {
        !matches!(self, AnalysisScope::ForumOnly)
    }
}

/// One pipeline run, keyed by its UTC date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(NaiveDate);

impl RunId {
    pub fn for_timestamp(at: DateTime<Utc>) -> Self {
        Self(at.date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Edition identifiers are derived from the run date.
    pub fn edition_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for RunId {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub active: bool,
}

impl Subscriber {
    /// Stand-in recipient for test-mode and explicit `--recipient` runs.
    pub fn adhoc(email: &str) -> Self {
        let email = email.trim().to_string();
        Self {
            id: format!("adhoc:{}", email.to_lowercase()),
            email,
            name: None,
            active: true,
        }
    }

    /// Contact identity used for deduplication.
    pub fn contact_key(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sending,
    Sent,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "sending" => Ok(DeliveryStatus::Sending),
            "sent" => Ok(DeliveryStatus::Sent),
            "failed" => Ok(DeliveryStatus::Failed),
            "skipped" => Ok(DeliveryStatus::Skipped),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// Durable idempotency marker for one (subscriber, edition) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub subscriber_id: String,
    pub edition_id: String,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub permanent_failure: bool,
    pub provider_message_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryRecord {
    pub fn pending(subscriber_id: &str, edition_id: &str) -> Self {
        Self {
            subscriber_id: subscriber_id.to_string(),
            edition_id: edition_id.to_string(),
            status: DeliveryStatus::Pending,
            attempts: 0,
            last_error: None,
            permanent_failure: false,
            provider_message_id: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}
