pub mod archive;
pub mod content;
pub mod governance;
pub mod synthesis;
pub mod text;

pub use archive::{render_markdown, ReportArchive, StoreOutcome};
pub use content::{
    Author, CategoryActivity, ContentAnalyzer, DailyActivity, ForumAnalysis, HotTopic,
    TagActivity, TrendingKeyword,
};
pub use governance::{
    BountySummary, GovernanceAnalysis, GovernanceInput, GovernanceRiskScorer, RiskTier,
    ScoredReferendum, SkippedRecords, TallySummary, TreasuryInsight,
};
pub use synthesis::{
    Correlation, CorrelationKind, IntegratedReport, Recommendation, RecommendationKind,
    ReportSynthesizer,
};
pub use text::{extract_mentions, Tokenizer};
