use chain_client::{
    fetch_snapshot, ChainQueryClient, GovernanceProvider, SnapshotDirProvider,
};
use chrono::{DateTime, Utc};
use digest_core::{
    AnalysisScope, CoreError, DigestConfig, ErrorExt, RetryExecutor, RunId, Subscriber,
};
use distribution::{
    DeliveryStore, DeliverySummary, DistributionCoordinator, EmailTransport, MemoryDeliveryStore,
};
use forum_client::{DiscourseClient, ForumProvider, SnapshotForumProvider};
use insight_engine::{
    ContentAnalyzer, ForumAnalysis, GovernanceAnalysis, GovernanceInput, GovernanceRiskScorer,
    IntegratedReport, ReportArchive, ReportSynthesizer,
};
use newsletter::{EditionStore, HtmlRenderer, NewsletterComposer, StoredEdition};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Per-invocation choices that are not part of the persistent configuration.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    pub scope: AnalysisScope,
    pub as_of: DateTime<Utc>,
}

pub struct Providers {
    pub forum: Option<Box<dyn ForumProvider>>,
    pub governance: Option<Box<dyn GovernanceProvider>>,
}

impl Providers {
    /// Snapshots win over live endpoints when both are configured.
    pub fn from_config(config: &DigestConfig) -> Result<Self, CoreError> {
        let forum: Box<dyn ForumProvider> = match &config.forum.snapshot_path {
            Some(path) => Box::new(SnapshotForumProvider::new(path.clone())),
            None => Box::new(DiscourseClient::new(&config.forum, config.retry.clone())?),
        };

        let governance: Option<Box<dyn GovernanceProvider>> =
            match (&config.chain.snapshot_dir, &config.chain.endpoint) {
                (Some(dir), _) => Some(Box::new(SnapshotDirProvider::new(dir.clone()))),
                (None, Some(endpoint)) => {
                    Some(Box::new(ChainQueryClient::new(endpoint, &config.chain)?))
                }
                (None, None) => {
                    warn!("No chain endpoint or governance snapshot configured");
                    None
                }
            };

        Ok(Self {
            forum: Some(forum),
            governance,
        })
    }
}

#[derive(Debug)]
pub struct RunArtifacts {
    pub report: IntegratedReport,
    pub report_reused: bool,
    pub edition: StoredEdition,
    /// Every in-scope analysis domain came back without data.
    pub all_domains_failed: bool,
}

impl RunArtifacts {
    /// The error to surface when synthesis had nothing to work with.
    pub fn data_gap(&self) -> Option<CoreError> {
        self.all_domains_failed.then_some(CoreError::SynthesisInputsEmpty)
    }
}

/// Analysis, synthesis, archive and newsletter rendering. Always leaves a
/// report behind, even when no provider produced data.
pub async fn produce_artifacts(
    config: &DigestConfig,
    options: &RunOptions,
    providers: &Providers,
) -> Result<RunArtifacts, CoreError> {
    let run_id = RunId::for_timestamp(options.as_of);
    let archive = ReportArchive::new(&options.output_dir);

    let (report, report_reused) = match archive.load(run_id).await? {
        Some(report) => {
            info!(run_id = %run_id, "Reusing archived report for this run");
            archive.ensure_markdown(&report).await?;
            (report, true)
        }
        None => {
            let (forum, governance) = tokio::join!(
                analyze_forum(config, options, providers),
                analyze_governance(config, options, providers),
            );
            let governance = governance?;
            let report = ReportSynthesizer::new(&config.report).synthesize(
                run_id,
                options.as_of,
                forum,
                governance,
            );
            let outcome = archive.store(&report).await?;
            if outcome.created {
                (report, false)
            } else {
                match archive.load(run_id).await? {
                    Some(existing) => (existing, true),
                    None => (report, false),
                }
            }
        }
    };

    let all_domains_failed = domains_failed(&report, options.scope);
    if all_domains_failed {
        warn!(run_id = %run_id, "No analysis domain produced data; report notes the gap");
    }

    let edition = build_edition(config, &options.output_dir, &report).await?;

    Ok(RunArtifacts {
        report,
        report_reused,
        edition,
        all_domains_failed,
    })
}

async fn analyze_forum(
    config: &DigestConfig,
    options: &RunOptions,
    providers: &Providers,
) -> Option<ForumAnalysis> {
    if !options.scope.includes_forum() {
        return None;
    }
    let provider = providers.forum.as_ref()?;
    match provider.fetch_posts().await {
        Ok(records) => {
            let analysis = ContentAnalyzer::new(&config.content).analyze(&records, options.as_of);
            info!(
                provider = provider.name(),
                posts = analysis.posts_analyzed,
                skipped = analysis.posts_skipped,
                "Forum analysis complete"
            );
            Some(analysis)
        }
        Err(e) => {
            e.log_warn();
            warn!(provider = provider.name(), "Forum data unavailable; continuing without it");
            None
        }
    }
}

async fn analyze_governance(
    config: &DigestConfig,
    options: &RunOptions,
    providers: &Providers,
) -> Result<Option<GovernanceAnalysis>, CoreError> {
    if !options.scope.includes_governance() {
        return Ok(None);
    }
    let Some(provider) = providers.governance.as_ref() else {
        return Ok(None);
    };

    let scorer = GovernanceRiskScorer::new(&config.risk)?;
    let retry = RetryExecutor::new(config.retry.clone());
    let snapshot = fetch_snapshot(provider.as_ref(), &retry).await;
    if snapshot.all_degraded() {
        warn!(
            provider = provider.name(),
            "Every governance category failed; continuing without governance data"
        );
        return Ok(None);
    }

    let degraded = snapshot.degraded_categories();
    let analysis = scorer.score(&GovernanceInput {
        referenda: snapshot.referenda.records,
        treasury: snapshot.treasury.records,
        bounties: snapshot.bounties.records,
        degraded,
    });
    info!(
        referenda = analysis.tally.referenda,
        high = analysis.tally.high,
        treasury = analysis.treasury.proposals,
        bounties = analysis.bounties.count,
        "Governance analysis complete"
    );
    Ok(Some(analysis))
}

fn domains_failed(report: &IntegratedReport, scope: AnalysisScope) -> bool {
    let forum_failed = !scope.includes_forum() || report.forum.is_none();
    let governance_failed = !scope.includes_governance() || report.governance.is_none();
    forum_failed && governance_failed
}

async fn build_edition(
    config: &DigestConfig,
    output_dir: &std::path::Path,
    report: &IntegratedReport,
) -> Result<StoredEdition, CoreError> {
    let store = EditionStore::new(output_dir);
    let edition_id = report.run_id.edition_id();
    if let Some(existing) = store.load(&edition_id).await? {
        info!(edition = %edition_id, "Reusing stored newsletter edition");
        return Ok(existing);
    }

    let edition = NewsletterComposer::new(&config.newsletter)
        .with_denomination(config.risk.token_symbol.clone(), config.risk.token_decimals)
        .compose(report);
    let html = HtmlRenderer::new().render(&edition.context);
    store.store(edition, html).await
}

/// Who receives this edition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientSource {
    /// Test mode: only the designated address, ledger kept in memory.
    TestRecipient(Subscriber),
    /// Explicit `--recipient` addresses.
    Explicit(Vec<Subscriber>),
    /// Every active subscriber in the store.
    Store,
}

pub fn resolve_recipients(
    config: &DigestConfig,
    test_mode: bool,
    explicit: &[String],
) -> Result<RecipientSource, CoreError> {
    if test_mode {
        let address = config
            .distribution
            .test_recipient
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| CoreError::InvalidInput {
                message: "test mode needs a test recipient (--test-recipient)".to_string(),
            })?;
        return Ok(RecipientSource::TestRecipient(Subscriber::adhoc(address)));
    }
    if !explicit.is_empty() {
        return Ok(RecipientSource::Explicit(
            explicit.iter().map(|e| Subscriber::adhoc(e)).collect(),
        ));
    }
    Ok(RecipientSource::Store)
}

/// Sends the stored edition. `store` is the durable ledger; test mode swaps
/// in a throwaway one.
pub async fn dispatch(
    config: &DigestConfig,
    edition: &StoredEdition,
    source: RecipientSource,
    transport: Arc<dyn EmailTransport>,
    store: Arc<dyn DeliveryStore>,
) -> Result<DeliverySummary, CoreError> {
    let (recipients, store): (Vec<Subscriber>, Arc<dyn DeliveryStore>) = match source {
        RecipientSource::TestRecipient(subscriber) => {
            info!("Test mode: sending only to {}", subscriber.email);
            (vec![subscriber], Arc::new(MemoryDeliveryStore::default()))
        }
        RecipientSource::Explicit(recipients) => (recipients, store),
        RecipientSource::Store => (store.active_subscribers().await?, store),
    };

    DistributionCoordinator::new(&config.distribution, transport, store)
        .distribute(&edition.edition, &edition.html, recipients)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chain_client::GovernanceCategory;
    use digest_core::{DeliveryError, ProviderError, RetryConfig};
    use distribution::OutboundEmail;
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FailingGovernance;

    #[async_trait]
    impl GovernanceProvider for FailingGovernance {
        async fn fetch(&self, _category: GovernanceCategory) -> Result<Vec<Value>, CoreError> {
            Err(ProviderError::Reported {
                provider: "failing".to_string(),
                message: "api.query.referenda undefined".to_string(),
            }
            .into())
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmailTransport for RecordingTransport {
        async fn send(&self, email: &OutboundEmail) -> Result<String, DeliveryError> {
            self.sent.lock().unwrap().push(email.to.clone());
            Ok("id".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn as_of() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-18T06:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn config() -> DigestConfig {
        let mut config = DigestConfig::default();
        config.retry = RetryConfig {
            max_attempts: 1,
            base_delay_ms: 1,
            max_delay_ms: 1,
            jitter_factor: 0.0,
            ..Default::default()
        };
        config
    }

    fn write_fixtures(dir: &TempDir) -> (PathBuf, PathBuf) {
        let forum = dir.path().join("forum.json");
        std::fs::write(
            &forum,
            json!([
                {"id": 1, "author": "alice", "title": "Ref #7 runtime upgrade", "excerpt": "Upgrade to v2 @bob",
                 "views": 100, "replies": 4, "created_at": "2026-10-17T10:00:00Z"},
                {"id": 2, "author": "bob", "title": "Treasury spending", "excerpt": "Treasury report",
                 "views": 50, "replies": 2, "created_at": "2026-10-16T10:00:00Z"}
            ])
            .to_string(),
        )
        .unwrap();

        let chain = dir.path().join("chain");
        std::fs::create_dir_all(&chain).unwrap();
        std::fs::write(
            chain.join("referenda.json"),
            json!([{
                "index": 7,
                "track": {"id": 0, "name": "root"},
                "proposal": {"decodedCall": {"section": "system", "method": "authorize_upgrade"}},
                "status": {
                    "tally": {"ayes": "123456789012345678901", "nays": "0", "support": "1"},
                    "decisionDeposit": null
                }
            }])
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            chain.join("treasury.json"),
            json!([{"id": 3, "proposer": "p", "value": "123456789012345678901", "beneficiary": "b", "bond": "0"}])
                .to_string(),
        )
        .unwrap();
        (forum, chain)
    }

    fn options(dir: &TempDir, scope: AnalysisScope) -> RunOptions {
        RunOptions {
            output_dir: dir.path().join("output"),
            scope,
            as_of: as_of(),
        }
    }

    #[tokio::test]
    async fn test_full_run_writes_report_and_newsletter() {
        let dir = TempDir::new().unwrap();
        let (forum, chain) = write_fixtures(&dir);
        let providers = Providers {
            forum: Some(Box::new(SnapshotForumProvider::new(forum))),
            governance: Some(Box::new(SnapshotDirProvider::new(chain))),
        };

        let artifacts = produce_artifacts(&config(), &options(&dir, AnalysisScope::All), &providers)
            .await
            .unwrap();

        assert!(!artifacts.all_domains_failed);
        assert!(artifacts.data_gap().is_none());
        assert!(!artifacts.report_reused);
        assert!(artifacts.report.has_forum_data());
        assert!(artifacts.report.has_governance_data());
        assert!(!artifacts.report.correlations.is_empty());
        assert!(artifacts.edition.html_path.exists());

        let json = std::fs::read_to_string(
            dir.path().join("output").join("integrated_report_2026-10-18.json"),
        )
        .unwrap();
        assert!(json.contains("\"123456789012345678901\""));
    }

    #[tokio::test]
    async fn test_rerun_reuses_report_and_edition() {
        let dir = TempDir::new().unwrap();
        let (forum, chain) = write_fixtures(&dir);
        let providers = Providers {
            forum: Some(Box::new(SnapshotForumProvider::new(forum.clone()))),
            governance: Some(Box::new(SnapshotDirProvider::new(chain))),
        };
        let first = produce_artifacts(&config(), &options(&dir, AnalysisScope::All), &providers)
            .await
            .unwrap();

        // Changed input must not rewrite an archived run.
        std::fs::write(&forum, "[]").unwrap();
        let markdown = dir
            .path()
            .join("output")
            .join("integrated_report_2026-10-18.md");
        std::fs::remove_file(&markdown).unwrap();

        let second = produce_artifacts(&config(), &options(&dir, AnalysisScope::All), &providers)
            .await
            .unwrap();

        assert!(second.report_reused);
        assert_eq!(second.report.executive_summary, first.report.executive_summary);
        assert_eq!(
            second.report.forum.as_ref().map(|f| f.posts_analyzed),
            Some(2)
        );
        assert_eq!(second.edition.html, first.edition.html);
        assert!(markdown.exists());
    }

    #[tokio::test]
    async fn test_both_domains_failing_still_writes_report() {
        let dir = TempDir::new().unwrap();
        let providers = Providers {
            forum: Some(Box::new(SnapshotForumProvider::new(dir.path().join("missing.json")))),
            governance: Some(Box::new(FailingGovernance)),
        };

        let artifacts = produce_artifacts(&config(), &options(&dir, AnalysisScope::All), &providers)
            .await
            .unwrap();

        assert!(artifacts.all_domains_failed);
        assert!(matches!(
            artifacts.data_gap(),
            Some(CoreError::SynthesisInputsEmpty)
        ));
        assert!(artifacts.report.inputs_empty);
        assert!(dir
            .path()
            .join("output")
            .join("integrated_report_2026-10-18.md")
            .exists());
    }

    #[tokio::test]
    async fn test_governance_only_scope() {
        let dir = TempDir::new().unwrap();
        let (forum, chain) = write_fixtures(&dir);
        let providers = Providers {
            forum: Some(Box::new(SnapshotForumProvider::new(forum))),
            governance: Some(Box::new(SnapshotDirProvider::new(chain))),
        };

        let artifacts = produce_artifacts(
            &config(),
            &options(&dir, AnalysisScope::GovernanceOnly),
            &providers,
        )
        .await
        .unwrap();

        assert!(artifacts.report.forum.is_none());
        assert!(artifacts.report.has_governance_data());
        assert!(!artifacts.all_domains_failed);
        assert!(artifacts.edition.edition.context.important_posts.is_none());
    }

    #[test]
    fn test_resolve_recipients() {
        let mut config = config();
        assert_eq!(
            resolve_recipients(&config, false, &[]).unwrap(),
            RecipientSource::Store
        );
        assert!(resolve_recipients(&config, true, &[]).is_err());

        config.distribution.test_recipient = Some("qa@example.org".to_string());
        match resolve_recipients(&config, true, &["x@example.org".to_string()]).unwrap() {
            RecipientSource::TestRecipient(s) => assert_eq!(s.email, "qa@example.org"),
            other => panic!("unexpected {:?}", other),
        }
        match resolve_recipients(&config, false, &["x@example.org".to_string()]).unwrap() {
            RecipientSource::Explicit(list) => assert_eq!(list[0].id, "adhoc:x@example.org"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_from_store_sends_to_active_subscribers() {
        let dir = TempDir::new().unwrap();
        let (forum, chain) = write_fixtures(&dir);
        let providers = Providers {
            forum: Some(Box::new(SnapshotForumProvider::new(forum))),
            governance: Some(Box::new(SnapshotDirProvider::new(chain))),
        };
        let mut config = config();
        config.distribution.rate_limit = digest_core::RateLimitConfig::unlimited();
        let artifacts = produce_artifacts(&config, &options(&dir, AnalysisScope::All), &providers)
            .await
            .unwrap();

        let store = Arc::new(MemoryDeliveryStore::new(vec![
            Subscriber::adhoc("one@example.org"),
            Subscriber::adhoc("two@example.org"),
        ]));
        let transport = Arc::new(RecordingTransport::default());
        let summary = dispatch(
            &config,
            &artifacts.edition,
            RecipientSource::Store,
            transport.clone(),
            store.clone(),
        )
        .await
        .unwrap();

        assert_eq!(summary.sent, 2);
        assert_eq!(transport.sent.lock().unwrap().len(), 2);
        assert!(store
            .delivery("adhoc:one@example.org", "2026-10-18")
            .unwrap()
            .is_sent());
    }
}
