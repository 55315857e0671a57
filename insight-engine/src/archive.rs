use crate::governance::RiskTier;
use crate::synthesis::IntegratedReport;
use digest_core::{write_new, CoreError, RunId};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    /// False when the run was already archived and nothing was written.
    pub created: bool,
    pub json_path: PathBuf,
    pub markdown_path: PathBuf,
}

/// Append-only store of integrated reports, one pair of files per run.
#[derive(Debug, Clone)]
pub struct ReportArchive {
    dir: PathBuf,
}

impl ReportArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn json_path(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("integrated_report_{}.json", run_id))
    }

    pub fn markdown_path(&self, run_id: RunId) -> PathBuf {
        self.dir.join(format!("integrated_report_{}.md", run_id))
    }

    pub async fn load(&self, run_id: RunId) -> Result<Option<IntegratedReport>, CoreError> {
        let path = self.json_path(run_id);
        match fs::read_to_string(&path).await {
            Ok(contents) => {
                debug!("Loaded archived report from {}", path.display());
                Ok(Some(serde_json::from_str(&contents)?))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// The JSON document is canonical and written first; an existing one is
    /// never replaced.
    pub async fn store(&self, report: &IntegratedReport) -> Result<StoreOutcome, CoreError> {
        fs::create_dir_all(&self.dir).await?;
        let json_path = self.json_path(report.run_id);
        let markdown_path = self.markdown_path(report.run_id);

        let json = serde_json::to_string_pretty(report)?;
        if !write_new(&json_path, json.as_bytes()).await? {
            info!(
                run_id = %report.run_id,
                "Report already archived at {}; leaving it untouched",
                json_path.display()
            );
            return Ok(StoreOutcome {
                created: false,
                json_path,
                markdown_path,
            });
        }

        if !write_new(&markdown_path, render_markdown(report).as_bytes()).await? {
            warn!(
                "Markdown report {} already exists; keeping the earlier copy",
                markdown_path.display()
            );
        }

        info!(run_id = %report.run_id, "Archived report to {}", json_path.display());
        Ok(StoreOutcome {
            created: true,
            json_path,
            markdown_path,
        })
    }

    /// Writes the markdown document of an archived report if it is missing.
    pub async fn ensure_markdown(&self, report: &IntegratedReport) -> Result<bool, CoreError> {
        let markdown_path = self.markdown_path(report.run_id);
        let written = write_new(&markdown_path, render_markdown(report).as_bytes()).await?;
        if written {
            info!(
                run_id = %report.run_id,
                "Restored missing markdown report at {}",
                markdown_path.display()
            );
        }
        Ok(written)
    }
}

pub fn render_markdown(report: &IntegratedReport) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Integrated Community Report: {}", report.run_id);
    let _ = writeln!(
        md,
        "\n_Generated at {}_\n",
        report.generated_at.to_rfc3339()
    );
    let _ = writeln!(md, "## Executive Summary\n\n{}\n", report.executive_summary);

    md.push_str("## Forum Activity\n\n");
    match report.forum.as_ref().filter(|f| !f.is_empty()) {
        None => md.push_str("No forum data for this period.\n\n"),
        Some(forum) => {
            let _ = writeln!(
                md,
                "{} posts analyzed, {} skipped.\n",
                forum.posts_analyzed, forum.posts_skipped
            );

            md.push_str("### Hot Topics\n\n");
            for (rank, topic) in forum.hot_topics.iter().take(10).enumerate() {
                let _ = writeln!(
                    md,
                    "{}. {} by {} ({} views, {} replies, score {:.2})",
                    rank + 1,
                    topic.title,
                    topic.author,
                    topic.views,
                    topic.replies,
                    topic.score
                );
            }

            md.push_str("\n### Trending Keywords\n\n");
            for keyword in &forum.trending_keywords {
                let _ = writeln!(md, "- {} ({})", keyword.word, keyword.count);
            }

            md.push_str("\n### Influential Users\n\n");
            for author in forum.influential_authors.iter().take(10) {
                let _ = writeln!(
                    md,
                    "- {}: {} posts, influence {:.1}",
                    author.handle, author.post_count, author.influence_score
                );
            }

            if !forum.category_activity.is_empty() {
                md.push_str("\n### Category Activity\n\n");
                md.push_str("| Category | Posts | Views | Replies |\n|---|---|---|---|\n");
                for c in &forum.category_activity {
                    let _ = writeln!(
                        md,
                        "| {} | {} | {} | {} |",
                        c.category, c.posts, c.views, c.replies
                    );
                }
            }

            if !forum.tag_activity.is_empty() {
                md.push_str("\n### Popular Tags\n\n");
                for t in forum.tag_activity.iter().take(20) {
                    let _ = writeln!(md, "- {} ({})", t.tag, t.count);
                }
            }
            md.push('\n');
        }
    }

    md.push_str("## Governance\n\n");
    match report.governance.as_ref().filter(|g| !g.is_empty()) {
        None => md.push_str("No governance data for this period.\n\n"),
        Some(gov) => {
            if !gov.degraded.is_empty() {
                let _ = writeln!(md, "Unavailable categories: {}\n", gov.degraded.join(", "));
            }
            let _ = writeln!(
                md,
                "{} referenda: {} high, {} medium, {} low risk. Total ayes {}, nays {}, support {}.\n",
                gov.tally.referenda,
                gov.tally.high,
                gov.tally.medium,
                gov.tally.low,
                gov.tally.total_ayes,
                gov.tally.total_nays,
                gov.tally.total_support
            );

            for tier in [RiskTier::High, RiskTier::Medium, RiskTier::Low] {
                let mut referenda = gov.referenda_in_tier(tier).peekable();
                if referenda.peek().is_none() {
                    continue;
                }
                let _ = writeln!(md, "### {} Risk\n", tier);
                for r in referenda {
                    let _ = writeln!(
                        md,
                        "- #{} {} on {} (approval {}, support {})",
                        r.index,
                        r.call_label(),
                        r.track_name,
                        r.approval_percent,
                        r.support_percent
                    );
                    for factor in &r.risk_factors {
                        let _ = writeln!(md, "  - {}", factor);
                    }
                }
                md.push('\n');
            }

            let _ = writeln!(
                md,
                "### Treasury\n\n{} proposals totalling {} (mean {}).\n",
                gov.treasury.proposals, gov.treasury.total_value, gov.treasury.mean_value
            );
            for p in &gov.treasury.high_value {
                let _ = writeln!(
                    md,
                    "- #{} requests {} for {} (proposed by {})",
                    p.id, p.value, p.beneficiary, p.proposer
                );
            }

            let _ = writeln!(
                md,
                "\n### Bounties\n\n{} bounties totalling {}.",
                gov.bounties.count, gov.bounties.total_value
            );
            for (status, count) in &gov.bounties.by_status {
                let _ = writeln!(md, "- {}: {}", status, count);
            }
            md.push('\n');
        }
    }

    if !report.correlations.is_empty() {
        md.push_str("## Correlations\n\n");
        for c in &report.correlations {
            let _ = writeln!(md, "- {}", c.detail);
        }
        md.push('\n');
    }

    md.push_str("## Recommendations\n\n");
    if report.recommendations.is_empty() {
        md.push_str("No recommendations.\n");
    }
    for (i, r) in report.recommendations.iter().enumerate() {
        let _ = writeln!(md, "{}. **{}**: {}", i + 1, r.kind, r.message);
    }
    md
}
