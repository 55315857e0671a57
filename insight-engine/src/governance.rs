//! Governance risk scoring.
//!
//! Every threshold comparison is done on integers: a ratio `a/b` against a
//! minimum `c/d` is decided by comparing `a*d` with `c*b`. Floats never touch
//! a tally.

use digest_core::{
    parse_chain_record, Balance, Bounty, ConfigError, DecodedCall, Ratio, RecordKind, Referendum,
    RiskConfig, TreasuryProposal,
};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{info, warn};

const PERBILL: u64 = 1_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
        };
        f.write_str(label)
    }
}

/// Raw records per category, as returned by the provider.
#[derive(Debug, Clone, Default)]
pub struct GovernanceInput {
    pub referenda: Vec<Value>,
    pub treasury: Vec<Value>,
    pub bounties: Vec<Value>,
    /// Categories whose provider call failed, with the reason.
    pub degraded: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredReferendum {
    pub index: u32,
    pub track_id: u16,
    pub track_name: String,
    pub decoded_call: Option<DecodedCall>,
    pub tier: RiskTier,
    pub risk_factors: Vec<String>,
    pub ayes: Balance,
    pub nays: Balance,
    pub support: Balance,
    pub approval_percent: String,
    pub support_percent: String,
    pub has_decision_deposit: bool,
    /// Block at which the referendum was submitted.
    #[serde(default)]
    pub submitted_at: Option<u64>,
}

impl ScoredReferendum {
    pub fn call_label(&self) -> String {
        self.decoded_call
            .as_ref()
            .map(DecodedCall::label)
            .unwrap_or_else(|| "unknown call".to_string())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TallySummary {
    pub referenda: usize,
    pub total_ayes: Balance,
    pub total_nays: Balance,
    pub total_support: Balance,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TreasuryInsight {
    pub proposals: usize,
    pub total_value: Balance,
    /// Floor of the batch mean, for display.
    pub mean_value: Balance,
    pub high_value: Vec<TreasuryProposal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BountySummary {
    pub count: usize,
    pub total_value: Balance,
    pub by_status: BTreeMap<String, usize>,
    pub largest: Option<Bounty>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecords {
    pub referenda: usize,
    pub treasury: usize,
    pub bounties: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceAnalysis {
    pub referenda: Vec<ScoredReferendum>,
    pub tally: TallySummary,
    pub treasury: TreasuryInsight,
    pub bounties: BountySummary,
    pub skipped: SkippedRecords,
    pub degraded: Vec<String>,
}

impl GovernanceAnalysis {
    pub fn is_empty(&self) -> bool {
        self.referenda.is_empty() && self.treasury.proposals == 0 && self.bounties.count == 0
    }

    pub fn referenda_in_tier(&self, tier: RiskTier) -> impl Iterator<Item = &ScoredReferendum> {
        self.referenda.iter().filter(move |r| r.tier == tier)
    }
}

pub struct GovernanceRiskScorer<'a> {
    config: &'a RiskConfig,
    electorate: Balance,
    outlier_k: Ratio,
}

impl<'a> GovernanceRiskScorer<'a> {
    pub fn new(config: &'a RiskConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            config,
            electorate: config.electorate()?,
            outlier_k: config.outlier_k()?,
        })
    }

    pub fn score(&self, input: &GovernanceInput) -> GovernanceAnalysis {
        let mut skipped = SkippedRecords::default();

        let referenda: Vec<Referendum> =
            parse_all(RecordKind::Referendum, &input.referenda, &mut skipped.referenda);
        let proposals: Vec<TreasuryProposal> =
            parse_all(RecordKind::TreasuryProposal, &input.treasury, &mut skipped.treasury);
        let bounties: Vec<Bounty> =
            parse_all(RecordKind::Bounty, &input.bounties, &mut skipped.bounties);

        let mut scored: Vec<ScoredReferendum> =
            referenda.iter().map(|r| self.score_referendum(r)).collect();
        scored.sort_by(|a, b| b.tier.cmp(&a.tier).then(a.index.cmp(&b.index)));

        let analysis = GovernanceAnalysis {
            tally: summarize_tallies(&scored),
            referenda: scored,
            treasury: self.treasury_insight(proposals),
            bounties: summarize_bounties(bounties),
            skipped,
            degraded: input.degraded.clone(),
        };

        info!(
            referenda = analysis.referenda.len(),
            high_risk = analysis.tally.high,
            treasury = analysis.treasury.proposals,
            bounties = analysis.bounties.count,
            "Scored governance snapshot"
        );
        analysis
    }

    fn thresholds(&self, referendum: &Referendum) -> (Ratio, Ratio) {
        let info = referendum.track.info.as_ref();
        let override_for = self.config.track_overrides.get(&referendum.track.name);

        let approval = info
            .and_then(|i| perbill(i.min_approval.as_ref()))
            .or(override_for.map(|o| o.min_approval_perbill))
            .unwrap_or(self.config.default_min_approval_perbill);
        let support = info
            .and_then(|i| perbill(i.min_support.as_ref()))
            .or(override_for.map(|o| o.min_support_perbill))
            .unwrap_or(self.config.default_min_support_perbill);

        (Ratio::from_perbill(approval), Ratio::from_perbill(support))
    }

    pub fn score_referendum(&self, referendum: &Referendum) -> ScoredReferendum {
        let tally = &referendum.status.tally;
        let approval = Ratio::of(&tally.ayes, &(&tally.ayes + &tally.nays));
        let support = Ratio::of(&tally.support, &self.electorate);
        let (min_approval, min_support) = self.thresholds(referendum);

        let mut tier = RiskTier::Low;
        let mut factors = Vec::new();

        let has_deposit = referendum.status.decision_deposit.is_some();
        if !has_deposit {
            tier = tier.max(RiskTier::High);
            factors.push("no decision deposit placed; referendum may lapse".to_string());
        }

        for (label, actual, minimum) in [
            ("approval", &approval, &min_approval),
            ("support", &support, &min_support),
        ] {
            if let Some((band, margin)) = self.margin_band(actual, minimum) {
                tier = tier.max(band);
                factors.push(format!(
                    "{} {} is less than {}% above the track minimum {}",
                    label,
                    actual.percent_string(2),
                    margin,
                    minimum.percent_string(2)
                ));
            }
        }

        let decoded_call = referendum
            .proposal
            .as_ref()
            .and_then(|p| p.decoded_call.clone());
        let call_text = decoded_call
            .as_ref()
            .map(DecodedCall::search_text)
            .unwrap_or_default();
        let track_text = referendum.track.name.to_lowercase();
        if let Some(keyword) = self
            .config
            .risk_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .find(|k| call_text.contains(k.as_str()) || track_text.contains(k.as_str()))
        {
            tier = tier.max(RiskTier::Medium);
            factors.push(format!("privileged operation ({})", keyword));
        }

        ScoredReferendum {
            index: referendum.index,
            track_id: referendum.track.id,
            track_name: referendum.track.name.clone(),
            decoded_call,
            tier,
            risk_factors: factors,
            ayes: tally.ayes.clone(),
            nays: tally.nays.clone(),
            support: tally.support.clone(),
            approval_percent: approval.percent_string(2),
            support_percent: support.percent_string(4),
            has_decision_deposit: has_deposit,
            submitted_at: referendum.status.submitted_at,
        }
    }

    /// High when below `min * (1 + high margin)`, Medium below the medium
    /// margin. Ratios at or above the wider band are unremarkable.
    fn margin_band(&self, actual: &Ratio, minimum: &Ratio) -> Option<(RiskTier, u32)> {
        let high = self.config.high_margin_percent;
        let medium = self.config.medium_margin_percent;
        if *actual < minimum.with_margin(high) {
            Some((RiskTier::High, high))
        } else if *actual < minimum.with_margin(medium) {
            Some((RiskTier::Medium, medium))
        } else {
            None
        }
    }

    /// Flags proposals above `mean + k * stddev` of this batch, evaluated as
    /// `(q * (n*v - S))^2 > p^2 * (n*Q - S^2)` with `k = p/q`.
    pub fn treasury_insight(&self, proposals: Vec<TreasuryProposal>) -> TreasuryInsight {
        let n = BigUint::from(proposals.len());
        let total: Balance = proposals.iter().map(|p| &p.value).sum();
        let sum = total.as_biguint().clone();
        let sum_sq: BigUint = proposals
            .iter()
            .map(|p| p.value.as_biguint() * p.value.as_biguint())
            .sum();

        let spread = &n * &sum_sq - &sum * &sum;
        let p = self.outlier_k.numer();
        let q = self.outlier_k.denom();
        let rhs = p * p * &spread;

        let mut high_value: Vec<TreasuryProposal> = proposals
            .iter()
            .filter(|proposal| {
                let scaled = &n * proposal.value.as_biguint();
                if scaled <= sum {
                    return false;
                }
                let excess = q * (scaled - &sum);
                &excess * &excess > rhs
            })
            .cloned()
            .collect();
        high_value.sort_by(|a, b| b.value.cmp(&a.value).then(a.id.cmp(&b.id)));

        let mean_value = if proposals.is_empty() {
            Balance::zero()
        } else {
            Balance::from(&sum / &n)
        };

        TreasuryInsight {
            proposals: proposals.len(),
            total_value: total,
            mean_value,
            high_value,
        }
    }
}

fn perbill(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(Value::as_u64)
        .filter(|v| *v <= PERBILL)
        .map(|v| v as u32)
}

fn parse_all<T>(kind: RecordKind, records: &[Value], skipped: &mut usize) -> Vec<T>
where
    T: serde::de::DeserializeOwned,
{
    records
        .iter()
        .filter_map(|record| match parse_chain_record::<T>(kind, record) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(
                    kind = %e.kind,
                    locator = %e.locator,
                    reason = %e.reason,
                    "Skipping malformed governance record"
                );
                *skipped += 1;
                None
            }
        })
        .collect()
}

fn summarize_tallies(referenda: &[ScoredReferendum]) -> TallySummary {
    let mut summary = TallySummary {
        referenda: referenda.len(),
        ..Default::default()
    };
    for referendum in referenda {
        summary.total_ayes = &summary.total_ayes + &referendum.ayes;
        summary.total_nays = &summary.total_nays + &referendum.nays;
        summary.total_support = &summary.total_support + &referendum.support;
        match referendum.tier {
            RiskTier::High => summary.high += 1,
            RiskTier::Medium => summary.medium += 1,
            RiskTier::Low => summary.low += 1,
        }
    }
    summary
}

fn summarize_bounties(bounties: Vec<Bounty>) -> BountySummary {
    let mut by_status = BTreeMap::new();
    for bounty in &bounties {
        *by_status.entry(bounty.status.clone()).or_insert(0) += 1;
    }
    let total_value = bounties.iter().map(|b| &b.value).sum();
    let largest = bounties
        .iter()
        .max_by(|a, b| a.value.cmp(&b.value).then(b.id.cmp(&a.id)))
        .cloned();

    BountySummary {
        count: bounties.len(),
        total_value,
        by_status,
        largest,
    }
}
