use clap::{Args, Parser, Subcommand, ValueEnum};
use digest_core::{AnalysisScope, DigestConfig};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "community_digest.toml";

#[derive(Debug, Parser)]
#[command(
    name = "community-digest",
    version,
    about = "Weekly Polkadot forum and governance digest",
    args_conflicts_with_subcommands = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Arguments for the default `run` command.
    #[command(flatten)]
    pub run: RunArgs,

    /// TOML configuration file. Defaults apply when the default path is absent.
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subscriber and delivery database.
    #[arg(long, global = true, env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[arg(long, short = 'd', global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze, write the report and newsletter, optionally send it.
    Run(RunArgs),

    /// Manage newsletter subscribers.
    Subscribers {
        #[command(subcommand)]
        action: SubscriberAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum SubscriberAction {
    Add {
        email: String,
        #[arg(long)]
        name: Option<String>,
    },
    Remove {
        email: String,
    },
    List,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Where reports and newsletters are written.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Governance query service endpoint.
    #[arg(long, value_name = "URL")]
    pub rpc_endpoint: Option<String>,

    #[arg(long, value_name = "URL")]
    pub forum_url: Option<String>,

    /// Read forum posts from a JSON file instead of the live forum.
    #[arg(long, value_name = "FILE")]
    pub forum_snapshot: Option<PathBuf>,

    /// Directory holding referenda.json, treasury.json and bounties.json.
    #[arg(long, value_name = "DIR")]
    pub governance_snapshot: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = ScopeArg::All)]
    pub scope: ScopeArg,

    #[arg(long)]
    pub send_newsletter: bool,

    /// Send only to these addresses instead of the subscriber list.
    #[arg(long = "recipient", value_name = "EMAIL")]
    pub recipients: Vec<String>,

    /// Send only to the test recipient, without touching the delivery ledger.
    #[arg(long)]
    pub test_mode: bool,

    #[arg(long, value_name = "EMAIL")]
    pub test_recipient: Option<String>,

    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub resend_api_key: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "kebab-case")]
pub enum ScopeArg {
    #[default]
    All,
    ForumOnly,
    GovernanceOnly,
}

impl From<ScopeArg> for AnalysisScope {
    fn from(value: ScopeArg) -> Self {
        match value {
            ScopeArg::All => AnalysisScope::All,
            ScopeArg::ForumOnly => AnalysisScope::ForumOnly,
            ScopeArg::GovernanceOnly => AnalysisScope::GovernanceOnly,
        }
    }
}

impl Cli {
    /// The explicit `run` arguments, or the flattened top-level ones.
    pub fn run_args(&self) -> RunArgs {
        match &self.command {
            Some(Command::Run(args)) => args.clone(),
            _ => self.run.clone(),
        }
    }
}

/// Command-line values take precedence over the file.
pub fn apply_overrides(config: &mut DigestConfig, args: &RunArgs, database_url: Option<&str>) {
    if let Some(dir) = &args.output_dir {
        config.report.output_dir = dir.clone();
    }
    if let Some(endpoint) = &args.rpc_endpoint {
        config.chain.endpoint = Some(endpoint.clone());
    }
    if let Some(url) = &args.forum_url {
        config.forum.base_url = url.clone();
    }
    if let Some(path) = &args.forum_snapshot {
        config.forum.snapshot_path = Some(path.clone());
    }
    if let Some(dir) = &args.governance_snapshot {
        config.chain.snapshot_dir = Some(dir.clone());
    }
    if let Some(recipient) = &args.test_recipient {
        config.distribution.test_recipient = Some(recipient.clone());
    }
    if let Some(key) = &args.resend_api_key {
        config.distribution.api_key = Some(key.clone());
    }
    if let Some(url) = database_url {
        config.distribution.database_url = url.to_string();
    }
}
