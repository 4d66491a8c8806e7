#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]

use bitfund_core::node_client::http_client::HttpNodeClient;
use bitfund_core::node_client::mock_client::MockNodeClient;
use bitfund_core::{
    ContributionInput, NodeClient, SubmissionClient, SubmissionMode, SubmissionResult,
    SubmissionStatus, TxBuilder, TxId,
};
use bitfund_node::campaign_store::CampaignStore;
use bitfund_node::config::{self, BitfundConfig};
use bitfund_node::stdin_wallet::LineWallet;
use bitfund_node::workflow::{CampaignWorkflow, NewCampaignInput, SubmitOptions};
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "BitFund campaign operator CLI")]
struct Args {
    /// Path to a TOML config file. If omitted, uses `BITFUND_CONFIG`.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node mode:
    /// - mock: offline in-process node with a throwaway campaign store (default)
    /// - http: real node API from `[node]`, campaigns kept in `[storage]`
    #[arg(long, value_enum, default_value_t = NodeMode::Mock)]
    node_mode: NodeMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq)]
enum NodeMode {
    Mock,
    Http,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, PartialEq, Eq, Default)]
enum ModeArg {
    /// Sign with `[signer].private_key` and broadcast.
    #[default]
    Direct,
    /// Print the unsigned call and read the approved tx id from stdin.
    Wallet,
}

impl From<ModeArg> for SubmissionMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Direct => SubmissionMode::Direct,
            ModeArg::Wallet => SubmissionMode::Wallet,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a funding campaign and record it locally.
    CreateCampaign(CreateCampaignArgs),

    /// Contribute to an existing campaign.
    Contribute(ContributeArgs),

    /// Look up a transaction once (updates the stored campaign id if confirmed).
    Status {
        #[arg(long)]
        tx: String,
    },

    /// Locally recorded campaigns.
    Campaigns {
        #[command(subcommand)]
        cmd: CampaignsCommand,
    },

    /// Amount an address has contributed to a campaign, read from the contract.
    Contribution {
        #[arg(long)]
        campaign_id: String,
        #[arg(long)]
        contributor: String,
    },

    /// Asset balance of an address.
    Balance {
        #[arg(long)]
        address: String,
    },

    /// Deploy a contract from a source file (direct signing only).
    Deploy {
        #[arg(long)]
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        no_wait: bool,
    },
}

#[derive(Debug, clap::Args)]
struct CreateCampaignArgs {
    #[arg(long)]
    name: String,
    #[arg(long, default_value = "")]
    description: String,
    /// Funding goal in whole asset units, e.g. `1.5`.
    #[arg(long)]
    goal: String,
    /// RFC 3339 timestamp or unix seconds.
    #[arg(long)]
    deadline: String,
    #[arg(long, value_enum, default_value_t = ModeArg::Direct)]
    mode: ModeArg,
    /// Return after submission without polling for confirmation.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Debug, clap::Args)]
struct ContributeArgs {
    #[arg(long)]
    campaign_id: String,
    /// Amount in whole asset units.
    #[arg(long)]
    amount: String,
    #[arg(long, value_enum, default_value_t = ModeArg::Direct)]
    mode: ModeArg,
    #[arg(long)]
    no_wait: bool,
}

#[derive(Debug, Subcommand)]
enum CampaignsCommand {
    /// All campaigns, newest first.
    List {
        /// Only campaigns whose deadline has not passed, soonest first.
        #[arg(long)]
        active: bool,
    },
    /// One campaign by local id or creating transaction.
    #[command(group(ArgGroup::new("key").required(true).args(["id", "tx"])))]
    Get {
        #[arg(long)]
        id: Option<u64>,
        #[arg(long)]
        tx: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let cfg_path = resolve_config_path(args.config.as_deref()).unwrap_or_else(|| {
        exit_err("missing config: pass --config or set BITFUND_CONFIG")
    });
    let cfg = config::load_config(&cfg_path).unwrap_or_else(|e| exit_err(&e));

    init_logging(&cfg);
    info!(node_mode = ?args.node_mode, "starting bitfund-node");

    let workflow = build_workflow(&cfg, args.node_mode).unwrap_or_else(|e| exit_err(&e));

    match args.command {
        Command::CreateCampaign(a) => {
            let deadline_secs = parse_deadline(&a.deadline).unwrap_or_else(|e| exit_err(&e));
            let out = workflow
                .create_campaign(
                    NewCampaignInput {
                        project_name: a.name,
                        project_description: a.description,
                        funding_goal: a.goal,
                        deadline_secs: Some(deadline_secs),
                    },
                    SubmitOptions {
                        mode: a.mode.into(),
                        wait: !a.no_wait,
                    },
                )
                .await
                .unwrap_or_else(|e| exit_err(&e.to_string()));
            print_json(&out);
            exit_for(&out.submission);
        }
        Command::Contribute(a) => {
            let res = workflow
                .contribute(
                    ContributionInput {
                        campaign_id: a.campaign_id,
                        amount: a.amount,
                    },
                    SubmitOptions {
                        mode: a.mode.into(),
                        wait: !a.no_wait,
                    },
                )
                .await
                .unwrap_or_else(|e| exit_err(&e.to_string()));
            print_json(&res);
            exit_for(&res);
        }
        Command::Status { tx } => {
            let tx_id = TxId::parse(&tx)
                .unwrap_or_else(|| exit_err(&format!("invalid transaction id: {tx:?}")));
            let report = workflow
                .refresh_status(&tx_id)
                .await
                .unwrap_or_else(|e| exit_err(&e.to_string()));
            print_json(&report);
        }
        Command::Campaigns { cmd } => match cmd {
            CampaignsCommand::List { active } => {
                let list = workflow
                    .list_campaigns(active)
                    .unwrap_or_else(|e| exit_err(&e.to_string()));
                print_json(&list);
            }
            CampaignsCommand::Get { id, tx } => {
                let store = workflow.store();
                let found = match (id, tx) {
                    (Some(id), _) => store.get(id),
                    (None, Some(tx)) => {
                        let tx_id = TxId::parse(&tx)
                            .unwrap_or_else(|| exit_err(&format!("invalid transaction id: {tx:?}")));
                        store.get_by_tx_id(tx_id.as_str())
                    }
                    (None, None) => exit_err("pass --id or --tx"),
                }
                .unwrap_or_else(|e| exit_err(&e.to_string()));
                match found {
                    Some(rec) => print_json(&rec),
                    None => exit_err("campaign not found"),
                }
            }
        },
        Command::Contribution {
            campaign_id,
            contributor,
        } => {
            let report = workflow
                .contribution(&campaign_id, &contributor)
                .await
                .unwrap_or_else(|e| exit_err(&e.to_string()));
            print_json(&report);
        }
        Command::Balance { address } => {
            let report = workflow
                .balance(&address)
                .await
                .unwrap_or_else(|e| exit_err(&e.to_string()));
            print_json(&report);
        }
        Command::Deploy {
            name,
            file,
            no_wait,
        } => {
            let code = fs::read_to_string(&file)
                .unwrap_or_else(|e| exit_err(&format!("failed to read {}: {e}", file.display())));
            let res = workflow
                .deploy(&name, &code, !no_wait)
                .await
                .unwrap_or_else(|e| exit_err(&e.to_string()));
            print_json(&res);
            exit_for(&res);
        }
    }
}

fn build_workflow(cfg: &BitfundConfig, mode: NodeMode) -> Result<CampaignWorkflow, String> {
    let node: Arc<dyn NodeClient> = match mode {
        NodeMode::Mock => Arc::new(MockNodeClient::new()),
        NodeMode::Http => {
            cfg.validate_for_mode_http()?;
            Arc::new(HttpNodeClient::new(cfg.node.clone()).map_err(|e| e.to_string())?)
        }
    };

    let mut submission = SubmissionClient::new(node, cfg.confirmation.clone())
        .with_wallet(Arc::new(LineWallet::stdio()))
        .with_fee(cfg.signer.fee);
    if let Some(signer) = cfg.signer.load()? {
        submission = submission.with_signer(Arc::new(signer));
    }

    let builder = TxBuilder::new(cfg.builder_config()?).map_err(|e| e.to_string())?;
    let store = open_store(cfg, mode)?;
    Ok(CampaignWorkflow::new(
        builder,
        submission,
        store,
        cfg.contract.asset_id(),
    ))
}

/// Mock-mode campaigns never reach the configured store.
fn open_store(cfg: &BitfundConfig, mode: NodeMode) -> Result<CampaignStore, String> {
    match mode {
        NodeMode::Mock => CampaignStore::open_temporary()
            .map_err(|e| format!("failed to open temporary campaign store: {e}")),
        NodeMode::Http => CampaignStore::open(&cfg.storage.campaign_db_dir).map_err(|e| {
            format!(
                "failed to open campaign store {}: {e}",
                cfg.storage.campaign_db_dir
            )
        }),
    }
}

fn parse_deadline(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(secs);
    }
    let ts = OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|e| format!("invalid --deadline {raw:?} (RFC 3339 or unix seconds): {e}"))?;
    u64::try_from(ts.unix_timestamp()).map_err(|_| format!("--deadline before 1970: {raw}"))
}

fn print_json<T: Serialize>(v: &T) {
    match serde_json::to_string_pretty(v) {
        Ok(s) => println!("{s}"),
        Err(e) => exit_err(&format!("failed to encode output: {e}")),
    }
}

/// Observed failure and undetermined outcomes exit non-zero after printing.
fn exit_for(res: &SubmissionResult) {
    if matches!(
        res.status,
        SubmissionStatus::Failed | SubmissionStatus::Unknown
    ) {
        std::process::exit(1);
    }
}

fn resolve_config_path(cli: Option<&Path>) -> Option<String> {
    if let Some(p) = cli {
        return Some(p.to_string_lossy().to_string());
    }
    std::env::var("BITFUND_CONFIG").ok()
}

fn init_logging(cfg: &BitfundConfig) {
    // Prefer explicit config logging.level unless user set RUST_LOG.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cfg.logging.level.as_str()));

    if cfg.logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn exit_err(msg: &str) -> ! {
    eprintln!("{msg}");
    std::process::exit(2);
}
