use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tlg_ledger::{ListOrder, LogType};

#[derive(Parser)]
#[command(
    name = "tlg",
    about = "Threat ledger: tamper-evident, hash-chained threat records",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// TOML server config; flags below override it.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the chain segment and index checkpoint.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Walk the whole chain and check every link and hash
    Audit,
    /// Show ledger statistics
    Stats,
    /// Show the latest state of one record
    Show(RecordArgs),
    /// Show the transaction history of one record
    History(RecordArgs),
    /// Compare a payload against the stored hash of a record
    Verify(VerifyArgs),
    /// List active records
    List(ListArgs),
    /// Append a CREATE, UPDATE or DELETE transaction
    Commit(CommitArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Background audit period in seconds (0 disables it).
    #[arg(long)]
    pub audit_interval: Option<u64>,
}

#[derive(Args)]
pub struct RecordArgs {
    pub log_id: String,
}

#[derive(Args)]
pub struct VerifyArgs {
    pub log_id: String,
    /// Payload to check, as JSON.
    #[arg(long)]
    pub data: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[arg(long)]
    pub log_type: Option<LogType>,
    #[arg(long)]
    pub severity: Option<String>,
    /// Payload `type` field.
    #[arg(long = "type")]
    pub threat_type: Option<String>,
    #[arg(long)]
    pub source_ip: Option<String>,
    #[arg(long)]
    pub detection_method: Option<String>,
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub offset: Option<usize>,
    #[arg(long, default_value = "newest")]
    pub order: ListOrder,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum CommitKind {
    Create,
    Update,
    Delete,
}

#[derive(Args)]
pub struct CommitArgs {
    pub log_id: String,
    #[arg(short = 't', long = "type", default_value = "create")]
    pub kind: CommitKind,
    /// Required for create; taken from the record otherwise.
    #[arg(long)]
    pub log_type: Option<LogType>,
    #[arg(short = 'm', long)]
    pub detection_method: Option<String>,
    /// Payload as JSON. Ignored for delete.
    #[arg(short, long)]
    pub payload: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serve() {
        let cli = Cli::try_parse_from(["tlg", "serve", "--bind", "0.0.0.0:8080"]).unwrap();
        if let Command::Serve(args) = cli.command {
            assert_eq!(args.bind, Some("0.0.0.0:8080".parse().unwrap()));
            assert_eq!(args.audit_interval, None);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["tlg", "audit", "--data-dir", "/var/lib/tlg", "--format", "json"])
                .unwrap();
        assert!(matches!(cli.command, Command::Audit));
        assert_eq!(cli.data_dir, Some(PathBuf::from("/var/lib/tlg")));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn parse_commit_create() {
        let cli = Cli::try_parse_from([
            "tlg",
            "commit",
            "NT-1",
            "--log-type",
            "network_threat",
            "-m",
            "network_ai_service",
            "--payload",
            r#"{"severity":"high"}"#,
        ])
        .unwrap();
        if let Command::Commit(args) = cli.command {
            assert_eq!(args.log_id, "NT-1");
            assert_eq!(args.kind, CommitKind::Create);
            assert_eq!(args.log_type, Some(LogType::NetworkThreat));
            assert_eq!(args.detection_method.as_deref(), Some("network_ai_service"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_commit_delete() {
        let cli = Cli::try_parse_from(["tlg", "commit", "NT-1", "--type", "delete"]).unwrap();
        if let Command::Commit(args) = cli.command {
            assert_eq!(args.kind, CommitKind::Delete);
            assert!(args.payload.is_none());
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_list_filters() {
        let cli = Cli::try_parse_from([
            "tlg", "list", "--severity", "high", "--type", "port_scan", "-n", "5", "--order",
            "oldest",
        ])
        .unwrap();
        if let Command::List(args) = cli.command {
            assert_eq!(args.severity.as_deref(), Some("high"));
            assert_eq!(args.threat_type.as_deref(), Some("port_scan"));
            assert_eq!(args.limit, Some(5));
            assert_eq!(args.order, ListOrder::Oldest);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn rejects_unknown_log_type() {
        assert!(Cli::try_parse_from(["tlg", "list", "--log-type", "malware"]).is_err());
    }

    #[test]
    fn verify_requires_data() {
        assert!(Cli::try_parse_from(["tlg", "verify", "NT-1"]).is_err());
    }
}
