use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tlg_ledger::{CommitRequest, LedgerConfig, LedgerService, ListFilter, RecordStatus};
use tlg_server::{LedgerServer, ServerConfig};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_deref(), &cli)?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        command => {
            let ledger = open_offline(&config.ledger).await?;
            let outcome = execute(&ledger, command, cli.format).await;
            ledger.shutdown().await?;
            outcome
        }
    }
}

/// Config file first, then command-line overrides.
fn resolve_config(path: Option<&Path>, cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.ledger.data_dir = Some(dir.clone());
    }
    Ok(config)
}

async fn open_offline(config: &LedgerConfig) -> anyhow::Result<LedgerService> {
    if config.data_dir.is_none() {
        bail!("no data directory configured (pass --data-dir or set ledger.data_dir)");
    }
    Ok(LedgerService::open(config.clone()).await?)
}

async fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(secs) = args.audit_interval {
        config.ledger.audit_interval_secs = Some(secs);
    }
    if config.ledger.data_dir.is_none() {
        tracing::warn!("no data directory configured; the chain lives in memory only");
    }
    LedgerServer::new(config).serve().await?;
    Ok(())
}

pub(crate) async fn execute(
    ledger: &LedgerService,
    command: Command,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Command::Serve(_) => bail!("serve cannot run against an open ledger"),
        Command::Audit => cmd_audit(ledger, format).await,
        Command::Stats => cmd_stats(ledger, format),
        Command::Show(args) => cmd_show(ledger, args, format),
        Command::History(args) => cmd_history(ledger, args, format),
        Command::Verify(args) => cmd_verify(ledger, args, format),
        Command::List(args) => cmd_list(ledger, args, format),
        Command::Commit(args) => cmd_commit(ledger, args, format).await,
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

async fn cmd_audit(ledger: &LedgerService, format: OutputFormat) -> anyhow::Result<()> {
    match ledger.verify_chain_integrity().await {
        Ok(report) => emit(format, &report, |r| {
            println!("{} Chain integrity verified", "✓".green().bold());
            println!("  Blocks checked: {}", r.blocks_checked.to_string().bold());
            println!("  Head: {}", r.latest_block_hash.to_string().cyan());
        }),
        Err(e) => {
            if format == OutputFormat::Text {
                println!("{} {}", "✗ Chain integrity check failed:".red().bold(), e);
            }
            Err(e.into())
        }
    }
}

fn cmd_stats(ledger: &LedgerService, format: OutputFormat) -> anyhow::Result<()> {
    let stats = ledger.statistics()?;
    emit(format, &stats, |s| {
        println!("Block height:  {}", s.block_height.to_string().bold());
        println!("Transactions:  {}", s.total_transactions);
        println!("Records:       {} created, {} active", s.total_logs, s.ledger_size);
        println!("Head:          {}", s.latest_block_hash.short_hex().cyan());
        for (title, counts) in [
            ("By type", &s.by_type),
            ("By severity", &s.by_severity),
            ("By detector", &s.by_detector),
            ("By log type", &s.by_log_type),
        ] {
            if counts.is_empty() {
                continue;
            }
            println!("\n{}", title.bold());
            for (key, count) in counts {
                println!("  {key:<24} {count}");
            }
        }
        if !s.recent_activity.is_empty() {
            println!("\n{}", "Recent activity".bold());
            for entry in &s.recent_activity {
                println!(
                    "  {} {:<6} {} (block {})",
                    entry.tx_id.to_string().yellow(),
                    entry.tx_type.as_str(),
                    entry.log_id,
                    entry.block_number
                );
            }
        }
    })
}

fn cmd_show(ledger: &LedgerService, args: RecordArgs, format: OutputFormat) -> anyhow::Result<()> {
    let record = ledger.get(&args.log_id)?;
    emit(format, &record, |r| {
        let status = match r.status {
            RecordStatus::Active => r.status.as_str().green(),
            RecordStatus::Deleted => r.status.as_str().red(),
        };
        println!("{} ({}) [{}]", r.log_id.to_string().yellow().bold(), r.log_type, status);
        println!("  Detector:  {}", r.detection_method);
        println!("  Hash:      {}", r.hash.to_string().cyan());
        println!("  Latest tx: {} in block {}", r.latest_tx_id, r.block_number);
        println!("  Created:   {}", r.created_at.to_rfc3339());
        println!("  Updated:   {}", r.updated_at.to_rfc3339());
        println!("  Payload:   {}", r.payload);
    })
}

fn cmd_history(ledger: &LedgerService, args: RecordArgs, format: OutputFormat) -> anyhow::Result<()> {
    let history = ledger.history(&args.log_id)?;
    emit(format, &history, |entries| {
        for entry in entries {
            println!(
                "{}  {:<6}  block {:<6} {}  {}",
                entry.tx_id.to_string().yellow(),
                entry.tx_type.as_str(),
                entry.block_number,
                entry.payload_hash.short_hex().dimmed(),
                entry.timestamp.to_rfc3339()
            );
        }
    })
}

fn cmd_verify(ledger: &LedgerService, args: VerifyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let current: Value = serde_json::from_str(&args.data).context("--data is not valid JSON")?;
    let result = ledger.verify(&args.log_id, &current)?;
    emit(format, &result, |r| {
        if r.valid {
            println!("{} {}", "✓".green().bold(), r.message);
        } else {
            println!("{} {}", "✗".red().bold(), r.message);
        }
        println!("  Stored:     {}", r.stored_hash.to_string().cyan());
        println!("  Calculated: {}", r.calculated_hash.to_string().cyan());
    })
}

fn cmd_list(ledger: &LedgerService, args: ListArgs, format: OutputFormat) -> anyhow::Result<()> {
    let filter = ListFilter {
        log_type: args.log_type,
        severity: args.severity,
        threat_type: args.threat_type,
        source_ip: args.source_ip,
        detection_method: args.detection_method,
        limit: args.limit,
        offset: args.offset,
        order: args.order,
    };
    let page = ledger.list(&filter)?;
    emit(format, &page, |p| {
        for item in &p.items {
            let severity = item
                .payload
                .get("severity")
                .and_then(Value::as_str)
                .unwrap_or("-");
            println!(
                "{:<24} {:<20} {:<10} {}",
                item.log_id.to_string().yellow(),
                item.log_type.as_str(),
                severity,
                item.hash.short_hex().dimmed()
            );
        }
        println!(
            "{} of {} records (offset {})",
            p.items.len(),
            p.total,
            p.offset
        );
    })
}

async fn cmd_commit(ledger: &LedgerService, args: CommitArgs, format: OutputFormat) -> anyhow::Result<()> {
    let request = build_request(ledger, args)?;
    let tx_type = request.tx_type;
    let receipt = ledger.commit(request).await?;
    emit(format, &receipt, |r| {
        println!("{} {} committed", "✓".green().bold(), tx_type);
        println!("  Tx:    {}", r.tx_id.to_string().yellow());
        println!("  Block: {}", r.block_number);
        println!("  Hash:  {}", r.hash.to_string().cyan());
    })
}

fn build_request(ledger: &LedgerService, args: CommitArgs) -> anyhow::Result<CommitRequest> {
    let payload = match (&args.payload, args.kind) {
        (_, CommitKind::Delete) | (None, _) => Value::Null,
        (Some(text), _) => serde_json::from_str(text).context("--payload is not valid JSON")?,
    };

    if args.kind == CommitKind::Create {
        let log_type = args.log_type.context("--log-type is required for create")?;
        let method = args
            .detection_method
            .context("--detection-method is required for create")?;
        return Ok(CommitRequest::create(args.log_id, log_type, method, payload));
    }

    let current = ledger.get(&args.log_id)?;
    let log_type = args.log_type.unwrap_or(current.log_type);
    let method = args.detection_method.unwrap_or(current.detection_method);
    Ok(if args.kind == CommitKind::Update {
        CommitRequest::update(args.log_id, log_type, method, payload)
    } else {
        CommitRequest::delete(args.log_id, log_type, method)
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use serde_json::json;

    use super::*;

    async fn open_ledger(dir: &Path) -> LedgerService {
        LedgerService::open(LedgerConfig::persistent(dir)).await.unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tlg").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn data_dir_flag_overrides_default() {
        let cli = parse(&["stats", "--data-dir", "/tmp/tlg"]);
        let config = resolve_config(None, &cli).unwrap();
        assert_eq!(config.ledger.data_dir.as_deref(), Some(Path::new("/tmp/tlg")));
    }

    #[test]
    fn config_file_is_loaded_then_overridden() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tlg.toml");
        std::fs::write(
            &path,
            "bind_addr = \"0.0.0.0:4000\"\n[ledger]\ndata_dir = \"/srv/a\"\n",
        )
        .unwrap();

        let cli = parse(&["stats"]);
        let config = resolve_config(Some(&path), &cli).unwrap();
        assert_eq!(config.bind_addr.port(), 4000);
        assert_eq!(config.ledger.data_dir.as_deref(), Some(Path::new("/srv/a")));

        let cli = parse(&["stats", "--data-dir", "/srv/b"]);
        let config = resolve_config(Some(&path), &cli).unwrap();
        assert_eq!(config.ledger.data_dir.as_deref(), Some(Path::new("/srv/b")));
    }

    #[tokio::test]
    async fn offline_commands_need_a_data_dir() {
        let err = open_offline(&LedgerConfig::in_memory()).await.unwrap_err();
        assert!(err.to_string().contains("data directory"));
    }

    #[tokio::test]
    async fn commit_lifecycle_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_ledger(dir.path()).await;

        let create = parse(&[
            "commit",
            "NT-1",
            "--log-type",
            "network_threat",
            "-m",
            "network_ai_service",
            "--payload",
            r#"{"severity":"high","type":"port_scan"}"#,
        ]);
        execute(&ledger, create.command, OutputFormat::Json).await.unwrap();

        let update = parse(&["commit", "NT-1", "--type", "update", "--payload", r#"{"severity":"low"}"#]);
        execute(&ledger, update.command, OutputFormat::Text).await.unwrap();

        let record = ledger.get("NT-1").unwrap();
        assert_eq!(record.detection_method, "network_ai_service");
        assert_eq!(record.payload, json!({"severity": "low"}));

        let delete = parse(&["commit", "NT-1", "--type", "delete"]);
        execute(&ledger, delete.command, OutputFormat::Text).await.unwrap();
        assert_eq!(ledger.get("NT-1").unwrap().status, RecordStatus::Deleted);
        assert_eq!(ledger.history("NT-1").unwrap().len(), 3);

        let audit = parse(&["audit"]);
        execute(&ledger, audit.command, OutputFormat::Text).await.unwrap();
    }

    #[tokio::test]
    async fn create_requires_log_type() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_ledger(dir.path()).await;
        let cli = parse(&["commit", "NT-1", "-m", "m", "--payload", "{}"]);
        let err = execute(&ledger, cli.command, OutputFormat::Text).await.unwrap_err();
        assert!(err.to_string().contains("--log-type"));
    }

    #[tokio::test]
    async fn read_commands_report_missing_records() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = open_ledger(dir.path()).await;
        for args in [&["show", "nope"][..], &["history", "nope"][..]] {
            let cli = parse(args);
            assert!(execute(&ledger, cli.command, OutputFormat::Text).await.is_err());
        }
        let cli = parse(&["verify", "nope", "--data", "{}"]);
        assert!(execute(&ledger, cli.command, OutputFormat::Text).await.is_err());
        let cli = parse(&["verify", "nope", "--data", "not json"]);
        assert!(execute(&ledger, cli.command, OutputFormat::Text).await.is_err());
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = open_ledger(dir.path()).await;
            let cli = parse(&[
                "commit", "SE-1", "--log-type", "security_event", "-m", "ids", "--payload",
                r#"{"severity":"medium"}"#,
            ]);
            execute(&ledger, cli.command, OutputFormat::Text).await.unwrap();
            ledger.shutdown().await.unwrap();
        }
        let ledger = open_ledger(dir.path()).await;
        let cli = parse(&["list", "--severity", "MEDIUM"]);
        execute(&ledger, cli.command, OutputFormat::Json).await.unwrap();
        let stats = ledger.statistics().unwrap();
        assert_eq!(stats.block_height, 1);
        assert_eq!(stats.by_severity.get("medium"), Some(&1));
    }
}
