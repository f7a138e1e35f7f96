//! Offline administration CLI.
//!
//! Operates directly on the SQLite store, bypassing the HTTP surface:
//! issue and revoke API keys, list them, and run log cleanup.

use std::collections::VecDeque;
use std::sync::Arc;

use blackgate::auth::{generate_key, ApiKeyRecord, Permissions};
use blackgate::infra::{OperationLogger, SqliteKv};

fn print_help() {
    eprintln!(
        "\
blackgate-admin

USAGE:
  blackgate-admin <command> [options]

COMMANDS:
  migrate        Initialize the database schema
  issue-key      Create an API key
  revoke-key     Delete an API key
  list-keys      List all API keys
  cleanup-logs   Delete old (or all) log entries

COMMON OPTIONS:
  --db <path>                 (defaults to env BLACKGATE_DB, then blackgate.db)

issue-key OPTIONS:
  --key <string>              (optional) Key string; generated if omitted
  --note <string>             (optional) Human note
  --permissions <p,p,...>     (optional) Any of: read, list, add, delete
  --expiry <rfc3339>          (optional) Expiry timestamp

revoke-key OPTIONS:
  --key <string>              (required)

cleanup-logs OPTIONS:
  --retention-days <n>        (default: 30)
  --clear-all                 Delete every entry regardless of age
"
    );
}

struct Args {
    values: std::collections::HashMap<String, String>,
    flags: std::collections::HashSet<String>,
}

impl Args {
    fn parse(mut raw: VecDeque<String>) -> Result<Self, String> {
        let mut values = std::collections::HashMap::new();
        let mut flags = std::collections::HashSet::new();

        while let Some(arg) = raw.pop_front() {
            let Some(name) = arg.strip_prefix("--") else {
                return Err(format!("unexpected argument: {arg}"));
            };
            match raw.front() {
                Some(next) if !next.starts_with("--") => {
                    values.insert(name.to_string(), raw.pop_front().unwrap_or_default());
                }
                _ => {
                    flags.insert(name.to_string());
                }
            }
        }

        Ok(Self { values, flags })
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }
}

async fn open_store(args: &Args) -> Result<SqliteKv, String> {
    let path = args
        .get("db")
        .map(str::to_string)
        .or_else(|| std::env::var("BLACKGATE_DB").ok())
        .unwrap_or_else(|| "blackgate.db".to_string());
    SqliteKv::open(&path)
        .await
        .map_err(|e| format!("failed to open store at {path}: {e}"))
}

fn parse_permissions(value: &str) -> Result<Permissions, String> {
    let mut permissions = Permissions::default();
    for name in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match name {
            "read" => permissions.read = true,
            "list" => permissions.list = true,
            "add" => permissions.add = true,
            "delete" => permissions.delete = true,
            other => return Err(format!("unknown permission: {other}")),
        }
    }
    Ok(permissions)
}

async fn cmd_issue_key(args: &Args) -> Result<(), String> {
    let store = Arc::new(open_store(args).await?);
    let keys = blackgate::auth::ApiKeyStore::new(store);

    let key = args
        .get("key")
        .map(str::to_string)
        .unwrap_or_else(generate_key);

    let mut record = ApiKeyRecord::new(key.clone());
    record.note = args.get("note").unwrap_or("").to_string();
    record.created_by = Some("admin-cli".to_string());

    if let Some(value) = args.get("permissions") {
        record.permissions = Some(parse_permissions(value)?);
    }
    if let Some(expiry) = args.get("expiry") {
        let parsed = chrono::DateTime::parse_from_rfc3339(expiry)
            .map_err(|e| format!("invalid --expiry timestamp: {e}"))?;
        record.expiry_date = Some(parsed.with_timezone(&chrono::Utc));
    }

    keys.put(&record).await.map_err(|e| e.to_string())?;
    println!("issued key: {key}");
    Ok(())
}

async fn cmd_revoke_key(args: &Args) -> Result<(), String> {
    let key = args.get("key").ok_or("missing required --key")?;
    let store = Arc::new(open_store(args).await?);
    let keys = blackgate::auth::ApiKeyStore::new(store);

    keys.delete(key).await.map_err(|e| e.to_string())?;
    println!("revoked key: {key}");
    Ok(())
}

async fn cmd_list_keys(args: &Args) -> Result<(), String> {
    let store = Arc::new(open_store(args).await?);
    let keys = blackgate::auth::ApiKeyStore::new(store);

    let records = keys.list().await.map_err(|e| e.to_string())?;
    if records.is_empty() {
        println!("no API keys");
        return Ok(());
    }
    for record in records {
        let perms = record
            .permissions
            .map(|p| {
                let mut names = Vec::new();
                if p.read {
                    names.push("read");
                }
                if p.list {
                    names.push("list");
                }
                if p.add {
                    names.push("add");
                }
                if p.delete {
                    names.push("delete");
                }
                names.join(",")
            })
            .unwrap_or_else(|| "-".to_string());
        let expiry = record
            .expiry_date
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  perms=[{}]  expires={}  note={:?}",
            record.key, perms, expiry, record.note
        );
    }
    Ok(())
}

async fn cmd_cleanup_logs(args: &Args) -> Result<(), String> {
    let store = Arc::new(open_store(args).await?);
    let logger = OperationLogger::new(store);

    let deleted = if args.has_flag("clear-all") {
        logger.clear_all().await.map_err(|e| e.to_string())?
    } else {
        let retention_days = args
            .get("retention-days")
            .map(|v| v.parse::<i64>().map_err(|e| format!("invalid --retention-days: {e}")))
            .transpose()?
            .unwrap_or(30);
        logger.sweep(retention_days).await.map_err(|e| e.to_string())?
    };

    println!("deleted {deleted} log entries");
    Ok(())
}

async fn cmd_migrate(args: &Args) -> Result<(), String> {
    let store = open_store(args).await?;
    store.initialize().await.map_err(|e| e.to_string())?;
    println!("schema ready");
    Ok(())
}

#[tokio::main]
async fn main() {
    let mut raw: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = raw.pop_front() else {
        print_help();
        std::process::exit(2);
    };

    let args = match Args::parse(raw) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}");
            print_help();
            std::process::exit(2);
        }
    };

    let result = match command.as_str() {
        "migrate" => cmd_migrate(&args).await,
        "issue-key" => cmd_issue_key(&args).await,
        "revoke-key" => cmd_revoke_key(&args).await,
        "list-keys" => cmd_list_keys(&args).await,
        "cleanup-logs" => cmd_cleanup_logs(&args).await,
        "help" | "--help" | "-h" => {
            print_help();
            return;
        }
        other => {
            eprintln!("unknown command: {other}");
            print_help();
            std::process::exit(2);
        }
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
