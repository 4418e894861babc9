use std::io::{self, BufRead, Write};
use std::sync::Arc;

use crate::context::ProxyContext;
use crate::export;

const HELP_TEXT: &str = "\
commands:
  <ordinal>         inspect the capture with that ordinal
  list, ls          list capture summaries
  clear             empty the capture buffer
  export            write all captures to the export directory
  export <ordinal>  write a single capture to the export directory
  help              print this message
  exit, quit        shut down the proxy";

/// Blocking line-oriented REPL on stdin/stdout, run on a `spawn_blocking`
/// task so it never steals the async runtime's worker threads.
pub async fn run(ctx: Arc<ProxyContext>) {
    let _ = tokio::task::spawn_blocking(move || repl(&ctx)).await;
}

fn repl(ctx: &ProxyContext) {
    println!("jojq proxy running on port {}", ctx.config.port);
    println!("type 'help' for commands");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        match command {
            "list" | "ls" => print_list(ctx),
            "clear" => {
                ctx.captures.clear();
                println!("capture buffer cleared");
            }
            "export" => export_all(ctx),
            "help" => println!("{HELP_TEXT}"),
            "exit" | "quit" => {
                println!("shutting down");
                std::process::exit(0);
            }
            other => match other.strip_prefix("export ") {
                Some(rest) => match rest.trim().parse::<u64>() {
                    Ok(ordinal) => export_one(ctx, ordinal),
                    Err(_) => println!("usage: export <ordinal>"),
                },
                None => match other.parse::<u64>() {
                    Ok(ordinal) => print_record(ctx, ordinal),
                    Err(_) => println!("unrecognized command, type 'help'"),
                },
            },
        }
        let _ = io::stdout().flush();
    }
}

fn print_list(ctx: &ProxyContext) {
    let records = ctx.captures.list();
    if records.is_empty() {
        println!("(no captures)");
        return;
    }
    for record in records {
        println!(
            "#{:<5} {:<6} {:<6} {}",
            record.ordinal, record.request.method, record.response.status_code, record.request.url
        );
    }
}

fn print_record(ctx: &ProxyContext, ordinal: u64) {
    match ctx.captures.get(ordinal) {
        Some(record) => match serde_json::to_string_pretty(&record) {
            Ok(json) => println!("{json}"),
            Err(e) => println!("failed to render capture: {e}"),
        },
        None => println!("no capture with ordinal {ordinal}"),
    }
}

fn export_all(ctx: &ProxyContext) {
    let records = ctx.captures.list();
    if records.is_empty() {
        println!("(no captures to export)");
        return;
    }
    let epoch_ms = epoch_millis();
    match export::export_all(&ctx.config.export_dir, &records, epoch_ms) {
        Ok(path) => println!("exported {} captures to {}", records.len(), path.display()),
        Err(e) => println!("export failed: {e}"),
    }
}

fn export_one(ctx: &ProxyContext, ordinal: u64) {
    let Some(record) = ctx.captures.get(ordinal) else {
        println!("no capture with ordinal {ordinal}");
        return;
    };
    let epoch_ms = epoch_millis();
    match export::export_record(&ctx.config.export_dir, &record, epoch_ms) {
        Ok(path) => println!("exported capture {ordinal} to {}", path.display()),
        Err(e) => println!("export failed: {e}"),
    }
}

fn epoch_millis() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}
