//! Database maintenance commands
//!
//! Operates directly on the configured database file; safe to run alongside
//! a live server since SQLite serializes writers.

use anyhow::{Context, Result};
use colored::Colorize;
use logvault::config;
use logvault::logs::LogDb;
use std::io::{self, BufRead, Write};
use std::path::Path;

pub async fn stats(config_path: &Path) -> Result<()> {
    let db = open(config_path).await?;
    let stats = db.stats().await?;
    let file_size = db
        .path()
        .and_then(|path| std::fs::metadata(path).ok())
        .map(|meta| meta.len());
    db.close().await;

    println!("{}", "Log Database Statistics".bold().underline());
    println!();
    println!("{:<30} {:>15}", "Logs:", format_number(stats.log_count));
    println!(
        "{:<30} {:>15}",
        "Resource Attribute Sets:",
        format_number(stats.resource_attributes_count)
    );
    if let Some(size) = file_size {
        println!("{:<30} {:>15}", "File Size:", format_bytes(size));
    }
    println!();

    match (stats.oldest, stats.newest) {
        (Some(oldest), Some(newest)) => {
            println!("{}", "Time Range (observed)".bold());
            println!("  {:<28} {}", "Oldest:", oldest.to_rfc3339());
            println!("  {:<28} {}", "Newest:", newest.to_rfc3339());
        }
        _ => println!("{}", "Database is empty".dimmed()),
    }

    Ok(())
}

pub async fn vacuum(config_path: &Path) -> Result<()> {
    let db = open(config_path).await?;

    println!("{}", "Vacuuming database...".yellow());
    db.vacuum().await?;
    db.close().await;
    println!("{}", "✓ Vacuum complete".green());

    Ok(())
}

pub async fn clear(config_path: &Path, yes: bool) -> Result<()> {
    let db = open(config_path).await?;

    if !yes && !confirm("Delete every stored log?")? {
        println!("Aborted");
        return Ok(());
    }

    let deleted = db.clear().await?;
    db.close().await;
    println!(
        "{} {}",
        "✓ Deleted".green(),
        format!("{} logs", format_number(deleted as i64)).cyan()
    );

    Ok(())
}

async fn open(config_path: &Path) -> Result<LogDb> {
    let cfg = config::load_config(config_path)?;
    LogDb::open(&cfg.database.path, cfg.database.max_connections)
        .await
        .with_context(|| format!("Failed to open {}", cfg.database.path.display()))
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Format number with thousands separator
fn format_number(n: i64) -> String {
    let s = n.unsigned_abs().to_string();
    let mut result = String::new();

    for (count, ch) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }
    if n < 0 {
        result.push('-');
    }

    result.chars().rev().collect()
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(-4200), "-4,200");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
