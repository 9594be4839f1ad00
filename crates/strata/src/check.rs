// SPDX-FileCopyrightText: 2026 Strata Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `strata check` command implementation.
//!
//! Opens the configured database, runs a trivial query, closes it again, and
//! reports whether the connection emitted the expected lifecycle events.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use strata_config::model::DatabaseConfig;
use strata_core::{Event, StrataError};
use strata_storage::DatabaseBuilder;

/// Status of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }

    fn from_outcome(name: &str, outcome: Result<String, StrataError>, start: Instant) -> Self {
        match outcome {
            Ok(message) => Self::new(name, CheckStatus::Pass, message, start),
            Err(e) => Self::new(name, CheckStatus::Fail, describe(&e), start),
        }
    }
}

fn describe(err: &StrataError) -> String {
    format!("{err} (code {})", err.code())
}

/// Run the `strata check` command.
///
/// Fails when any check fails; warnings only get printed.
pub async fn run_check(config: &DatabaseConfig, plain: bool) -> Result<(), StrataError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = collect_checks(config).await;
    print_results(&results, use_color);

    let failed = results
        .iter()
        .filter(|r| r.status == CheckStatus::Fail)
        .count();
    if failed > 0 {
        return Err(StrataError::Internal(format!("{failed} check(s) failed")));
    }
    Ok(())
}

/// Open, query, and close the database, recording each step.
///
/// Stops after the open when it fails: nothing else can succeed afterwards.
pub async fn collect_checks(config: &DatabaseConfig) -> Vec<CheckResult> {
    let mut results = Vec::new();

    let start = Instant::now();
    let db = match DatabaseBuilder::from_config(config).connect().await {
        Ok(db) => {
            results.push(CheckResult::new(
                "Open",
                CheckStatus::Pass,
                format!("{} {:?}", db.filename(), db.mode()),
                start,
            ));
            db
        }
        Err(e) => {
            results.push(CheckResult::new("Open", CheckStatus::Fail, describe(&e), start));
            return results;
        }
    };
    let mut events = db.subscribe();

    let start = Instant::now();
    let outcome = db.execute_batch("SELECT 1").await.map(|()| "SELECT 1".to_string());
    results.push(CheckResult::from_outcome("Query", outcome, start));

    let start = Instant::now();
    let outcome = db.close().await.map(|()| "closed".to_string());
    results.push(CheckResult::from_outcome("Close", outcome, start));

    // The close event is sent in the same loop step that completes the close,
    // so once a later snapshot answers every event is in the channel.
    let start = Instant::now();
    let _ = db.snapshot().await;
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    results.push(check_events(&seen, start));

    results
}

fn check_events(seen: &[Event], start: Instant) -> CheckResult {
    if seen == [Event::Open, Event::Close] {
        CheckResult::new("Events", CheckStatus::Pass, "open, close", start)
    } else {
        CheckResult::new(
            "Events",
            CheckStatus::Warn,
            format!("unexpected sequence: {seen:?}"),
            start,
        )
    }
}

fn print_results(results: &[CheckResult], use_color: bool) {
    use colored::Colorize;

    println!();
    println!("  strata check");
    println!("  {}", "-".repeat(50));

    let mut issues = 0;
    for result in results {
        let duration_ms = result.duration.as_millis();
        let (symbol, message) = match (&result.status, use_color) {
            (CheckStatus::Pass, true) => ("✓".green().to_string(), result.message.normal()),
            (CheckStatus::Warn, true) => ("!".yellow().to_string(), result.message.yellow()),
            (CheckStatus::Fail, true) => ("✗".red().to_string(), result.message.red()),
            (CheckStatus::Pass, false) => ("[OK]  ".to_string(), result.message.normal()),
            (CheckStatus::Warn, false) => ("[WARN]".to_string(), result.message.normal()),
            (CheckStatus::Fail, false) => ("[FAIL]".to_string(), result.message.normal()),
        };
        if result.status != CheckStatus::Pass {
            issues += 1;
        }
        println!(
            "    {symbol} {:<10} {message} ({duration_ms}ms)",
            result.name
        );
    }

    println!();
    match issues {
        0 => println!("  All checks passed."),
        1 => println!("  1 issue found."),
        n => println!("  {n} issues found."),
    }
    println!();
}
