//! Task status lines and service color management
//!
//! One line is written to stderr per task transition (start, success,
//! failure or skip), keyed by the target service and colored consistently per
//! service name. The same transitions are emitted as `tracing` events for
//! structured consumers.

use std::time::Duration;

use colored::*;
use tracing::{error, info, warn};

/// Get a consistent color for a service name
pub fn service_color(service_name: &str) -> Color {
    // Use a simple hash of the name bytes for consistent colors
    let hash = service_name
        .bytes()
        .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));

    // Jewel tones that read as labels rather than log levels
    let colors = [
        Color::TrueColor {
            r: 147,
            g: 112,
            b: 219,
        },
        Color::TrueColor {
            r: 64,
            g: 224,
            b: 208,
        },
        Color::TrueColor {
            r: 255,
            g: 140,
            b: 0,
        },
        Color::TrueColor {
            r: 199,
            g: 21,
            b: 133,
        },
        Color::TrueColor {
            r: 72,
            g: 209,
            b: 204,
        },
        Color::TrueColor {
            r: 138,
            g: 43,
            b: 226,
        },
    ];

    colors[(hash % colors.len() as u64) as usize]
}

/// Human readable duration: `850ms`, `12.4s`, `3m 05s`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1_000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
pub fn elapsed_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn service_label(service: &str) -> ColoredString {
    service.color(service_color(service)).bold()
}

pub fn started_line(command: &str, service: &str) -> String {
    format!(
        "{} {} {}",
        "▶".bright_black(),
        service_label(service),
        format!("{} started", command).bright_black()
    )
}

pub fn succeeded_line(command: &str, service: &str, elapsed: Duration) -> String {
    format!(
        "{} {} {}",
        "✓".green().bold(),
        service_label(service),
        format!("{} succeeded in {}", command, format_duration(elapsed)).green()
    )
}

pub fn failed_line(
    command: &str,
    service: &str,
    elapsed: Duration,
    err: &dyn std::error::Error,
) -> String {
    format!(
        "{} {} {}",
        "✗".red().bold(),
        service_label(service),
        format!("{} failed after {}: {}", command, format_duration(elapsed), err).red()
    )
}

pub fn skipped_line(command: &str, service: &str, dependency: &str) -> String {
    format!(
        "{} {} {}",
        "-".yellow().bold(),
        service_label(service),
        format!("{} skipped, dependency {} did not succeed", command, dependency).yellow()
    )
}

// Status lines go to stderr so stdout stays free for command output such as JSON.

pub fn task_started(command: &str, service: &str) {
    info!(command, service, "task started");
    eprintln!("{}", started_line(command, service));
}

pub fn task_succeeded(command: &str, service: &str, elapsed: Duration) {
    info!(command, service, elapsed_ms = elapsed_millis(elapsed), "task succeeded");
    eprintln!("{}", succeeded_line(command, service, elapsed));
}

pub fn task_failed(command: &str, service: &str, elapsed: Duration, err: &dyn std::error::Error) {
    error!(command, service, elapsed_ms = elapsed_millis(elapsed), error = %err, "task failed");
    eprintln!("{}", failed_line(command, service, elapsed, err));
}

pub fn task_skipped(command: &str, service: &str, dependency: &str) {
    warn!(command, service, dependency, "task skipped");
    eprintln!("{}", skipped_line(command, service, dependency));
}
