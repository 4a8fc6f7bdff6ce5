//! Terminal rendering of a run.

use colored::{ColoredString, Colorize};
use quickmark::progress::{self, Outcome, ProgressView, Tone};
use quickmark::StatusEvent;

const BAR_WIDTH: usize = 30;

fn marker(tone: Tone) -> ColoredString {
    match tone {
        Tone::Neutral => "…".dimmed(),
        Tone::Info => "ℹ".blue(),
        Tone::Success => "✓".green(),
        Tone::Error => "✗".red(),
    }
}

fn paint(text: &str, tone: Tone) -> ColoredString {
    match tone {
        Tone::Neutral => text.dimmed(),
        Tone::Info => text.blue(),
        Tone::Success => text.green(),
        Tone::Error => text.red(),
    }
}

/// Print log entries from `shown` on; returns the new count of printed entries.
pub fn events_since(log: &[StatusEvent], shown: usize) -> usize {
    for event in log.iter().skip(shown) {
        println!(
            "  {} {}",
            marker(Tone::of(event.tag())),
            progress::history_text(event)
        );
    }
    log.len()
}

pub fn progress_bar(view: &ProgressView) {
    let filled = ((view.percent / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    println!(
        "[{}{}] {} {}",
        paint(&"█".repeat(filled), view.tone),
        "░".repeat(BAR_WIDTH - filled).dimmed(),
        view.label().bold(),
        view.headline
    );
}

pub fn outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Success(message) => println!("{} {}", "✓".green().bold(), message.green().bold()),
        Outcome::Error(message) => eprintln!("{} {}", "✗".red().bold(), message.red().bold()),
    }
}

pub fn ready(account_email: &str) {
    println!(
        "{} Using saved credentials for {}",
        "→".cyan(),
        account_email.bold()
    );
}

pub fn validation_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

pub fn interrupted() {
    eprintln!("{} Run interrupted, subscription closed", "⚠".yellow());
}

pub fn forgotten(existed: bool) {
    if existed {
        println!("{} Saved credentials removed", "✓".green());
    } else {
        println!("{} No saved credentials", "ℹ".blue());
    }
}
