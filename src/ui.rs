use colored::{ColoredString, Colorize};
use declarative::{Outcome, ResourceId};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Symbol for a resource outcome
pub fn outcome_symbol(outcome: &Outcome) -> ColoredString {
    match outcome {
        Outcome::Unchanged | Outcome::Idle => "·".dimmed(),
        Outcome::Changed { .. } | Outcome::Purged => "✓".green(),
        Outcome::Refreshed => "↻".green(),
        Outcome::Pending { .. } => "~".yellow(),
        Outcome::WouldRefresh => "↻".yellow(),
        Outcome::WouldPurge => "-".red(),
        Outcome::Failed { .. } | Outcome::PurgeFailed { .. } => "✗".red(),
        Outcome::Blocked { .. } => "⊘".yellow(),
        Outcome::Cancelled => "⊘".dimmed(),
    }
}

/// One line describing a resource outcome
pub fn outcome_line(id: &ResourceId, outcome: &Outcome) -> String {
    let detail = match outcome {
        Outcome::Failed { cause } | Outcome::PurgeFailed { cause } => {
            format!(" ({})", cause.dimmed())
        }
        Outcome::Blocked { by } => format!(" (by {by})"),
        _ => String::new(),
    };
    format!(
        "{} {} {}{}",
        outcome_symbol(outcome),
        id,
        outcome.label().dimmed(),
        detail
    )
}
