//! Colored user-facing messages
//!
//! These go to stderr and bypass the logger, so users see them without
//! timestamps or module names even at the default log level.

use owo_colors::OwoColorize;

/// Yellow message surrounded by blank lines
///
/// # Example
/// ```ignore
/// output::warn("Collection 'foo' is not in the local corpus");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

pub fn info(message: &str) {
    eprintln!("\n{}\n", message);
}

/// Green confirmation for a finished build, sync or clear
pub fn success(message: &str) {
    eprintln!("{}", message.green());
}

/// Icon sets the corpus loader rejected, one per line with the reason
pub fn skipped_collections(skipped: &[(String, String)]) {
    if skipped.is_empty() {
        return;
    }
    eprintln!(
        "\n{}",
        format!("{} collection(s) skipped while loading the corpus:", skipped.len()).yellow()
    );
    for (prefix, reason) in skipped {
        eprintln!("  {}  {}", prefix.bold(), reason.dimmed());
    }
    eprintln!();
}
