//! CLI Output Formatting Module
//! Colorized console output for the release checker

use colored::Colorize;

use crate::engine::verify::Verdict;

pub struct CliFormatter;

impl CliFormatter {
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    /// Indented detail line under a result
    pub fn item(text: &str) {
        println!("    {} {}", "•".bright_black(), text);
    }

    pub fn table_header(columns: &[&str]) {
        let header = columns
            .iter()
            .map(|c| c.bright_white().bold().to_string())
            .collect::<Vec<_>>()
            .join(" │ ");
        println!("  {}", header);
        let width = columns.iter().map(|c| c.len() + 3).sum::<usize>();
        println!("  {}", "─".repeat(width).bright_black());
    }

    pub fn table_row(values: &[&str]) {
        println!("  {}", values.join(" │ "));
    }

    pub fn blank() {
        println!();
    }
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// First 16 hex digits, enough to eyeball a digest
pub fn short_hash(sha256: &str) -> &str {
    sha256.get(..16).unwrap_or(sha256)
}

/// Detail lines describing a failed verdict, empty for a match
pub fn verdict_details(verdict: &Verdict) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(size) = verdict.size_mismatch() {
        lines.push(format!(
            "size: expected {} bytes, actual {} bytes (diff {} bytes, {:.4}%)",
            size.expected, size.actual, size.diff_bytes, size.diff_percent
        ));
    }
    if let Some(hash) = verdict.hash_mismatch() {
        lines.push(format!("sha256 expected: {}", hash.expected));
        lines.push(format!("sha256 actual:   {}", hash.actual));
    }
    lines
}
