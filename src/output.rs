//! Output formatting and styling module.
//!
//! Provides a centralized interface for all CLI output, including colored output,
//! progress tracking, and formatted tables.

use crate::file_organizer::OrganizeObserver;
use crate::history::MoveRecord;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;

/// Manages all CLI output with consistent styling and formatting.
///
/// This struct provides methods for:
/// - Success messages (green with ✓)
/// - Error messages (red with ✗)
/// - Warning messages (yellow with ⚠)
/// - Info messages (cyan)
/// - Progress bars for operations
/// - Summary tables with statistics
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidywatch::output::OutputFormatter;
    /// OutputFormatter::success("Organized: photo.jpg");
    /// ```
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    pub fn plain(message: &str) {
        println!("{}", message);
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Creates a progress bar for a batch of `total` files.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidywatch::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("█▓░"));
        }
        pb
    }

    /// Prints per-category counts, largest first, followed by the total.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use tidywatch::output::OutputFormatter;
    /// use std::collections::BTreeMap;
    ///
    /// let mut counts = BTreeMap::new();
    /// counts.insert("Documents".to_string(), 15);
    /// counts.insert("Images".to_string(), 8);
    /// OutputFormatter::summary_table(&counts);
    /// ```
    pub fn summary_table(category_counts: &BTreeMap<String, u64>) {
        Self::header("SUMMARY");

        if category_counts.is_empty() {
            println!("No files organized.");
            return;
        }

        let rows = summary_rows(category_counts);
        let total: u64 = category_counts.values().sum();

        let max_category_len = rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in &rows {
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                file_word(*count),
                width = max_category_len
            );
        }

        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total.to_string().green().bold(),
            file_word(total),
            width = max_category_len
        );
    }

    /// Prints recorded moves, newest first.
    pub fn history_table<'a>(records: impl IntoIterator<Item = &'a MoveRecord>) {
        for record in records {
            println!(
                "{}  {:<12} {} -> {}",
                record
                    .timestamp
                    .with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
                    .dimmed(),
                record.category.cyan(),
                record.source.display(),
                record.destination.display()
            );
        }
    }

    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}

/// Category counts ordered by count descending, then by name.
pub fn summary_rows(category_counts: &BTreeMap<String, u64>) -> Vec<(&str, u64)> {
    let mut rows: Vec<_> = category_counts
        .iter()
        .map(|(name, count)| (name.as_str(), *count))
        .collect();
    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    rows
}

fn file_word(count: u64) -> &'static str {
    if count == 1 { "file" } else { "files" }
}

/// Prints organize results to the terminal, optionally advancing a progress bar.
#[derive(Default)]
pub struct ConsoleObserver {
    progress: Option<ProgressBar>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes messages through `progress` so they don't tear the bar.
    pub fn with_progress(progress: ProgressBar) -> Self {
        Self {
            progress: Some(progress),
        }
    }
}

impl OrganizeObserver for ConsoleObserver {
    fn on_organized(&self, message: &str) {
        match &self.progress {
            Some(pb) => {
                pb.println(format!("{} {}", "✓".green(), message));
                pb.inc(1);
            }
            None => OutputFormatter::success(message),
        }
    }

    fn on_error(&self, message: &str) {
        match &self.progress {
            Some(pb) => {
                pb.println(format!("{} {}", "✗".red(), message));
                pb.inc(1);
            }
            None => OutputFormatter::error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_rows_sorted_by_count() {
        let mut counts = BTreeMap::new();
        counts.insert("Audio".to_string(), 2);
        counts.insert("Images".to_string(), 5);
        counts.insert("Code".to_string(), 2);

        assert_eq!(
            summary_rows(&counts),
            vec![("Images", 5), ("Audio", 2), ("Code", 2)]
        );
    }

    #[test]
    fn test_file_word() {
        assert_eq!(file_word(1), "file");
        assert_eq!(file_word(0), "files");
        assert_eq!(file_word(3), "files");
    }

    #[test]
    fn test_observer_advances_progress() {
        let pb = ProgressBar::hidden();
        pb.set_length(2);
        let observer = ConsoleObserver::with_progress(pb.clone());

        observer.on_organized("Organized: a.txt");
        observer.on_error("Failed to move b.txt");

        assert_eq!(pb.position(), 2);
    }
}
