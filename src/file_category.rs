//! File categorization by extension.
//!
//! A [`CategoryTable`] is an ordered list of category rules. Classification walks the
//! rules in order and returns the first category whose extension set contains the
//! file's extension, falling back to [`OTHERS`].
//!
//! # Examples
//!
//! ```
//! use tidywatch::file_category::{CategoryTable, OTHERS};
//!
//! let table = CategoryTable::default();
//! assert_eq!(table.classify("photo.JPG"), "Images");
//! assert_eq!(table.classify("notes.txt"), "Documents");
//! assert_eq!(table.classify("README"), OTHERS);
//! ```
use serde::{Deserialize, Serialize};

/// Catch-all category for files no rule matches.
pub const OTHERS: &str = "Others";

/// Category used for files whose content was already seen in this session.
pub const DUPLICATES: &str = "Duplicates";

/// A named category together with the extensions that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category name, also used as the destination subdirectory name.
    pub name: String,
    /// Extensions including the leading dot (e.g. `.jpg`).
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl CategoryRule {
    /// Creates a rule, normalizing every extension.
    pub fn new<S: AsRef<str>>(name: &str, extensions: &[S]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions
                .iter()
                .map(|ext| normalize_extension(ext.as_ref()))
                .collect(),
        }
    }

    fn contains(&self, extension: &str) -> bool {
        self.extensions.iter().any(|ext| ext == extension)
    }
}

/// Ordered mapping from category name to extension set.
///
/// Overlapping extensions are tolerated: the first rule in table order wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    rules: Vec<CategoryRule>,
}

impl CategoryTable {
    /// Builds a table from rules, keeping their order.
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let rules = rules
            .into_iter()
            .map(|rule| CategoryRule {
                extensions: rule
                    .extensions
                    .iter()
                    .map(|ext| normalize_extension(ext))
                    .collect(),
                name: rule.name,
            })
            .collect();
        Self { rules }
    }

    /// Adds an extension to a category, appending a new rule if the category is unknown.
    pub fn add_extension_mapping(&mut self, category: &str, ext: &str) {
        let ext = normalize_extension(ext);
        match self.rules.iter_mut().find(|rule| rule.name == category) {
            Some(rule) => {
                if !rule.contains(&ext) {
                    rule.extensions.push(ext);
                }
            }
            None => self.rules.push(CategoryRule {
                name: category.to_string(),
                extensions: vec![ext],
            }),
        }
    }

    /// Returns the category for a file name.
    ///
    /// Files without an extension always land in [`OTHERS`].
    pub fn classify(&self, file_name: &str) -> &str {
        let Some(extension) = extension_of(file_name) else {
            return OTHERS;
        };

        self.rules
            .iter()
            .find(|rule| rule.contains(&extension))
            .map(|rule| rule.name.as_str())
            .unwrap_or(OTHERS)
    }

    /// The rules in classification order.
    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Category names in classification order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.name.as_str())
    }
}

impl Default for CategoryTable {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

/// The built-in category rules.
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new(
            "Images",
            &[
                ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg", ".webp", ".ico", ".tiff",
            ],
        ),
        CategoryRule::new(
            "Documents",
            &[
                ".pdf", ".doc", ".docx", ".txt", ".rtf", ".odt", ".xls", ".xlsx", ".ppt", ".pptx",
            ],
        ),
        CategoryRule::new(
            "Videos",
            &[".mp4", ".avi", ".mkv", ".mov", ".wmv", ".flv", ".webm", ".m4v"],
        ),
        CategoryRule::new(
            "Audio",
            &[".mp3", ".wav", ".flac", ".aac", ".ogg", ".wma", ".m4a"],
        ),
        CategoryRule::new(
            "Archives",
            &[".zip", ".rar", ".7z", ".tar", ".gz", ".bz2", ".xz"],
        ),
        CategoryRule::new(
            "Code",
            &[
                ".py", ".js", ".html", ".css", ".java", ".cpp", ".c", ".h", ".json", ".xml", ".sql",
            ],
        ),
        CategoryRule::new(
            "Executables",
            &[".exe", ".msi", ".app", ".dmg", ".deb", ".rpm"],
        ),
        CategoryRule::new::<&str>(OTHERS, &[]),
    ]
}

/// Extracts the lowercase extension of a file name, including the leading dot.
///
/// A leading dot alone (`.bashrc`) or a trailing dot (`file.`) is not an extension.
///
/// ```
/// use tidywatch::file_category::extension_of;
///
/// assert_eq!(extension_of("Report.PDF").as_deref(), Some(".pdf"));
/// assert_eq!(extension_of("archive.tar.gz").as_deref(), Some(".gz"));
/// assert_eq!(extension_of("Makefile"), None);
/// ```
pub fn extension_of(file_name: &str) -> Option<String> {
    let (_, ext) = split_file_name(file_name);
    if ext.len() <= 1 {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Splits a file name into base name and extension (with dot).
///
/// `archive.tar.gz` splits into `archive.tar` and `.gz`; names whose only dot is the
/// first character have no extension.
pub fn split_file_name(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && !file_name[..idx].chars().all(|c| c == '.') => {
            file_name.split_at(idx)
        }
        _ => (file_name, ""),
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.is_empty() || ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}
