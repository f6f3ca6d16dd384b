//! Maps catalog names to file names.
//!
//! The mapping is a pure function of the name so a rerun finds the files a
//! previous run wrote. Names that only differ in characters the sanitiser drops
//! or folds together (`A(B)` and `AB`, `A B` and `A-B`) end up on the same path;
//! [`crate::catalog::Catalog::collisions`] reports those.

use std::path::{Path, PathBuf};

use crate::constants::{GENERATE_FILE_PREFIX, SEARCH_FILE_PREFIX};

/// Used when nothing survives sanitising, eg a name made only of brackets.
const EMPTY_NAME: &str = "unnamed";

/// Makes a catalog name safe to use as (part of) a file name.
///
/// `/` and other path separators become `-`, `+` becomes `plus`, parentheses
/// are dropped, whitespace and en dashes become `-`. Runs of `-` are collapsed
/// and leading/trailing ones trimmed.
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '(' | ')' => {}
            '+' => out.push_str("plus"),
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\u{2013}' => out.push('-'),
            c if c.is_whitespace() || c.is_control() => out.push('-'),
            c => out.push(c),
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() || trimmed.chars().all(|c| c == '.') {
        EMPTY_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// How a catalog name turns into a file name.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NamingScheme {
    /// Prepended to the sanitised name
    pub prefix: String,
    /// File extension, without the dot
    pub extension: String,
    /// Lowercase the sanitised name
    pub lowercase: bool,
}

impl NamingScheme {
    /// `Vici Peptides Site-BPC-157.jpg` style names, used for searched images.
    pub fn search() -> Self {
        Self {
            prefix: SEARCH_FILE_PREFIX.to_string(),
            extension: "jpg".to_string(),
            lowercase: false,
        }
    }

    /// `vici-bpc-157.png` style names, used for generated images.
    pub fn generate() -> Self {
        Self {
            prefix: GENERATE_FILE_PREFIX.to_string(),
            extension: "png".to_string(),
            lowercase: true,
        }
    }

    /// File name for a catalog entry.
    pub fn file_name(&self, name: &str) -> String {
        let mut stem = sanitize_name(name);
        if self.lowercase {
            stem = stem.to_lowercase();
        }
        format!("{}{}.{}", self.prefix, stem, self.extension)
    }

    /// Full target path for a catalog entry under `dir`.
    pub fn target_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(self.file_name(name))
    }
}
