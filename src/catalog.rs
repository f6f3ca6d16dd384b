//! The list of items we want images for.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::PipelineError;
use crate::naming::NamingScheme;

/// One named item that needs an image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CatalogEntry {
    /// Display name, also the input to the file naming scheme
    pub name: String,
    /// Extra search queries, tried in order after the default one comes up empty
    pub queries: Vec<String>,
}

impl CatalogEntry {
    /// An entry with no alternate queries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queries: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        queries: Vec<String>,
    },
}

impl From<RawEntry> for CatalogEntry {
    fn from(raw: RawEntry) -> Self {
        match raw {
            RawEntry::Name(name) => CatalogEntry::new(name),
            RawEntry::Full { name, queries } => CatalogEntry { name, queries },
        }
    }
}

/// An ordered, fixed list of entries.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Builds a catalog, rejecting blank names.
    pub fn new(mut entries: Vec<CatalogEntry>) -> Result<Self, PipelineError> {
        for (index, entry) in entries.iter_mut().enumerate() {
            let trimmed = entry.name.trim();
            if trimmed.is_empty() {
                return Err(PipelineError::Catalog(format!(
                    "entry {} has an empty name",
                    index + 1
                )));
            }
            if trimmed.len() != entry.name.len() {
                entry.name = trimmed.to_string();
            }
        }
        Ok(Self { entries })
    }

    /// Shorthand for a catalog of plain names.
    pub fn from_names<I, S>(names: I) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(names.into_iter().map(CatalogEntry::new).collect())
    }

    /// The catalog shipped with the crate.
    pub fn bundled() -> Result<Self, PipelineError> {
        Self::from_json(include_str!(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/data/catalog.json"
        )))
    }

    /// Parses a JSON array of names or `{"name": .., "queries": [..]}` objects.
    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let parsed: Vec<RawEntry> = serde_json::from_str(raw)
            .map_err(|err| PipelineError::Catalog(format!("failed to parse JSON: {err}")))?;
        Self::new(parsed.into_iter().map(CatalogEntry::from).collect())
    }

    /// Parses one name per line, skipping blank lines and `#` comments.
    pub fn from_lines(raw: &str) -> Result<Self, PipelineError> {
        Self::from_names(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    /// Loads a catalog file, JSON when it looks like JSON and plain lines otherwise.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            PipelineError::Catalog(format!("failed to read {}: {err}", path.display()))
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            || raw.trim_start().starts_with('[');
        if is_json {
            Self::from_json(&raw)
        } else {
            Self::from_lines(&raw)
        }
    }

    /// Entries in catalog order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there's nothing to do.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// File names that more than one distinct entry maps to, with the names involved.
    ///
    /// Exact duplicate names aren't reported, the catalog is trusted to list each item once.
    pub fn collisions(&self, scheme: &NamingScheme) -> BTreeMap<String, Vec<String>> {
        let mut by_file: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for entry in &self.entries {
            let names = by_file.entry(scheme.file_name(&entry.name)).or_default();
            if !names.contains(&entry.name) {
                names.push(entry.name.clone());
            }
        }
        by_file.retain(|_, names| names.len() > 1);
        by_file
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_parses() {
        let catalog = Catalog::bundled().expect("bundled catalog");
        assert_eq!(catalog.len(), 63);
        assert_eq!(catalog.entries()[0].name, "5-amino-1mq");
        let bpc = catalog
            .entries()
            .iter()
            .find(|entry| entry.name == "BPC-157")
            .expect("BPC-157 present");
        assert_eq!(bpc.queries.len(), 3);
    }

    #[test]
    fn bundled_catalog_has_no_collisions() {
        let catalog = Catalog::bundled().expect("bundled catalog");
        assert!(catalog.collisions(&NamingScheme::search()).is_empty());
        assert!(catalog.collisions(&NamingScheme::generate()).is_empty());
    }

    #[test]
    fn json_accepts_mixed_entries() {
        let catalog = Catalog::from_json(r#"["A", {"name": "B", "queries": ["b vial"]}, {"name": "C"}]"#)
            .expect("parse");
        assert_eq!(
            catalog.entries(),
            &[
                CatalogEntry::new("A"),
                CatalogEntry {
                    name: "B".into(),
                    queries: vec!["b vial".into()]
                },
                CatalogEntry::new("C"),
            ]
        );
    }

    #[test]
    fn lines_skip_comments_and_blanks() {
        let catalog = Catalog::from_lines("# header\nA\n\n  B  \n#C\n").expect("parse");
        let names: Vec<_> = catalog.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn blank_names_are_rejected() {
        let err = Catalog::from_json(r#"["A", "  "]"#).expect_err("blank name");
        assert!(err.to_string().contains("entry 2"));
    }

    #[test]
    fn load_picks_format() {
        let dir = tempfile::tempdir().expect("tempdir");
        let json = dir.path().join("items.json");
        std::fs::write(&json, r#"["X", "Y"]"#).expect("write");
        let text = dir.path().join("items.txt");
        std::fs::write(&text, "X\nY\n").expect("write");

        assert_eq!(
            Catalog::load(&json).expect("json"),
            Catalog::load(&text).expect("text")
        );
        assert!(Catalog::load(&dir.path().join("missing.txt")).is_err());
    }

    #[test]
    fn collisions_are_reported() {
        let catalog = Catalog::from_names(["A(B)", "AB", "C", "C"]).expect("catalog");
        let collisions = catalog.collisions(&NamingScheme::search());
        assert_eq!(collisions.len(), 1);
        let names = collisions
            .get("Vici Peptides Site-AB.jpg")
            .expect("collision");
        assert_eq!(names, &vec!["A(B)".to_string(), "AB".to_string()]);
    }
}
