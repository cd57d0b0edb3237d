//! Directory of telegram definition documents

use crate::definition::{TelegramDefinition, TelegramDocument};
use crate::error::{DlmsError, DlmsResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Result of reading one document file
#[derive(Debug)]
pub struct ScannedDocument {
    pub path: PathBuf,
    pub result: DlmsResult<TelegramDocument>,
}

impl ScannedDocument {
    /// Parse errors and validation problems of this file
    pub fn problems(&self) -> Vec<String> {
        match &self.result {
            Ok(document) => document.problems(),
            Err(e) => vec![e.to_string()],
        }
    }
}

/// All definition documents of a directory, keyed by `info.id`
#[derive(Debug, Clone, Default)]
pub struct TelegramCatalog {
    documents: BTreeMap<String, (PathBuf, TelegramDocument)>,
}

impl TelegramCatalog {
    /// Read every `.yml`/`.yaml` file of `dir` without failing on bad ones
    pub fn scan(dir: &Path) -> DlmsResult<Vec<ScannedDocument>> {
        let entries = std::fs::read_dir(dir).map_err(|e| {
            DlmsError::Configuration(format!(
                "Cannot read telegram directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .and_then(|ext| ext.to_str())
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("yml") || ext.eq_ignore_ascii_case("yaml"))
            })
            .collect();
        paths.sort();

        Ok(paths
            .into_iter()
            .map(|path| {
                let result = TelegramDocument::from_file(&path);
                ScannedDocument { path, result }
            })
            .collect())
    }

    /// Load and validate every document of `dir`
    ///
    /// # Errors
    /// `Configuration` when the directory is unreadable, a document is
    /// invalid, or two documents share an id.
    pub fn load(dir: &Path) -> DlmsResult<Self> {
        let mut catalog = Self::default();
        for scanned in Self::scan(dir)? {
            let document = scanned.result?;
            document.validate().map_err(|e| {
                DlmsError::Configuration(format!("{}: {}", scanned.path.display(), e))
            })?;
            catalog.insert(scanned.path, document)?;
        }
        log::debug!(
            "Loaded {} telegram definitions from {}",
            catalog.len(),
            dir.display()
        );
        Ok(catalog)
    }

    pub fn insert(&mut self, path: PathBuf, document: TelegramDocument) -> DlmsResult<()> {
        let id = document.info.id.clone();
        if let Some((existing, _)) = self.documents.get(&id) {
            return Err(DlmsError::Configuration(format!(
                "Telegram id '{}' defined in both {} and {}",
                id,
                existing.display(),
                path.display()
            )));
        }
        self.documents.insert(id, (path, document));
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn documents(&self) -> impl Iterator<Item = &TelegramDocument> {
        self.documents.values().map(|(_, d)| d)
    }

    pub fn get(&self, id: &str) -> Option<&TelegramDocument> {
        self.documents.get(id).map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Build the definition for `id`
    pub fn definition(&self, id: &str) -> DlmsResult<TelegramDefinition> {
        let document = self.get(id).ok_or_else(|| {
            let available: Vec<&str> = self.ids().collect();
            DlmsError::Configuration(format!(
                "Telegram '{}' not found, available: {}",
                id,
                if available.is_empty() {
                    "none".to_string()
                } else {
                    available.join(", ")
                }
            ))
        })?;
        TelegramDefinition::try_from(document.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const DOC: &str = r#"
version: "1.0"
info: { id: ID, name: Meter, distributer: Grid, country: DE }
registers:
  - { class_id: 3, obis: "1.0.1.7.0.255", name: ACTIVE_POWER_IMPORT, unit: W }
"#;

    fn write(dir: &Path, name: &str, id: &str) {
        fs::write(dir.join(name), DOC.replace("ID", id)).unwrap();
    }

    #[test]
    fn test_load_directory() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.yml", "beta");
        write(dir.path(), "a.yaml", "alpha");
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let catalog = TelegramCatalog::load(dir.path()).unwrap();
        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec!["alpha", "beta"]);
        let definition = catalog.definition("beta").unwrap();
        assert_eq!(definition.register_count(), 1);
    }

    #[test]
    fn test_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yml", "alpha");
        let catalog = TelegramCatalog::load(dir.path()).unwrap();
        match catalog.definition("gamma") {
            Err(DlmsError::Configuration(msg)) => assert!(msg.contains("alpha")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yml", "same");
        write(dir.path(), "b.yml", "same");
        assert!(TelegramCatalog::load(dir.path()).is_err());
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            TelegramCatalog::load(&dir.path().join("absent")),
            Err(DlmsError::Configuration(_))
        ));
    }

    #[test]
    fn test_scan_reports_invalid_documents() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "good.yml", "good");
        fs::write(dir.path().join("bad.yml"), "version: \"\"\ninfo: { id: bad, name: x, distributer: y, country: z }\n").unwrap();
        fs::write(dir.path().join("broken.yml"), "registers: [ {").unwrap();

        let scanned = TelegramCatalog::scan(dir.path()).unwrap();
        assert_eq!(scanned.len(), 3);
        let bad = scanned.iter().find(|s| s.path.ends_with("bad.yml")).unwrap();
        assert!(bad.problems().iter().any(|p| p.contains("version")));
        let broken = scanned.iter().find(|s| s.path.ends_with("broken.yml")).unwrap();
        assert!(broken.result.is_err());
        let good = scanned.iter().find(|s| s.path.ends_with("good.yml")).unwrap();
        assert!(good.problems().is_empty());
        assert!(TelegramCatalog::load(dir.path()).is_err());
    }
}
