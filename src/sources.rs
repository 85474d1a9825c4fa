use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

/// A stored extraction, as presented in listings.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionInfo {
    pub name: String,
    pub date: String,
}

/// Filesystem store for per-source extracted-text blobs.
///
/// Extraction filenames double as [`SourceId`]s throughout the pipeline: the
/// vector index records them as chunk provenance and answers cite them.
#[derive(Debug, Clone)]
pub struct SourceStore {
    dir: PathBuf,
}

impl SourceStore {
    pub fn new(paths: &AppPaths) -> Self {
        Self {
            dir: paths.extractions_dir.clone(),
        }
    }

    /// Persist a new extraction under a timestamped name and return that
    /// name.
    pub fn save(&self, content: &str) -> Result<String, ApiError> {
        let name = format!("extraction_{}.txt", Local::now().format("%Y%m%d_%H%M%S"));
        fs::write(self.dir.join(&name), content)
            .map_err(|e| ApiError::internal(format!("Failed to store extraction: {}", e)))?;
        Ok(name)
    }

    /// All stored extractions, newest name first, with modification
    /// timestamps.
    pub fn list(&self) -> Result<Vec<ExtractionInfo>, ApiError> {
        let mut names: Vec<String> = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(ApiError::internal)? {
            let entry = entry.map_err(ApiError::internal)?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".txt") {
                names.push(name);
            }
        }
        names.sort_by(|a, b| b.cmp(a));

        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            let modified = fs::metadata(self.dir.join(&name))
                .and_then(|meta| meta.modified())
                .map_err(ApiError::internal)?;
            let date: DateTime<Local> = modified.into();
            infos.push(ExtractionInfo {
                name,
                date: date.format("%Y-%m-%d %H:%M:%S").to_string(),
            });
        }
        Ok(infos)
    }

    pub fn read(&self, name: &str) -> Result<String, ApiError> {
        let path = self.dir.join(sanitize_name(name)?);
        if !path.is_file() {
            return Err(ApiError::NotFound("Not found".to_string()));
        }
        fs::read_to_string(path).map_err(ApiError::internal)
    }

    pub fn delete(&self, name: &str) -> Result<(), ApiError> {
        let path = self.dir.join(sanitize_name(name)?);
        if !path.is_file() {
            return Err(ApiError::NotFound("Not found".to_string()));
        }
        fs::remove_file(path).map_err(ApiError::internal)
    }

    /// Every stored extraction keyed by name; the input to an index
    /// rebuild.
    pub fn read_all(&self) -> Result<BTreeMap<String, String>, ApiError> {
        let mut all = BTreeMap::new();
        for info in self.list()? {
            all.insert(info.name.clone(), self.read(&info.name)?);
        }
        Ok(all)
    }
}

/// Stored names are single path components; anything else is treated as an
/// unknown entry. Shared with the conversation store.
pub(crate) fn sanitize_name(name: &str) -> Result<&str, ApiError> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(ApiError::NotFound("Not found".to_string()));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &std::path::Path) -> SourceStore {
        let paths = AppPaths::at(dir.to_path_buf(), dir.to_path_buf());
        SourceStore::new(&paths)
    }

    #[test]
    fn save_read_delete_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());

        let name = store.save("some extracted text").expect("save succeeds");
        assert!(name.starts_with("extraction_") && name.ends_with(".txt"));
        assert_eq!(store.read(&name).expect("read succeeds"), "some extracted text");

        store.delete(&name).expect("delete succeeds");
        assert!(matches!(store.read(&name), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn listing_includes_dates_and_only_text_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        store.save("first").expect("save succeeds");
        std::fs::write(dir.path().join("extracted_texts/notes.md"), "ignored").unwrap();

        let listed = store.list().expect("list succeeds");
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].date.is_empty());
    }

    #[test]
    fn read_all_maps_names_to_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        let name = store.save("body text").expect("save succeeds");

        let all = store.read_all().expect("read_all succeeds");
        assert_eq!(all.get(&name).map(String::as_str), Some("body text"));
    }

    #[test]
    fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = store(dir.path());
        assert!(store.read("../escape.txt").is_err());
        assert!(store.delete("a/b.txt").is_err());
    }
}
