use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Filesystem layout for all persistent state the backend owns.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Per-source extracted-text blobs (`extraction_<timestamp>.txt`).
    pub extractions_dir: PathBuf,
    /// Per-conversation directories with `log.json` and audio files.
    pub conversations_dir: PathBuf,
    /// The three positionally-aligned index artifacts live here.
    pub index_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Self {
        let project_root = discover_project_root();
        let user_data_dir = discover_user_data_dir(&project_root);
        Self::at(project_root, user_data_dir)
    }

    /// Build a layout rooted at an explicit data directory.
    pub fn at(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        let extractions_dir = user_data_dir.join("extracted_texts");
        let conversations_dir = user_data_dir.join("conversations");
        let index_dir = user_data_dir.join("index");

        for dir in [
            &user_data_dir,
            &log_dir,
            &extractions_dir,
            &conversations_dir,
            &index_dir,
        ] {
            let _ = fs::create_dir_all(dir);
        }

        AppPaths {
            project_root,
            user_data_dir,
            log_dir,
            extractions_dir,
            conversations_dir,
            index_dir,
        }
    }

    pub fn index_file(&self) -> PathBuf {
        self.index_dir.join("rag_index.json")
    }

    pub fn metadata_file(&self) -> PathBuf {
        self.index_dir.join("rag_meta.json")
    }

    pub fn chunks_file(&self) -> PathBuf {
        self.index_dir.join("rag_chunks.json")
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn discover_project_root() -> PathBuf {
    if let Ok(root) = env::var("MENTORA_ROOT") {
        return PathBuf::from(root);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").exists() {
        return manifest_dir;
    }

    env::current_dir().unwrap_or(manifest_dir)
}

fn discover_user_data_dir(project_root: &Path) -> PathBuf {
    if let Ok(dir) = env::var("MENTORA_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if cfg!(debug_assertions) {
        return project_root.to_path_buf();
    }

    if cfg!(target_os = "windows") {
        let base = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string()));
        return PathBuf::from(base).join("Mentora");
    }

    if cfg!(target_os = "macos") {
        return home_dir()
            .join("Library")
            .join("Application Support")
            .join("Mentora");
    }

    let xdg = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        home_dir()
            .join(".local/share")
            .to_string_lossy()
            .to_string()
    });
    PathBuf::from(xdg).join("mentora")
}

fn home_dir() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}
