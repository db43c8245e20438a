//! File discovery for the security scan runner.
//!
//! Walks a directory tree honoring the `[scanner]` settings: extension
//! allow-list, excluded names, hidden entries, file size and file count.

use crate::config::ScannerConfig;
use anyhow::{bail, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

/// A discovered file.
#[derive(Debug, Clone, PartialEq)]
pub struct ScannedFile {
    /// Path relative to the scan root, with `/` separators.
    pub path: String,
    pub size: u64,
}

pub struct FileScanner {
    root: PathBuf,
    config: ScannerConfig,
}

impl FileScanner {
    pub fn new(root: impl Into<PathBuf>, config: &ScannerConfig) -> Self {
        Self {
            root: root.into(),
            config: config.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discover matching files, sorted by path and capped at `max_files`.
    pub fn scan(&self) -> Result<Vec<ScannedFile>> {
        if !self.root.exists() {
            bail!("Path not found: {}", self.root.display());
        }
        if !self.root.is_dir() {
            bail!("Not a directory: {}", self.root.display());
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !self.is_excluded(e));

        for entry in walker {
            if files.len() >= self.config.max_files {
                debug!("Reached max_files limit ({})", self.config.max_files);
                break;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() || !self.matches(entry.path()) {
                continue;
            }

            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            let rel = entry
                .path()
                .strip_prefix(&self.root)
                .unwrap_or(entry.path());
            files.push(ScannedFile {
                path: rel.to_string_lossy().replace('\\', "/"),
                size,
            });
        }

        Ok(files)
    }

    /// Discover files and read their contents. Unreadable files are skipped.
    pub fn collect_files(&self) -> Result<Vec<(ScannedFile, String)>> {
        let mut out = Vec::new();
        for file in self.scan()? {
            match fs::read_to_string(self.root.join(&file.path)) {
                Ok(content) => out.push((file, content)),
                Err(e) => warn!("Failed to read {}: {}", file.path, e),
            }
        }
        Ok(out)
    }

    /// Check extension and size of a file.
    pub fn matches(&self, path: &Path) -> bool {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !self.config.extensions.iter().any(|e| e == ext) {
            return false;
        }

        match fs::metadata(path) {
            Ok(metadata) => metadata.len() <= self.config.max_file_size as u64,
            Err(_) => false,
        }
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        // Hidden entries (".git", ".env.local") are never scanned.
        name.starts_with('.') || self.config.excludes.iter().any(|p| name == p.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_scan_filters_entries() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "app/main.py", "print('hi')");
        write(tmp.path(), "app/config.yaml", "debug: true");
        write(tmp.path(), "app/logo.png", "binary");
        write(tmp.path(), "node_modules/lib/index.js", "x");
        write(tmp.path(), ".git/config", "x");
        write(tmp.path(), ".hidden.yaml", "x");

        let scanner = FileScanner::new(tmp.path(), &ScannerConfig::default());
        let files = scanner.scan().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();

        assert_eq!(paths, vec!["app/config.yaml", "app/main.py"]);
        assert_eq!(files[0].size, "debug: true".len() as u64);
    }

    #[test]
    fn test_scan_respects_limits() {
        let tmp = TempDir::new().unwrap();
        for i in 0..5 {
            write(tmp.path(), &format!("f{}.sh", i), "echo ok");
        }
        write(tmp.path(), "big.sh", &"x".repeat(64));

        let config = ScannerConfig {
            max_files: 3,
            max_file_size: 32,
            ..ScannerConfig::default()
        };
        let files = FileScanner::new(tmp.path(), &config).scan().unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| f.path != "big.sh"));
    }

    #[test]
    fn test_missing_root_is_error() {
        let tmp = TempDir::new().unwrap();
        let scanner = FileScanner::new(tmp.path().join("nope"), &ScannerConfig::default());
        assert!(scanner.scan().is_err());

        write(tmp.path(), "file.py", "x");
        let scanner = FileScanner::new(tmp.path().join("file.py"), &ScannerConfig::default());
        assert!(scanner.scan().is_err());
    }

    #[test]
    fn test_collect_files_reads_content() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "deploy.tf", "cidr_blocks = [\"0.0.0.0/0\"]");

        let files = FileScanner::new(tmp.path(), &ScannerConfig::default())
            .collect_files()
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].1.contains("0.0.0.0/0"));
    }
}
