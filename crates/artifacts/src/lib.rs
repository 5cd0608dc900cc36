//! Scanning of the build output directory into an artifact set.

mod exclude;

pub use exclude::ExcludeSet;

use serde::Serialize;
use sha2::{Digest, Sha256};
use shipfront_core::{CacheConfig, Error, Result, object_key};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A single file ready for upload
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    /// Object key, prefix applied, `/` separated
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    /// Lowercase hex SHA-256 of the file contents
    pub sha256: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

/// How local files become object keys and upload headers
#[derive(Debug, Clone, Default)]
pub struct ArtifactOptions {
    pub prefix: Option<String>,
    pub exclude: Vec<String>,
    pub cache: CacheConfig,
}

/// The complete build output, sorted by key
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSet {
    pub root: PathBuf,
    pub files: Vec<Artifact>,
}

impl ArtifactSet {
    /// Walk `dir` and hash every file that is not excluded.
    ///
    /// Fails when `dir` is missing, is not a directory, or yields no files.
    pub fn scan(dir: &Path, options: &ArtifactOptions) -> Result<Self> {
        if !dir.exists() {
            return Err(Error::InvalidData(format!(
                "Artifact directory does not exist: {}",
                dir.display()
            )));
        }
        if !dir.is_dir() {
            return Err(Error::InvalidData(format!(
                "Artifact path is not a directory: {}",
                dir.display()
            )));
        }

        let root = dir.canonicalize()?;
        let excludes = ExcludeSet::new(&options.exclude)?;
        let mut files = Vec::new();

        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let inside = !entry.path_is_symlink() || resolves_inside(entry.path(), &root);
                if !inside {
                    warn!(path = %entry.path().display(), "skipping symlink pointing outside artifact directory");
                }
                inside
            });

        for entry in walker {
            let entry = entry.map_err(|e| {
                Error::IoError(e.into_io_error().unwrap_or_else(|| {
                    io::Error::other("filesystem loop while scanning artifacts")
                }))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            if !resolves_inside(path, &root) {
                warn!(path = %path.display(), "skipping file resolving outside artifact directory");
                continue;
            }

            let relative = relative_key(&root, path)?;
            if excludes.is_excluded(&relative) {
                debug!(file = %relative, "excluded");
                continue;
            }

            let key = object_key(options.prefix.as_deref(), &relative);
            let size = entry.metadata().map_err(|e| {
                Error::IoError(e.into_io_error().unwrap_or_else(|| io::Error::other("metadata")))
            })?.len();
            let content_type = mime_guess::from_path(path)
                .first_raw()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
                .to_string();
            let cache_control = options.cache.for_key(&relative);

            files.push(Artifact {
                sha256: hash_file(path)?,
                key,
                path: path.to_path_buf(),
                size,
                content_type,
                cache_control,
            });
        }

        if files.is_empty() {
            return Err(Error::InvalidData(format!(
                "Artifact directory is empty: {}",
                dir.display()
            )));
        }

        files.sort_by(|a, b| a.key.cmp(&b.key));
        debug!(root = %root.display(), files = files.len(), "scanned artifacts");

        Ok(Self { root, files })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.files
            .binary_search_by(|f| f.key.as_str().cmp(key))
            .ok()
            .map(|i| &self.files[i])
    }
}

/// True when `path`, with every link resolved, lies under `root`
fn resolves_inside(path: &Path, root: &Path) -> bool {
    path.canonicalize()
        .is_ok_and(|resolved| resolved.starts_with(root))
}

/// Relative path of `path` under `root`, joined with `/`
fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| Error::InvalidData(format!("{} is outside {}", path.display(), root.display())))?;

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                Error::InvalidData(format!("Non UTF-8 file name: {}", path.display()))
            })?),
            _ => {
                return Err(Error::InvalidData(format!(
                    "Unexpected path component in {}",
                    path.display()
                )));
            }
        }
    }
    Ok(parts.join("/"))
}

/// SHA-256 of a file as lowercase hex
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of an in-memory buffer as lowercase hex
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_scan_collects_sorted_keys() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "main.js", "console.log(1)");
        write(tmp.path(), "index.html", "<html></html>");
        write(tmp.path(), "assets/logo.svg", "<svg/>");

        let set = ArtifactSet::scan(tmp.path(), &ArtifactOptions::default()).unwrap();
        let keys: Vec<_> = set.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["assets/logo.svg", "index.html", "main.js"]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.total_bytes(), 14 + 13 + 6);
    }

    #[test]
    fn test_scan_hashes_and_types() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "index.html", "hello");
        write(tmp.path(), "data.unknownext", "x");

        let set = ArtifactSet::scan(tmp.path(), &ArtifactOptions::default()).unwrap();
        let index = set.get("index.html").unwrap();
        assert_eq!(
            index.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
        assert_eq!(index.sha256, hash_bytes(b"hello"));
        assert_eq!(index.content_type, "text/html");
        assert_eq!(
            set.get("data.unknownext").unwrap().content_type,
            DEFAULT_CONTENT_TYPE
        );
    }

    #[test]
    fn test_scan_applies_prefix_and_cache() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "index.html", "a");
        write(tmp.path(), "app.css", "b");

        let options = ArtifactOptions {
            prefix: Some("site".to_string()),
            exclude: vec![],
            cache: CacheConfig {
                default: Some("max-age=3600".to_string()),
                html: Some("no-cache".to_string()),
            },
        };
        let set = ArtifactSet::scan(tmp.path(), &options).unwrap();
        assert_eq!(
            set.get("site/index.html").unwrap().cache_control.as_deref(),
            Some("no-cache")
        );
        assert_eq!(
            set.get("site/app.css").unwrap().cache_control.as_deref(),
            Some("max-age=3600")
        );
        assert!(set.get("index.html").is_none());
    }

    #[test]
    fn test_scan_respects_excludes() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "index.html", "a");
        write(tmp.path(), "main.js.map", "b");
        write(tmp.path(), "img/.DS_Store", "c");

        let options = ArtifactOptions {
            exclude: vec!["*.map".to_string(), ".DS_Store".to_string()],
            ..Default::default()
        };
        let set = ArtifactSet::scan(tmp.path(), &options).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.get("index.html").is_some());
    }

    #[test]
    fn test_scan_rejects_invalid_exclude() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "index.html", "a");
        let options = ArtifactOptions {
            exclude: vec!["[unclosed".to_string()],
            ..Default::default()
        };
        let err = ArtifactSet::scan(tmp.path(), &options).unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_links_leaving_the_root() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().unwrap();
        let site = tmp.path().join("site");
        let outside = tmp.path().join("outside");
        write(&site, "index.html", "<html>");
        write(&site, "assets/app.js", "app");
        write(&outside, "secret.env", "TOKEN=1");
        symlink(&outside, site.join("linked")).unwrap();
        symlink(outside.join("secret.env"), site.join("secret-file")).unwrap();
        symlink(site.join("assets"), site.join("alias")).unwrap();

        let set = ArtifactSet::scan(&site, &ArtifactOptions::default()).unwrap();
        let keys: Vec<_> = set.files.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["alias/app.js", "assets/app.js", "index.html"]);
        assert!(set.files.iter().all(|f| !f.key.contains("secret")));
    }

    #[test]
    fn test_scan_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let err = ArtifactSet::scan(&tmp.path().join("dist"), &ArtifactOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_scan_file_instead_of_dir() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "dist", "not a dir");
        let err = ArtifactSet::scan(&tmp.path().join("dist"), &ArtifactOptions::default())
            .unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_scan_empty_dir() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("nested/deeper")).unwrap();
        let err = ArtifactSet::scan(tmp.path(), &ArtifactOptions::default()).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_scan_everything_excluded_is_empty() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.map", "x");
        let options = ArtifactOptions {
            exclude: vec!["*.map".to_string()],
            ..Default::default()
        };
        let err = ArtifactSet::scan(tmp.path(), &options).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
