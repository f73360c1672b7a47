//! Directory-backed static file provider
//!
//! URL paths map onto a canonical document root. Directories answer with
//! their `index.html`. A `name.gz` sibling is offered as a pre-compressed
//! variant of `name`.

use chrono::{DateTime, Utc};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Component, Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

const INDEX_FILE: &str = "index.html";

/// A file located under the document root
#[derive(Debug, Clone)]
pub struct StaticFile {
    pub path: PathBuf,
    pub mime: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub etag: String,
    pub templated: bool,
    /// Pre-compressed sibling and its size
    pub gzip: Option<(PathBuf, u64)>,
}

#[derive(Debug, Clone)]
pub struct StaticRoot {
    root: PathBuf,
    templated_suffixes: Vec<String>,
}

impl StaticRoot {
    /// Fails when `root` does not exist
    pub fn new(root: impl AsRef<Path>, templated_suffixes: Vec<String>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        if !root.is_dir() {
            return Err(io::Error::other(format!("{} is not a directory", root.display())));
        }
        Ok(Self { root, templated_suffixes })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_templated(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        self.templated_suffixes.iter().any(|suffix| name.ends_with(suffix.as_str()))
    }

    /// Find the file answering `url_path`, refusing anything outside the root
    pub fn locate(&self, url_path: &str) -> Option<StaticFile> {
        let relative = Path::new(url_path.trim_start_matches('/'));
        if relative.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir)) {
            log::debug!("Rejected static path {}", url_path);
            return None;
        }

        let mut path = self.root.join(relative).canonicalize().ok()?;
        if !path.starts_with(&self.root) {
            log::warn!("Static path {} escapes the document root", url_path);
            return None;
        }
        if path.is_dir() {
            path.push(INDEX_FILE);
        }

        let metadata = fs::metadata(&path).ok().filter(Metadata::is_file)?;
        let templated = self.is_templated(&path);
        let mime = mime_guess::from_path(&path).first_or_octet_stream().essence_str().to_string();
        let gzip = if templated { None } else { gzip_sibling(&path) };

        Some(StaticFile {
            mime,
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            etag: file_etag(&metadata),
            templated,
            gzip,
            path,
        })
    }
}

fn gzip_sibling(path: &Path) -> Option<(PathBuf, u64)> {
    let mut name = path.as_os_str().to_owned();
    name.push(".gz");
    let sibling = PathBuf::from(name);
    let metadata = fs::metadata(&sibling).ok().filter(Metadata::is_file)?;
    Some((sibling, metadata.len()))
}

/// Strong validator built from inode, size and modification time
fn file_etag(metadata: &Metadata) -> String {
    let modified = metadata
        .modified()
        .ok()
        .and_then(|m| m.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs());
    format!("\"{:x}-{:x}-{:x}\"", inode_number(metadata), metadata.len(), modified)
}

#[cfg(unix)]
fn inode_number(metadata: &Metadata) -> u64 {
    metadata.ino()
}

#[cfg(not(unix))]
fn inode_number(_metadata: &Metadata) -> u64 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> (tempfile::TempDir, StaticRoot) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("app.js"), "console.log(1)").unwrap();
        fs::write(dir.path().join("app.js.gz"), [0x1f, 0x8b, 0x08]).unwrap();
        fs::write(dir.path().join("hello.shtml"), "Hi ${user}").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("index.html"), "docs").unwrap();
        let root = StaticRoot::new(dir.path(), vec![".shtml".to_string()]).unwrap();
        (dir, root)
    }

    #[test]
    fn test_locate_file() {
        let (_dir, root) = site();
        let file = root.locate("/app.js").unwrap();
        assert_eq!(file.size, 14);
        assert!(file.mime.contains("javascript"));
        assert!(file.etag.starts_with('"') && file.etag.ends_with('"'));
        assert_eq!(file.gzip.as_ref().map(|(_, size)| *size), Some(3));
        assert!(!file.templated);
    }

    #[test]
    fn test_directory_index() {
        let (_dir, root) = site();
        assert_eq!(root.locate("/").unwrap().mime, "text/html");
        assert_eq!(root.locate("/docs").unwrap().size, 4);
        assert!(root.locate("/missing.txt").is_none());
    }

    #[test]
    fn test_traversal_rejected() {
        let (_dir, root) = site();
        assert!(root.locate("/../secret.txt").is_none());
        assert!(root.locate("/docs/../../secret.txt").is_none());
    }

    #[test]
    fn test_templated_suffix() {
        let (_dir, root) = site();
        let file = root.locate("/hello.shtml").unwrap();
        assert!(file.templated);
        assert!(file.gzip.is_none());
    }

    #[test]
    fn test_etag_tracks_content() {
        let (dir, root) = site();
        let before = root.locate("/index.html").unwrap().etag;
        fs::write(dir.path().join("index.html"), "<h1>home, longer</h1>").unwrap();
        assert_ne!(root.locate("/index.html").unwrap().etag, before);
    }
}
