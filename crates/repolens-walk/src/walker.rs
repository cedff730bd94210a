use std::collections::HashSet;
use std::io;
use std::path::{Component, Path, PathBuf};

use repolens_core::{ChunkMetadata, FileKind, IngestConfig, LensError};

use crate::language::Language;

/// Number of bytes checked for NUL when detecting binary content.
const BINARY_CHECK_SIZE: usize = 8192;

/// A file discovered during a walk that should be chunked.
///
/// Content is not read during the walk; call [`read_source`] when the file is
/// about to be chunked so each file is held in memory only briefly.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use repolens_core::FileKind;
/// use repolens_walk::{Language, SourceEntry};
///
/// let entry = SourceEntry {
///     path: PathBuf::from("/repo/src/auth.py"),
///     relative: "src/auth.py".into(),
///     kind: FileKind::Code,
///     lang: "py".into(),
/// };
/// assert_eq!(entry.language(), Language::Python);
/// assert_eq!(entry.metadata().path, "src/auth.py");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Path on disk (root joined with the relative path).
    pub path: PathBuf,
    /// Path relative to the walked root, `/`-separated.
    pub relative: String,
    /// Doc or code; ignored files are never returned.
    pub kind: FileKind,
    /// Lowercased extension, `""` when the file has none.
    pub lang: String,
}

impl SourceEntry {
    /// Grammar-level language of the file.
    pub fn language(&self) -> Language {
        Language::from_extension(&self.lang)
    }

    /// Metadata attached to every chunk cut from this file.
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            path: self.relative.clone(),
            kind: self.kind,
            lang: self.lang.clone(),
        }
    }
}

/// Walk `root` and return every doc or code file that should be indexed.
///
/// Directories named in `config.ignore_dirs` and hidden directories are not
/// descended into. Files whose extension is in neither extension set, or
/// that are larger than `config.max_file_size`, are left out. `.gitignore`
/// files are honored only when `config.respect_gitignore` is set. The result
/// is sorted by relative path so chunk ordinals are stable across runs.
///
/// # Errors
///
/// Returns [`LensError::Io`] if `root` is not a readable directory.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use repolens_core::IngestConfig;
/// use repolens_walk::walk_tree;
///
/// let files = walk_tree(Path::new("."), &IngestConfig::default()).unwrap();
/// for f in &files {
///     println!("{} ({})", f.relative, f.kind);
/// }
/// ```
pub fn walk_tree(root: &Path, config: &IngestConfig) -> Result<Vec<SourceEntry>, LensError> {
    if !std::fs::metadata(root)?.is_dir() {
        return Err(LensError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        )));
    }

    let ignore_dirs: HashSet<String> = config.ignore_dirs.iter().cloned().collect();
    let walker = ignore::WalkBuilder::new(root)
        .standard_filters(false)
        .git_ignore(config.respect_gitignore)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if !is_dir {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !name.starts_with('.') && !ignore_dirs.contains(name.as_ref())
        })
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unwalkable entry");
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }

        let path = entry.path();
        let lang = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let kind = config.kind_for_extension(&lang);
        if kind == FileKind::Ignored {
            continue;
        }

        match entry.metadata() {
            Ok(meta) if meta.len() > config.max_file_size => {
                tracing::debug!(path = %path.display(), size = meta.len(), "skipping oversized file");
                continue;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "skipping file without metadata");
                continue;
            }
        }

        let relative = relative_path(root, path);
        files.push(SourceEntry {
            path: path.to_path_buf(),
            relative,
            kind,
            lang,
        });
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    tracing::debug!(root = %root.display(), files = files.len(), "walk complete");
    Ok(files)
}

/// Read a discovered file as UTF-8 text.
///
/// # Errors
///
/// Returns [`LensError::Read`] if the file cannot be read, contains NUL bytes
/// in its first 8 KiB, or is not valid UTF-8.
pub fn read_source(entry: &SourceEntry) -> Result<String, LensError> {
    let read_error = |source: io::Error| LensError::Read {
        path: PathBuf::from(&entry.relative),
        source,
    };

    let bytes = std::fs::read(&entry.path).map_err(read_error)?;
    let check_len = bytes.len().min(BINARY_CHECK_SIZE);
    if bytes[..check_len].contains(&0) {
        return Err(read_error(io::Error::new(
            io::ErrorKind::InvalidData,
            "binary content",
        )));
    }
    String::from_utf8(bytes).map_err(|e| read_error(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn make_temp_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("src/auth")).unwrap();
        fs::create_dir_all(root.join("docs")).unwrap();
        fs::write(root.join("README.md"), "# Demo\nhello").unwrap();
        fs::write(root.join("docs/guide.RST"), "Guide\n=====").unwrap();
        fs::write(root.join("src/auth/middleware.py"), "def check():\n    pass\n").unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(root.join("Makefile"), "all:\n\techo hi").unwrap();
        fs::write(root.join("logo.png"), b"\x89PNG").unwrap();

        dir
    }

    fn relatives(files: &[SourceEntry]) -> Vec<&str> {
        files.iter().map(|f| f.relative.as_str()).collect()
    }

    #[test]
    fn walk_classifies_and_sorts() {
        let dir = make_temp_repo();
        let files = walk_tree(dir.path(), &IngestConfig::default()).unwrap();

        assert_eq!(
            relatives(&files),
            vec![
                "README.md",
                "docs/guide.RST",
                "src/auth/middleware.py",
                "src/main.rs"
            ]
        );
        assert_eq!(files[0].kind, FileKind::Doc);
        assert_eq!(files[1].lang, "rst");
        assert_eq!(files[2].kind, FileKind::Code);
        assert_eq!(files[2].lang, "py");
    }

    #[test]
    fn walk_skips_ignored_and_hidden_dirs() {
        let dir = make_temp_repo();
        let root = dir.path();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::write(root.join("node_modules/pkg/index.js"), "function x() {}").unwrap();
        fs::create_dir_all(root.join(".secret")).unwrap();
        fs::write(root.join(".secret/notes.md"), "# hidden").unwrap();
        fs::write(root.join(".env.md"), "# hidden file, not dir").unwrap();

        let files = walk_tree(root, &IngestConfig::default()).unwrap();
        let paths = relatives(&files);
        assert!(!paths.iter().any(|p| p.starts_with("node_modules")));
        assert!(!paths.iter().any(|p| p.starts_with(".secret")));
        assert!(paths.contains(&".env.md"));
    }

    #[test]
    fn hidden_root_is_still_walked() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join(".checkout");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.md"), "# A").unwrap();

        let files = walk_tree(&root, &IngestConfig::default()).unwrap();
        assert_eq!(relatives(&files), vec!["a.md"]);
    }

    #[test]
    fn gitignore_only_when_enabled() {
        let dir = make_temp_repo();
        let root = dir.path();
        fs::create_dir_all(root.join("generated")).unwrap();
        fs::write(root.join("generated/out.py"), "def gen(): pass").unwrap();
        fs::write(root.join(".gitignore"), "generated/\n").unwrap();

        let files = walk_tree(root, &IngestConfig::default()).unwrap();
        assert!(relatives(&files).contains(&"generated/out.py"));

        let config = IngestConfig {
            respect_gitignore: true,
            ..IngestConfig::default()
        };
        let files = walk_tree(root, &config).unwrap();
        assert!(!relatives(&files).contains(&"generated/out.py"));
    }

    #[test]
    fn walk_skips_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("huge.md"), "x".repeat(2048)).unwrap();
        fs::write(root.join("ok.md"), "fine").unwrap();

        let config = IngestConfig {
            max_file_size: 1024,
            ..IngestConfig::default()
        };
        let files = walk_tree(root, &config).unwrap();
        assert_eq!(relatives(&files), vec!["ok.md"]);
    }

    #[test]
    fn walk_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(walk_tree(&dir.path().join("nope"), &IngestConfig::default()).is_err());
    }

    #[test]
    fn read_source_rejects_binary_and_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(root.join("bin.py"), b"def f():\x00 pass").unwrap();
        fs::write(root.join("latin.py"), b"caf\xe9 = 1").unwrap();
        fs::write(root.join("ok.py"), "x = 1").unwrap();

        let files = walk_tree(root, &IngestConfig::default()).unwrap();
        assert_eq!(files.len(), 3);

        let results: Vec<_> = files.iter().map(read_source).collect();
        assert!(matches!(results[0], Err(LensError::Read { .. })));
        assert!(matches!(results[1], Err(LensError::Read { .. })));
        assert_eq!(results[2].as_deref().unwrap(), "x = 1");
    }

    #[test]
    fn extension_lists_built_in_code_ignore_case_and_dots() {
        let dir = make_temp_repo();
        let config = IngestConfig {
            doc_extensions: vec![".MD".into()],
            code_extensions: vec!["PY".into()],
            ..IngestConfig::default()
        };
        let files = walk_tree(dir.path(), &config).unwrap();
        assert_eq!(relatives(&files), vec!["README.md", "src/auth/middleware.py"]);
        assert_eq!(files[0].kind, FileKind::Doc);
        assert_eq!(files[1].kind, FileKind::Code);
    }

    #[test]
    fn target_dir_is_skipped_by_default() {
        let dir = make_temp_repo();
        fs::create_dir_all(dir.path().join("target/debug/build")).unwrap();
        fs::write(dir.path().join("target/debug/build/out.rs"), "fn gen() {}").unwrap();
        let files = walk_tree(dir.path(), &IngestConfig::default()).unwrap();
        assert!(!files.iter().any(|f| f.relative.starts_with("target/")));
    }
}
