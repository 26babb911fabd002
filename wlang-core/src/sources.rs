use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::CoreError;

/// Extension of W source files.
pub const SOURCE_EXTENSION: &str = "w";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Name used in diagnostics and for `--entry-file`.
    pub name: String,
    pub contents: String,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        SourceFile {
            path: PathBuf::from(&name),
            name,
            contents: contents.into(),
        }
    }

    /// True when `wanted` is this file's name or its final path component.
    pub fn is_named(&self, wanted: &str) -> bool {
        self.name == wanted
            || self
                .path
                .file_name()
                .is_some_and(|file_name| file_name == wanted)
    }
}

/// Load sources in argument order. A file is taken as is; a directory
/// contributes every `.w` file beneath it, sorted by path.
pub fn load_sources(inputs: &[PathBuf]) -> Result<Vec<SourceFile>, CoreError> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let found = load_directory(input)?;
            if found.is_empty() {
                return Err(CoreError::NoSources(input.clone()));
            }
            files.extend(found);
        } else {
            files.push(read_source(input, input)?);
        }
    }
    debug!(count = files.len(), "sources loaded");
    Ok(files)
}

fn load_directory(root: &Path) -> Result<Vec<SourceFile>, CoreError> {
    let mut paths: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file() && path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
        })
        .collect();
    paths.sort();
    paths.iter().map(|path| read_source(root, path)).collect()
}

fn read_source(root: &Path, path: &Path) -> Result<SourceFile, CoreError> {
    let contents = fs::read_to_string(path)?;
    let relative = if root == path {
        path
    } else {
        path.strip_prefix(root).unwrap_or(path)
    };
    Ok(SourceFile {
        path: path.to_path_buf(),
        name: relative.to_string_lossy().replace('\\', "/"),
        contents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn walks_directories_in_path_order() {
        let dir = tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("lib")).expect("mkdir");
        fs::write(dir.path().join("main.w"), "let a = 1;").expect("write");
        fs::write(dir.path().join("lib/math.w"), "function f() { }").expect("write");
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let files = load_sources(&[dir.path().to_path_buf()]).expect("load");
        let names: Vec<_> = files.iter().map(|file| file.name.as_str()).collect();
        assert_eq!(names, ["lib/math.w", "main.w"]);
        assert_eq!(files[1].contents, "let a = 1;");
    }

    #[test]
    fn keeps_explicit_files_in_argument_order() {
        let dir = tempdir().expect("tempdir");
        let second = dir.path().join("b.w");
        let first = dir.path().join("a.w");
        fs::write(&second, "").expect("write");
        fs::write(&first, "").expect("write");

        let files = load_sources(&[second.clone(), first]).expect("load");
        assert_eq!(files[0].path, second);
        assert!(files[0].is_named("b.w"));
        assert!(!files[0].is_named("a.w"));
    }

    #[test]
    fn reports_empty_directories_and_missing_files() {
        let dir = tempdir().expect("tempdir");
        assert!(matches!(
            load_sources(&[dir.path().to_path_buf()]),
            Err(CoreError::NoSources(_))
        ));
        assert!(matches!(
            load_sources(&[dir.path().join("missing.w")]),
            Err(CoreError::SourceIo(_))
        ));
    }
}
