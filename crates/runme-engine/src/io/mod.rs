use relative_path::RelativePath;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ErrorKind;

/// Extensions of files the project loader picks up, compared case-insensitively.
pub const MARKDOWN_EXTENSIONS: &[&str] = &["md", "mdx", "mdi", "mdr", "run", "runme"];

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Not a markdown file: {0}")]
    NotMarkdown(PathBuf),
}

impl IoError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Io
    }
}

pub fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| MARKDOWN_EXTENSIONS.iter().any(|m| m.eq_ignore_ascii_case(ext)))
}

/// Read a file's raw bytes
pub fn read_file(path: &Path) -> Result<Vec<u8>, IoError> {
    if !path.exists() {
        return Err(IoError::NotFound(path.to_path_buf()));
    }
    fs::read(path).map_err(IoError::Io)
}

/// Read a markdown document relative to a project root
pub fn read_document(relative_path: &RelativePath, root: &Path) -> Result<Vec<u8>, IoError> {
    let absolute_path = relative_path.to_path(root);
    if !is_markdown_file(&absolute_path) {
        return Err(IoError::NotMarkdown(absolute_path));
    }
    read_file(&absolute_path)
}

/// Write content to a file, creating parent directories
pub fn write_file(path: &Path, content: &[u8]) -> Result<(), IoError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(IoError::Io)?;
    }
    fs::write(path, content).map_err(IoError::Io)
}

/// Write a markdown document relative to a project root
pub fn write_document(relative_path: &RelativePath, root: &Path, content: &[u8]) -> Result<(), IoError> {
    let absolute_path = relative_path.to_path(root);
    if !is_markdown_file(&absolute_path) {
        return Err(IoError::NotMarkdown(absolute_path));
    }
    write_file(&absolute_path, content)
}
