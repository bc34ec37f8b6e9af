//! Shared helpers for unit tests.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::document::ParseOptions;
use crate::identity::{FixedIdGenerator, Lifecycle};

/// A valid ULID handed out by [`fixed_options`].
pub const FIXED_ID: &str = "01HFB6Z3N6Y8Q4B2T7G9KJ3M5V";

/// Parse options with a deterministic id generator and no AST dumps.
pub fn fixed_options(lifecycle: Lifecycle) -> ParseOptions {
    ParseOptions::default()
        .with_lifecycle(lifecycle)
        .with_generator(Arc::new(FixedIdGenerator::new(FIXED_ID)))
        .with_ast_metadata(false)
}

pub fn create_test_project_dir() -> TempDir {
    init_logging();
    TempDir::new().expect("Failed to create temp directory")
}

/// Write `content` under `dir`, creating parent directories.
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
