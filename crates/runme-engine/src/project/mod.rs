//! # Project loader
//!
//! Walks a directory (or a single file), reports what it finds on an events
//! channel and turns every code block of every markdown file into a
//! [`Task`].
//!
//! The walk completes before any file is parsed, so consumers see every
//! `FoundFile` before the first `StartedParsingDocument`. Per file the order
//! is `StartedParsingDocument`, `FoundTask`*, `FinishedParsingDocument`.

mod events;

use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use relative_path::RelativePathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::blocks::CodeBlock;
use crate::document::{Document, DocumentError, ParseOptions};
use crate::error::ErrorKind;
use crate::io::{self, IoError};

pub use events::{
    FinishedParsingDocument, FoundDir, FoundFile, FoundTask, LoadError, LoadEvent, LoadEventData, LoadEventType,
    StartedParsingDocument, extract_data,
};

/// Capacity of the channel handed out by [`Project::spawn_load`].
pub const EVENTS_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("walk failed: {0}")]
    Walk(#[from] ignore::Error),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("failed to parse {path}: {source}")]
    Document {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },
    #[error("invalid ignore pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
    #[error("loading was cancelled")]
    Cancelled,
}

impl ProjectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectError::Io(err) => err.kind(),
            ProjectError::Cancelled => ErrorKind::Cancelled,
            _ => ErrorKind::ProjectLoad,
        }
    }
}

/// A runnable code block and the document it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub code_block: CodeBlock,
    pub document_path: PathBuf,
    pub rel_document_path: RelativePathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectOptions {
    /// Skip files ignored by git when the project sits in a repository.
    pub respect_gitignore: bool,
    /// Look for the repository in parent directories, not just the root.
    pub find_repo_upward: bool,
    /// Extra gitignore-style patterns, relative to the project root.
    pub ignore_patterns: Vec<String>,
}

impl Default for ProjectOptions {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            find_repo_upward: true,
            ignore_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    Dir,
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    source: Source,
    repo_root: Option<PathBuf>,
    options: ProjectOptions,
    parse_options: ParseOptions,
}

/// Why a load stopped early.
enum Halt {
    Cancelled,
    Disconnected,
}

impl Project {
    pub fn new_dir(root: impl AsRef<Path>, options: ProjectOptions) -> Result<Self, ProjectError> {
        let root = root.as_ref();
        let root = fs::canonicalize(root)
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| ProjectError::RootNotFound(root.to_path_buf()))?;
        let repo_root = find_repo(&root, &options);
        Ok(Self {
            root,
            source: Source::Dir,
            repo_root,
            options,
            parse_options: ParseOptions::default(),
        })
    }

    pub fn new_file(path: impl AsRef<Path>, options: ProjectOptions) -> Result<Self, ProjectError> {
        let path = path.as_ref();
        let file = fs::canonicalize(path)
            .ok()
            .filter(|p| p.is_file())
            .ok_or_else(|| ProjectError::RootNotFound(path.to_path_buf()))?;
        let root = file
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| ProjectError::RootNotFound(path.to_path_buf()))?;
        Ok(Self {
            root,
            source: Source::File(file),
            repo_root: None,
            options,
            parse_options: ParseOptions::default(),
        })
    }

    pub fn with_parse_options(mut self, parse_options: ParseOptions) -> Self {
        self.parse_options = parse_options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Repository whose ignore rules apply, if any.
    pub fn repo_root(&self) -> Option<&Path> {
        self.repo_root.as_deref()
    }

    /// Run the load on the current thread, sending events on `tx`.
    ///
    /// Must not be called from within an async context; use
    /// [`Project::spawn_load`] there. Returns once every event is sent, the
    /// receiver is gone, or `cancel` fires.
    pub fn load(&self, tx: &mpsc::Sender<LoadEvent>, files_only: bool, cancel: &CancellationToken) {
        let emitter = Emitter { tx, cancel };
        if let Err(Halt::Cancelled) = self.run(&emitter, files_only) {
            log::debug!("project load under {} cancelled", self.root.display());
            let _ = tx.blocking_send(LoadEvent::Error(LoadError {
                error: ProjectError::Cancelled,
            }));
        }
    }

    /// Load on a blocking worker and return the receiving end of the events
    /// channel. The channel closes when the load ends.
    pub fn spawn_load(self, files_only: bool, cancel: CancellationToken) -> mpsc::Receiver<LoadEvent> {
        let (tx, rx) = mpsc::channel(EVENTS_CHANNEL_CAPACITY);
        tokio::task::spawn_blocking(move || self.load(&tx, files_only, &cancel));
        rx
    }

    fn run(&self, emitter: &Emitter<'_>, files_only: bool) -> Result<(), Halt> {
        emitter.emit(LoadEvent::StartedWalk)?;
        let files = match &self.source {
            Source::File(path) => {
                emitter.emit(LoadEvent::FoundFile(FoundFile { path: path.clone() }))?;
                vec![path.clone()]
            }
            Source::Dir => self.walk(emitter)?,
        };
        emitter.emit(LoadEvent::FinishedWalk)?;

        if files_only {
            return Ok(());
        }
        for path in files {
            self.parse_file(emitter, path)?;
        }
        Ok(())
    }

    fn walk(&self, emitter: &Emitter<'_>) -> Result<Vec<PathBuf>, Halt> {
        let patterns = match self.ignore_patterns() {
            Ok(patterns) => patterns,
            Err(error) => {
                emitter.emit(LoadEvent::Error(LoadError { error }))?;
                return Ok(Vec::new());
            }
        };
        let git_aware = self.repo_root.is_some();

        let mut builder = WalkBuilder::new(&self.root);
        builder
            .hidden(false)
            .ignore(false)
            .parents(git_aware)
            .git_ignore(git_aware)
            .git_exclude(git_aware)
            .git_global(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                if is_dir && entry.file_name() == ".git" {
                    return false;
                }
                !patterns.matched(entry.path(), is_dir).is_ignore()
            });

        let mut files = Vec::new();
        for result in builder.build() {
            let entry = match result {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("skipping entry under {}: {err}", self.root.display());
                    emitter.emit(LoadEvent::Error(LoadError { error: err.into() }))?;
                    continue;
                }
            };
            if entry.depth() == 0 {
                continue;
            }
            let path = entry.into_path();
            if path.is_dir() {
                emitter.emit(LoadEvent::FoundDir(FoundDir { path }))?;
            } else if io::is_markdown_file(&path) {
                emitter.emit(LoadEvent::FoundFile(FoundFile { path: path.clone() }))?;
                files.push(path);
            }
        }
        Ok(files)
    }

    fn ignore_patterns(&self) -> Result<Gitignore, ProjectError> {
        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.options.ignore_patterns {
            builder
                .add_line(None, pattern)
                .map_err(|source| ProjectError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })?;
        }
        builder.build().map_err(ProjectError::Walk)
    }

    fn parse_file(&self, emitter: &Emitter<'_>, path: PathBuf) -> Result<(), Halt> {
        emitter.emit(LoadEvent::StartedParsingDocument(StartedParsingDocument { path: path.clone() }))?;

        match self.tasks(&path) {
            Ok(tasks) => {
                for task in tasks {
                    emitter.emit(LoadEvent::FoundTask(FoundTask { task }))?;
                }
            }
            Err(error) => {
                log::warn!("{error}");
                emitter.emit(LoadEvent::Error(LoadError { error }))?;
            }
        }

        emitter.emit(LoadEvent::FinishedParsingDocument(FinishedParsingDocument { path }))
    }

    fn tasks(&self, path: &Path) -> Result<Vec<Task>, ProjectError> {
        let source = io::read_file(path)?;
        let document_error = |source| ProjectError::Document {
            path: path.to_path_buf(),
            source,
        };
        let doc = Document::from_bytes(&source, self.parse_options.clone()).map_err(document_error)?;
        let rel_document_path = relative_to(path, &self.root);
        Ok(doc
            .code_blocks()
            .map_err(document_error)?
            .into_iter()
            .map(|code_block| Task {
                code_block: code_block.clone(),
                document_path: path.to_path_buf(),
                rel_document_path: rel_document_path.clone(),
            })
            .collect())
    }
}

struct Emitter<'a> {
    tx: &'a mpsc::Sender<LoadEvent>,
    cancel: &'a CancellationToken,
}

impl Emitter<'_> {
    fn emit(&self, event: LoadEvent) -> Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled);
        }
        self.tx.blocking_send(event).map_err(|_| Halt::Disconnected)
    }
}

fn find_repo(root: &Path, options: &ProjectOptions) -> Option<PathBuf> {
    if !options.respect_gitignore {
        return None;
    }
    let is_repo = |dir: &Path| dir.join(".git").exists();
    if options.find_repo_upward {
        root.ancestors().find(|dir| is_repo(dir)).map(Path::to_path_buf)
    } else {
        is_repo(root).then(|| root.to_path_buf())
    }
}

fn relative_to(path: &Path, root: &Path) -> RelativePathBuf {
    path.strip_prefix(root)
        .ok()
        .and_then(|rel| RelativePathBuf::from_path(rel).ok())
        .unwrap_or_else(|| RelativePathBuf::from(path.to_string_lossy().into_owned()))
}
