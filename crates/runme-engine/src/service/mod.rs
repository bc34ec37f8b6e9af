//! # Services
//!
//! Request/response front for the parser and the project loader. Every
//! call owns its own [`Document`], so one service value can serve
//! concurrent callers. Message types are serde-serializable so any
//! transport can carry them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::document::{Document, DocumentError, ParseOptions};
use crate::error::ErrorKind;
use crate::identity::Lifecycle;
use crate::io::{self, IoError};
use crate::notebook::{self, Notebook, SerializeError, SerializeOptions, base64_bytes};
use crate::project::{LoadEvent, Project, ProjectError, ProjectOptions};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(transparent)]
    Project(#[from] ProjectError),
    #[error(transparent)]
    Io(#[from] IoError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Serialize(err) => err.kind(),
            ServiceError::Document(err) => err.kind(),
            ServiceError::Project(err) => err.kind(),
            ServiceError::Io(err) => err.kind(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeserializeOptions {
    /// Falls back to the service's lifecycle when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Lifecycle>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeserializeRequest {
    #[serde(with = "base64_bytes")]
    pub source: Vec<u8>,
    #[serde(default)]
    pub options: DeserializeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeserializeResponse {
    pub notebook: Notebook,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializeRequest {
    pub notebook: Notebook,
    #[serde(default)]
    pub options: SerializeOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializeResponse {
    #[serde(with = "base64_bytes")]
    pub result: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatFileRequest {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Lifecycle>,
    /// Report the formatted text without touching the file.
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatFileResponse {
    pub formatted: String,
    pub changed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ParserService {
    options: ParseOptions,
}

impl ParserService {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    fn options_for(&self, identity: Option<Lifecycle>) -> ParseOptions {
        let options = self.options.clone();
        match identity {
            Some(lifecycle) => options.with_lifecycle(lifecycle),
            None => options,
        }
    }

    pub fn deserialize(&self, request: DeserializeRequest) -> Result<DeserializeResponse, ServiceError> {
        let notebook = notebook::deserialize(&request.source, self.options_for(request.options.identity))?;
        Ok(DeserializeResponse { notebook })
    }

    pub fn serialize(&self, request: SerializeRequest) -> Result<SerializeResponse, ServiceError> {
        let result = notebook::serialize(&request.notebook, &request.options)?;
        Ok(SerializeResponse {
            result: result.into_bytes(),
        })
    }

    /// Rewrite a file with identity applied.
    pub fn format_file(&self, request: FormatFileRequest) -> Result<FormatFileResponse, ServiceError> {
        let source = io::read_file(&request.path)?;
        let doc = Document::from_bytes(&source, self.options_for(request.identity))?;
        let formatted = doc.format()?;
        let changed = formatted.as_bytes() != source.as_slice();
        if changed && !request.dry_run {
            log::debug!("formatting {}", request.path.display());
            io::write_file(&request.path, formatted.as_bytes())?;
        }
        Ok(FormatFileResponse { formatted, changed })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum LoadRequestKind {
    Directory {
        path: PathBuf,
        #[serde(default = "default_true")]
        respect_gitignore: bool,
        #[serde(default)]
        ignore_file_patterns: Vec<String>,
        #[serde(default = "default_true")]
        find_repo_upward: bool,
    },
    File {
        path: PathBuf,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    #[serde(flatten)]
    pub kind: LoadRequestKind,
    #[serde(default)]
    pub files_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Lifecycle>,
}

impl LoadRequest {
    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: LoadRequestKind::Directory {
                path: path.into(),
                respect_gitignore: true,
                ignore_file_patterns: Vec::new(),
                find_repo_upward: true,
            },
            files_only: false,
            identity: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: LoadRequestKind::File { path: path.into() },
            files_only: false,
            identity: None,
        }
    }

    pub fn path(&self) -> &Path {
        match &self.kind {
            LoadRequestKind::Directory { path, .. } | LoadRequestKind::File { path } => path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectService {
    parser: ParserService,
}

impl ProjectService {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            parser: ParserService::new(options),
        }
    }

    pub fn project(&self, request: &LoadRequest) -> Result<Project, ProjectError> {
        let project = match &request.kind {
            LoadRequestKind::Directory {
                path,
                respect_gitignore,
                ignore_file_patterns,
                find_repo_upward,
            } => Project::new_dir(
                path,
                ProjectOptions {
                    respect_gitignore: *respect_gitignore,
                    find_repo_upward: *find_repo_upward,
                    ignore_patterns: ignore_file_patterns.clone(),
                },
            )?,
            LoadRequestKind::File { path } => Project::new_file(path, ProjectOptions::default())?,
        };
        Ok(project.with_parse_options(self.parser.options_for(request.identity)))
    }

    /// Start a load and stream its events. Must be called within a tokio
    /// runtime.
    pub fn load(&self, request: LoadRequest, cancel: CancellationToken) -> Result<mpsc::Receiver<LoadEvent>, ServiceError> {
        let project = self.project(&request)?;
        Ok(project.spawn_load(request.files_only, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{FixedIdGenerator, is_valid_id};
    use crate::notebook::CellKind;
    use crate::project::{FoundTask, LoadEventType, extract_data};
    use crate::tests::{FIXED_ID, create_test_file, create_test_project_dir, fixed_options};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn service() -> ParserService {
        ParserService::new(fixed_options(Lifecycle::Unspecified))
    }

    #[test]
    fn test_deserialize_then_serialize() {
        let source = "# Examples\n\n```sh { name=echo }\necho hi\n```\n";
        let service = service();

        let notebook = service
            .deserialize(DeserializeRequest {
                source: source.as_bytes().to_vec(),
                options: DeserializeOptions::default(),
            })
            .unwrap()
            .notebook;
        assert_eq!(notebook.cells[1].kind, CellKind::Code);

        let result = service
            .serialize(SerializeRequest {
                notebook,
                options: SerializeOptions::default(),
            })
            .unwrap()
            .result;
        assert_eq!(String::from_utf8(result).unwrap(), source);
    }

    #[test]
    fn test_request_identity_overrides_default() {
        let notebook = service()
            .deserialize(DeserializeRequest {
                source: b"```sh\nls\n```\n".to_vec(),
                options: DeserializeOptions {
                    identity: Some(Lifecycle::Cell),
                },
            })
            .unwrap()
            .notebook;

        assert_eq!(notebook.cells[0].id(), Some(FIXED_ID));
        assert!(notebook.frontmatter.is_none());
    }

    #[test]
    fn test_deserialize_rejects_invalid_utf8() {
        let err = service()
            .deserialize(DeserializeRequest {
                source: vec![0xff, 0xfe],
                options: DeserializeOptions::default(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_deserialize_request_wire_shape() {
        let request: DeserializeRequest =
            serde_json::from_str(r#"{"source":"IyBIaQo=","options":{"identity":"document"}}"#).unwrap();

        assert_eq!(request.source, b"# Hi\n");
        assert_eq!(request.options.identity, Some(Lifecycle::Document));
    }

    #[test]
    fn test_format_file_writes_identity() {
        // Given a document without identity
        let project_dir = create_test_project_dir();
        let path = create_test_file(&project_dir, "README.md", "```sh\nls\n```\n");
        let service = ParserService::new(
            ParseOptions::default()
                .with_generator(Arc::new(FixedIdGenerator::new(FIXED_ID)))
                .with_ast_metadata(false),
        );

        // When formatting it with full identity
        let response = service
            .format_file(FormatFileRequest {
                path: path.clone(),
                identity: Some(Lifecycle::All),
                dry_run: false,
            })
            .unwrap();

        // Then the file carries both the document and the cell id
        assert!(response.changed);
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            format!("---\nrunme:\n  id: {FIXED_ID}\n  version: v3\n---\n\n```sh {{ id={FIXED_ID} }}\nls\n```\n")
        );

        // And formatting again changes nothing
        let again = service
            .format_file(FormatFileRequest {
                path,
                identity: Some(Lifecycle::All),
                dry_run: true,
            })
            .unwrap();
        assert!(!again.changed);
    }

    #[test]
    fn test_load_request_wire_shape() {
        let request: LoadRequest = serde_json::from_str(
            r#"{"kind":"directory","path":"/tmp/project","ignoreFilePatterns":["node_modules"]}"#,
        )
        .unwrap();

        assert_eq!(
            request.kind,
            LoadRequestKind::Directory {
                path: PathBuf::from("/tmp/project"),
                respect_gitignore: true,
                ignore_file_patterns: vec!["node_modules".to_string()],
                find_repo_upward: true,
            }
        );
        assert!(!request.files_only);
    }

    #[tokio::test]
    async fn test_project_service_streams_tasks() {
        let project_dir = create_test_project_dir();
        create_test_file(&project_dir, "README.md", "```sh\necho ok\n```\n");
        let service = ProjectService::new(ParseOptions::default().with_ast_metadata(false));

        let mut rx = service
            .load(LoadRequest::directory(project_dir.path()), CancellationToken::new())
            .unwrap();
        let mut tasks = Vec::new();
        while let Some(event) = rx.recv().await {
            assert_ne!(event.event_type(), LoadEventType::Error);
            if let Some(found) = extract_data::<FoundTask>(&event) {
                tasks.push(found.task.clone());
            }
        }

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].code_block.name(), "echo-ok");
        assert!(is_valid_id(tasks[0].code_block.id()));
    }

    #[test]
    fn test_load_missing_root() {
        let err = ProjectService::default()
            .project(&LoadRequest::directory("/this/path/does/not/exist"))
            .unwrap_err();
        assert!(matches!(err, ProjectError::RootNotFound(_)));
    }
}
