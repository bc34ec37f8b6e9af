use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::{ProjectError, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadEventType {
    StartedWalk,
    FoundDir,
    FoundFile,
    FinishedWalk,
    StartedParsingDocument,
    FinishedParsingDocument,
    FoundTask,
    Error,
}

impl fmt::Display for LoadEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoadEventType::StartedWalk => "started_walk",
            LoadEventType::FoundDir => "found_dir",
            LoadEventType::FoundFile => "found_file",
            LoadEventType::FinishedWalk => "finished_walk",
            LoadEventType::StartedParsingDocument => "started_parsing_document",
            LoadEventType::FinishedParsingDocument => "finished_parsing_document",
            LoadEventType::FoundTask => "found_task",
            LoadEventType::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDir {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundFile {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedParsingDocument {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedParsingDocument {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundTask {
    pub task: Task,
}

#[derive(Debug)]
pub struct LoadError {
    pub error: ProjectError,
}

/// One step of a project load.
#[derive(Debug)]
pub enum LoadEvent {
    StartedWalk,
    FoundDir(FoundDir),
    FoundFile(FoundFile),
    FinishedWalk,
    StartedParsingDocument(StartedParsingDocument),
    FinishedParsingDocument(FinishedParsingDocument),
    FoundTask(FoundTask),
    Error(LoadError),
}

impl LoadEvent {
    pub fn event_type(&self) -> LoadEventType {
        match self {
            LoadEvent::StartedWalk => LoadEventType::StartedWalk,
            LoadEvent::FoundDir(_) => LoadEventType::FoundDir,
            LoadEvent::FoundFile(_) => LoadEventType::FoundFile,
            LoadEvent::FinishedWalk => LoadEventType::FinishedWalk,
            LoadEvent::StartedParsingDocument(_) => LoadEventType::StartedParsingDocument,
            LoadEvent::FinishedParsingDocument(_) => LoadEventType::FinishedParsingDocument,
            LoadEvent::FoundTask(_) => LoadEventType::FoundTask,
            LoadEvent::Error(_) => LoadEventType::Error,
        }
    }

    /// Payload of type `T`, if this event carries one.
    pub fn data<T: LoadEventData>(&self) -> Option<&T> {
        T::from_event(self)
    }
}

/// Payload types that can be pulled out of a [`LoadEvent`].
pub trait LoadEventData: Sized {
    fn from_event(event: &LoadEvent) -> Option<&Self>;
}

macro_rules! load_event_data {
    ($($variant:ident),* $(,)?) => {
        $(
            impl LoadEventData for $variant {
                fn from_event(event: &LoadEvent) -> Option<&Self> {
                    match event {
                        LoadEvent::$variant(data) => Some(data),
                        _ => None,
                    }
                }
            }
        )*
    };
}

load_event_data!(
    FoundDir,
    FoundFile,
    StartedParsingDocument,
    FinishedParsingDocument,
    FoundTask,
);

impl LoadEventData for LoadError {
    fn from_event(event: &LoadEvent) -> Option<&Self> {
        match event {
            LoadEvent::Error(data) => Some(data),
            _ => None,
        }
    }
}

pub fn extract_data<T: LoadEventData>(event: &LoadEvent) -> Option<&T> {
    event.data()
}
