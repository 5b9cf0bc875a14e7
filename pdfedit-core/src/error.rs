use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("failed to open {}: {source:#}", .path.display())]
    OpenFailure {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to save {}: {source:#}", .path.display())]
    SaveFailure {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("{0}")]
    InvalidTransition(Rejection),
    #[error("failed to {action}: {source:#}")]
    Document {
        action: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ViewerError {
    pub(crate) fn document(action: impl Into<String>, source: anyhow::Error) -> Self {
        ViewerError::Document {
            action: action.into(),
            source,
        }
    }

    pub fn is_recoverable_warning(&self) -> bool {
        matches!(self, ViewerError::InvalidTransition(_))
    }
}

impl From<Rejection> for ViewerError {
    fn from(rejection: Rejection) -> Self {
        ViewerError::InvalidTransition(rejection)
    }
}

/// Reason a command was refused without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    NoDocumentToEdit,
    NoDocumentToSearch,
    NoDocumentToZoom,
    NavigateWhileEditing,
    ZoomWhileEditing,
    SearchWhileEditing,
    AlreadyEditing,
    NotEditing,
}

impl Rejection {
    pub fn title(&self) -> &'static str {
        match self {
            Rejection::NavigateWhileEditing
            | Rejection::ZoomWhileEditing
            | Rejection::SearchWhileEditing
            | Rejection::AlreadyEditing => "Editing Active",
            _ => "Warning",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            Rejection::NoDocumentToEdit => "No PDF open to edit.",
            Rejection::NoDocumentToSearch => "No PDF open to search.",
            Rejection::NoDocumentToZoom => "No PDF open to zoom.",
            Rejection::NavigateWhileEditing => "Please exit Edit Mode before navigating pages.",
            Rejection::ZoomWhileEditing => "Exit Edit Mode to zoom.",
            Rejection::SearchWhileEditing => "Exit Edit Mode to search.",
            Rejection::AlreadyEditing => "Already editing the current page.",
            Rejection::NotEditing => "Not currently in editing mode.",
        };
        f.write_str(message)
    }
}
