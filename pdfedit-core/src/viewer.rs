//! The page-display / edit-mode state machine.
//!
//! A [`Viewer`] owns the open document, the current page, the zoom factor and
//! the optional edit session. Every user action arrives as a [`Command`]; the
//! viewer validates it against the current [`Mode`], calls into the document
//! handle and answers with the [`Effect`]s the presentation layer must apply.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{Rejection, ViewerError};
use crate::{
    document_id_for_path, DocumentHandle, DocumentInfo, DocumentProvider, RenderImage,
    RenderRequest, SaveOptions, TextBox, TextReplacement, ViewerConfig,
};

pub const APP_NAME: &str = "pdfedit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    NoDocument,
    Viewing,
    Editing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Open { path: PathBuf },
    Close,
    Navigate { delta: isize },
    ZoomIn,
    ZoomOut,
    Zoom { delta: f32 },
    Search { query: String },
    EnterEdit,
    CancelEdit,
    ToggleEdit,
    SetEditBuffer { text: String },
    Save { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageView {
    pub page_index: usize,
    pub page_count: usize,
    pub scale: f32,
    pub image: RenderImage,
    pub title: String,
    pub page_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Show the page image in place of whatever is on screen.
    Render(PageView),
    /// Swap the page image for the text editor, seeded with `text`.
    ShowEditor { page_index: usize, text: String },
    Notice(Notice),
    /// No document is open anymore.
    Cleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn from_error(err: &ViewerError) -> Self {
        match err {
            ViewerError::InvalidTransition(rejection) => Self {
                level: NoticeLevel::Warning,
                title: rejection.title().to_string(),
                message: rejection.to_string(),
            },
            ViewerError::OpenFailure { source, .. } => Self {
                level: NoticeLevel::Error,
                title: "Error".to_string(),
                message: format!("Failed to open PDF: {source:#}"),
            },
            ViewerError::SaveFailure { source, .. } => Self {
                level: NoticeLevel::Error,
                title: "Error".to_string(),
                message: format!("Failed to save PDF: {source:#}"),
            },
            ViewerError::Document { .. } => Self {
                level: NoticeLevel::Error,
                title: "Error".to_string(),
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ViewSettings {
    zoom: f32,
}

impl ViewSettings {
    fn with_zoom(zoom: f32) -> Self {
        Self { zoom }
    }
}

/// Text captured from one page while it is being edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    page_index: usize,
    original: String,
    buffer: String,
}

impl EditSession {
    fn capture(page_index: usize, text: String) -> Self {
        Self {
            page_index,
            buffer: text.clone(),
            original: text,
        }
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }

    /// Text extracted from the page when editing began.
    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn is_modified(&self) -> bool {
        self.original != self.buffer
    }
}

struct DocumentSession {
    handle: Box<dyn DocumentHandle>,
    info: DocumentInfo,
    current_page: usize,
    edit: Option<EditSession>,
}

pub struct Viewer<P> {
    provider: P,
    config: ViewerConfig,
    settings: ViewSettings,
    session: Option<DocumentSession>,
}

impl<P: DocumentProvider> Viewer<P> {
    pub fn new(provider: P, config: ViewerConfig) -> Self {
        let settings = ViewSettings::with_zoom(config.default_zoom);
        Self {
            provider,
            config,
            settings,
            session: None,
        }
    }

    pub fn mode(&self) -> Mode {
        match &self.session {
            None => Mode::NoDocument,
            Some(session) if session.edit.is_some() => Mode::Editing,
            Some(_) => Mode::Viewing,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn zoom(&self) -> f32 {
        self.settings.zoom
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.session.as_ref().map(|session| &session.info)
    }

    pub fn current_page(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.current_page)
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        self.session.as_ref().and_then(|session| session.edit.as_ref())
    }

    pub fn title(&self) -> String {
        match &self.session {
            Some(session) => format!(
                "{} - {} (Page {}/{})",
                APP_NAME,
                session.info.display_name(),
                session.current_page + 1,
                session.info.page_count
            ),
            None => APP_NAME.to_string(),
        }
    }

    pub fn page_label(&self) -> String {
        match &self.session {
            Some(session) => format!(
                "Page: {}/{}",
                session.current_page + 1,
                session.info.page_count
            ),
            None => "Page: -/-".to_string(),
        }
    }

    /// Runs one command. Failures come back as a [`Effect::Notice`]; the viewer
    /// stays usable after any of them.
    pub fn apply(&mut self, command: Command) -> Vec<Effect> {
        debug!(?command, mode = ?self.mode(), "applying command");
        let result = match command {
            Command::Open { path } => self.open(&path),
            Command::Close => Ok(self.close()),
            Command::Navigate { delta } => self.navigate(delta),
            Command::ZoomIn => self.step_zoom(self.config.zoom_step),
            Command::ZoomOut => self.step_zoom(-self.config.zoom_step),
            Command::Zoom { delta } => self.zoom_by(delta),
            Command::Search { query } => self.search(&query),
            Command::EnterEdit => self.enter_edit(),
            Command::CancelEdit => self.cancel_edit(),
            Command::ToggleEdit => self.toggle_edit(),
            Command::SetEditBuffer { text } => self.set_edit_buffer(text),
            Command::Save { path } => self.save(&path),
        };

        match result {
            Ok(effects) => effects,
            Err(err) => {
                if err.is_recoverable_warning() {
                    warn!(%err, "command rejected");
                } else {
                    error!(error = %err, "command failed");
                }
                vec![Effect::Notice(Notice::from_error(&err))]
            }
        }
    }

    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn open(&mut self, path: &Path) -> Result<Vec<Effect>, ViewerError> {
        if let Some(session) = self.session.as_mut() {
            if session.edit.take().is_some() {
                debug!("discarded edit session before opening another document");
            }
        }

        let mut handle = self
            .provider
            .open(path)
            .map_err(|source| ViewerError::OpenFailure {
                path: path.to_path_buf(),
                source,
            })?;
        let info = handle.info().clone();
        if info.page_count == 0 {
            handle.close();
            return Err(ViewerError::OpenFailure {
                path: path.to_path_buf(),
                source: anyhow!("document has no pages"),
            });
        }

        self.release_session();
        info!(id = %info.id, pages = info.page_count, "opened document");
        self.session = Some(DocumentSession {
            handle,
            info,
            current_page: 0,
            edit: None,
        });
        self.settings = ViewSettings::with_zoom(self.config.default_zoom);

        Ok(vec![self.render_current()?])
    }

    pub fn close(&mut self) -> Vec<Effect> {
        if self.session.is_none() {
            return Vec::new();
        }
        self.release_session();
        self.settings = ViewSettings::with_zoom(self.config.default_zoom);
        vec![Effect::Cleared]
    }

    pub fn navigate(&mut self, delta: isize) -> Result<Vec<Effect>, ViewerError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(Vec::new());
        };
        if session.edit.is_some() {
            return Err(Rejection::NavigateWhileEditing.into());
        }

        let target = clamp_page(session.current_page, delta, session.info.page_count);
        if target == session.current_page {
            return Ok(Vec::new());
        }
        session.current_page = target;
        Ok(vec![self.render_current()?])
    }

    /// Moves the zoom by `delta`, never below the configured floor (nor above
    /// the ceiling, when one is configured).
    pub fn zoom_by(&mut self, delta: f32) -> Result<Vec<Effect>, ViewerError> {
        self.set_zoom(self.settings.zoom + delta)
    }

    /// One zoom-in/zoom-out step. Snapped to 1/100 so repeated steps land on
    /// the same values instead of accumulating float error.
    fn step_zoom(&mut self, step: f32) -> Result<Vec<Effect>, ViewerError> {
        self.set_zoom(round_zoom(self.settings.zoom + step))
    }

    fn set_zoom(&mut self, requested: f32) -> Result<Vec<Effect>, ViewerError> {
        let Some(session) = self.session.as_ref() else {
            return Err(Rejection::NoDocumentToZoom.into());
        };
        if session.edit.is_some() {
            return Err(Rejection::ZoomWhileEditing.into());
        }

        let mut next = requested.max(self.config.zoom_floor);
        if let Some(ceiling) = self.config.zoom_ceiling {
            next = next.min(ceiling);
        }
        if next == self.settings.zoom {
            return Ok(Vec::new());
        }
        debug!(from = self.settings.zoom, to = next, "zoom changed");
        self.settings.zoom = next;
        Ok(vec![self.render_current()?])
    }

    /// Finds the first page, counting from the start of the document, that
    /// contains `query` and makes it the current page.
    #[instrument(skip(self))]
    pub fn search(&mut self, query: &str) -> Result<Vec<Effect>, ViewerError> {
        let Some(session) = self.session.as_mut() else {
            return Err(Rejection::NoDocumentToSearch.into());
        };
        if session.edit.is_some() {
            return Err(Rejection::SearchWhileEditing.into());
        }
        if query.is_empty() {
            return Ok(Vec::new());
        }

        for page_index in 0..session.info.page_count {
            let found = session
                .handle
                .find_text(page_index, query)
                .map_err(|err| {
                    ViewerError::document(format!("search page {}", page_index + 1), err)
                })?;
            if found {
                session.current_page = page_index;
                let render = self.render_current()?;
                return Ok(vec![
                    render,
                    Effect::Notice(Notice::info(
                        "Found",
                        format!("Text found on page {}", page_index + 1),
                    )),
                ]);
            }
        }

        Ok(vec![Effect::Notice(Notice::info(
            "Not Found",
            "Text not found in PDF.",
        ))])
    }

    pub fn enter_edit(&mut self) -> Result<Vec<Effect>, ViewerError> {
        let Some(session) = self.session.as_mut() else {
            return Err(Rejection::NoDocumentToEdit.into());
        };
        if session.edit.is_some() {
            return Err(Rejection::AlreadyEditing.into());
        }

        let page_index = session.current_page;
        let text = session.handle.extract_text(page_index).map_err(|err| {
            ViewerError::document(format!("extract text of page {}", page_index + 1), err)
        })?;
        debug!(page = page_index, chars = text.len(), "entered edit mode");
        session.edit = Some(EditSession::capture(page_index, text.clone()));

        Ok(vec![
            Effect::ShowEditor { page_index, text },
            Effect::Notice(Notice::info(
                "Edit Mode",
                "You are now editing the current page's text. Cancel to discard it, or save to write a new PDF file.",
            )),
        ])
    }

    pub fn set_edit_buffer(&mut self, text: String) -> Result<Vec<Effect>, ViewerError> {
        let edit = self
            .session
            .as_mut()
            .and_then(|session| session.edit.as_mut())
            .ok_or(Rejection::NotEditing)?;
        edit.buffer = text;
        Ok(Vec::new())
    }

    pub fn cancel_edit(&mut self) -> Result<Vec<Effect>, ViewerError> {
        let edit = self
            .session
            .as_mut()
            .and_then(|session| session.edit.take())
            .ok_or(Rejection::NotEditing)?;
        debug!(
            page = edit.page_index,
            modified = edit.is_modified(),
            "cancelled edit mode"
        );
        Ok(vec![self.render_current()?])
    }

    pub fn toggle_edit(&mut self) -> Result<Vec<Effect>, ViewerError> {
        match self.mode() {
            Mode::NoDocument => Err(Rejection::NoDocumentToEdit.into()),
            Mode::Viewing => self.enter_edit(),
            Mode::Editing => self.cancel_edit(),
        }
    }

    /// Replaces the edited page's content with the buffer text and writes the
    /// whole document to `path`. The open document stays the working copy.
    #[instrument(skip(self, path), fields(path = %path.display()))]
    pub fn save(&mut self, path: &Path) -> Result<Vec<Effect>, ViewerError> {
        let config = &self.config;
        let session = self
            .session
            .as_mut()
            .filter(|session| session.edit.is_some())
            .ok_or(Rejection::NotEditing)?;
        let save_failure = |source: anyhow::Error| ViewerError::SaveFailure {
            path: path.to_path_buf(),
            source,
        };

        if path.as_os_str().is_empty() {
            return Err(save_failure(anyhow!("no output path given")));
        }
        if document_id_for_path(path) == session.info.id {
            return Err(save_failure(anyhow!(
                "refusing to overwrite the open document in place"
            )));
        }

        let (page_index, text) = match session.edit.as_ref() {
            Some(edit) => (edit.page_index, edit.buffer.trim().to_string()),
            None => return Err(Rejection::NotEditing.into()),
        };
        let size = session.handle.page_size(page_index).map_err(save_failure)?;
        let replacement = TextReplacement {
            text,
            rect: TextBox::inset(size, config.text_margin),
            font_size: config.font_size,
            font_name: config.font_name.clone(),
            align: config.align,
        };
        let written = session
            .handle
            .replace_page_text(page_index, &replacement)
            .and_then(|()| {
                session.handle.save(
                    path,
                    SaveOptions {
                        compact: true,
                        deflate: true,
                    },
                )
            });
        if let Err(source) = written {
            // The replacement may already be applied to the working copy.
            match self.provider.open(&session.info.path) {
                Ok(fresh) => {
                    session.handle.close();
                    session.handle = fresh;
                    debug!("reloaded working copy after failed save");
                }
                Err(err) => {
                    error!(error = %err, "failed to reload working copy after failed save");
                    return Err(save_failure(source.context(format!(
                        "the open document could not be reloaded and may show unsaved changes: {err:#}"
                    ))));
                }
            }
            return Err(save_failure(source));
        }

        session.edit = None;
        info!(page = page_index, "saved edited page to new file");

        Ok(vec![
            self.render_current()?,
            Effect::Notice(Notice::info(
                "Saved",
                format!(
                    "Modified PDF saved successfully to: {}",
                    path.display()
                ),
            )),
        ])
    }

    fn render_current(&self) -> Result<Effect, ViewerError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ViewerError::document("render", anyhow!("no document is open")))?;
        let request = RenderRequest {
            page_index: session.current_page,
            scale: self.settings.zoom,
        };
        let image = session.handle.rasterize(request).map_err(|err| {
            ViewerError::document(format!("render page {}", session.current_page + 1), err)
        })?;

        Ok(Effect::Render(PageView {
            page_index: session.current_page,
            page_count: session.info.page_count,
            scale: self.settings.zoom,
            image,
            title: self.title(),
            page_label: self.page_label(),
        }))
    }

    fn release_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            if session.edit.is_some() {
                debug!("discarding edit session with the document");
            }
            session.handle.close();
            debug!(id = %session.info.id, "released document");
        }
    }
}

fn clamp_page(current: usize, delta: isize, page_count: usize) -> usize {
    let last = page_count.saturating_sub(1) as isize;
    (current as isize).saturating_add(delta).clamp(0, last) as usize
}

fn round_zoom(zoom: f32) -> f32 {
    (zoom * 100.0).round() / 100.0
}
