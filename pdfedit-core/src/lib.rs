use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod error;
mod viewer;

pub use error::{Rejection, ViewerError};
pub use viewer::{
    Command, EditSession, Effect, Mode, Notice, NoticeLevel, PageView, Viewer,
    APP_NAME,
};

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3f0d4c2e-8a51-5b7e-9c1d-6e2a7b4f9d10").expect("valid namespace UUID")
});

pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&*DOCUMENT_NAMESPACE, rendered.as_bytes())
}

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub id: DocumentId,
    pub path: PathBuf,
    pub page_count: usize,
}

impl DocumentInfo {
    pub fn new(path: PathBuf, page_count: usize) -> Self {
        Self {
            id: document_id_for_path(&path),
            path,
            page_count,
        }
    }

    /// File name shown in titles, falling back to the full path.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: usize,
    pub scale: f32,
}

/// Rasterized page, tightly packed RGB8 rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RenderImage {
    pub const CHANNELS: usize = 3;
}

/// Page dimensions in points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

/// Rectangle in page points, origin at the top-left corner of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl TextBox {
    pub fn inset(size: PageSize, margin: f32) -> Self {
        Self {
            left: margin,
            top: margin,
            right: (size.width - margin).max(margin),
            bottom: (size.height - margin).max(margin),
        }
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

impl fmt::Display for TextAlign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        };
        f.write_str(name)
    }
}

/// Plain text that replaces everything drawn on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextReplacement {
    pub text: String,
    pub rect: TextBox,
    pub font_size: f32,
    pub font_name: String,
    pub align: TextAlign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Drop unreferenced objects and rewrite the file from scratch.
    pub compact: bool,
    pub deflate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compact: true,
            deflate: true,
        }
    }
}

/// An open document. Dropping the handle releases it; `close` releases it
/// eagerly.
pub trait DocumentHandle {
    fn info(&self) -> &DocumentInfo;

    fn page_size(&self, page_index: usize) -> Result<PageSize>;
    fn extract_text(&self, page_index: usize) -> Result<String>;
    fn rasterize(&self, request: RenderRequest) -> Result<RenderImage>;
    fn find_text(&self, page_index: usize, query: &str) -> Result<bool>;
    fn replace_page_text(&mut self, page_index: usize, replacement: &TextReplacement)
        -> Result<()>;
    fn save(&mut self, path: &Path, options: SaveOptions) -> Result<()>;
    fn close(&mut self) {}
}

pub trait DocumentProvider {
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub default_zoom: f32,
    pub zoom_step: f32,
    pub zoom_floor: f32,
    /// Upper zoom bound; unbounded when unset.
    pub zoom_ceiling: Option<f32>,
    /// Inset of the replacement text box from every page edge, in points.
    pub text_margin: f32,
    pub font_size: f32,
    pub font_name: String,
    pub align: TextAlign,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_zoom: 1.0,
            zoom_step: 0.2,
            zoom_floor: 0.4,
            zoom_ceiling: None,
            text_margin: 50.0,
            font_size: 10.0,
            font_name: "helv".to_string(),
            align: TextAlign::Left,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("failed to parse viewer config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("invalid config file {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.zoom_step.is_finite() && self.zoom_step > 0.0,
            "zoom_step must be positive, got {}",
            self.zoom_step
        );
        ensure!(
            self.zoom_floor.is_finite() && self.zoom_floor > 0.0,
            "zoom_floor must be positive, got {}",
            self.zoom_floor
        );
        ensure!(
            self.zoom_floor <= self.default_zoom,
            "default_zoom {} must not be below zoom_floor {}",
            self.default_zoom,
            self.zoom_floor
        );
        if let Some(ceiling) = self.zoom_ceiling {
            ensure!(
                self.default_zoom <= ceiling,
                "default_zoom {} must not exceed zoom_ceiling {}",
                self.default_zoom,
                ceiling
            );
        }
        ensure!(
            self.text_margin >= 0.0,
            "text_margin must not be negative, got {}",
            self.text_margin
        );
        ensure!(
            self.font_size > 0.0,
            "font_size must be positive, got {}",
            self.font_size
        );
        ensure!(!self.font_name.trim().is_empty(), "font_name must not be empty");
        Ok(())
    }
}
