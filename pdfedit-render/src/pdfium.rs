use std::fmt;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use pdfedit_core::{
    DocumentHandle, DocumentInfo, DocumentProvider, PageSize, RenderImage, RenderRequest,
    SaveOptions, TextReplacement,
};
use pdfium_render::prelude::*;
use tracing::{debug, instrument, warn};

use crate::layout::{layout_text, metrics_for, FontMetrics};

pub struct PdfiumProvider {
    pdfium: Arc<Pdfium>,
}

impl PdfiumProvider {
    /// Binds pdfium from `library_path` when given, otherwise from the working
    /// directory and then the system library path.
    pub fn new(library_path: Option<&Path>) -> Result<Self> {
        Ok(Self {
            pdfium: Arc::new(bind_pdfium(library_path)?),
        })
    }
}

impl DocumentProvider for PdfiumProvider {
    #[instrument(skip(self))]
    fn open(&self, path: &Path) -> Result<Box<dyn DocumentHandle>> {
        let absolute = path
            .canonicalize()
            .with_context(|| format!("failed to resolve path for {:?}", path))?;
        let document = PdfiumDocument::open(Arc::clone(&self.pdfium), absolute)?;
        Ok(Box::new(document))
    }
}

struct PdfiumDocument {
    info: DocumentInfo,
    cache: Mutex<Option<RenderCacheEntry>>,
    document: Option<PdfDocument<'static>>,
    _pdfium: Arc<Pdfium>,
}

struct RenderCacheEntry {
    page_index: usize,
    scale: f32,
    image: RenderImage,
}

impl PdfiumDocument {
    fn open(pdfium: Arc<Pdfium>, path: PathBuf) -> Result<Self> {
        let document = pdfium
            .load_pdf_from_file(&path, None)
            .with_context(|| format!("failed to open {:?}", path))?;
        // SAFETY: the document borrows the bindings owned by `pdfium`. Struct fields drop in
        // declaration order, so `document` is dropped before this struct's `_pdfium` Arc, which
        // keeps the bindings alive for as long as the document exists.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let page_count = usize::try_from(document.pages().len()).unwrap_or_default();

        Ok(Self {
            info: DocumentInfo::new(path, page_count),
            cache: Mutex::new(None),
            document: Some(document),
            _pdfium: pdfium,
        })
    }

    fn document(&self) -> Result<&PdfDocument<'static>> {
        self.document
            .as_ref()
            .ok_or_else(|| anyhow!("document {:?} is closed", self.info.path))
    }

    fn document_mut(&mut self) -> Result<&mut PdfDocument<'static>> {
        let path = &self.info.path;
        self.document
            .as_mut()
            .ok_or_else(|| anyhow!("document {:?} is closed", path))
    }

    fn page(&self, page_index: usize) -> Result<PdfPage<'static>> {
        load_page(self.document()?, page_index)
    }

    fn render_internal(&self, request: &RenderRequest) -> Result<RenderImage> {
        let page = self.page(request.page_index)?;
        let config = PdfRenderConfig::new().scale_page_by_factor(request.scale.max(0.1));
        let bitmap = page
            .render_with_config(&config)
            .with_context(|| format!("failed to render page {}", request.page_index))?;
        let rgb = bitmap.as_image().to_rgb8();

        Ok(RenderImage {
            width: rgb.width(),
            height: rgb.height(),
            pixels: rgb.into_raw(),
        })
    }

    fn invalidate_cache(&self) {
        self.cache.lock().take();
    }
}

impl DocumentHandle for PdfiumDocument {
    fn info(&self) -> &DocumentInfo {
        &self.info
    }

    fn page_size(&self, page_index: usize) -> Result<PageSize> {
        let page = self.page(page_index)?;
        Ok(PageSize {
            width: page.width().value,
            height: page.height().value,
        })
    }

    fn extract_text(&self, page_index: usize) -> Result<String> {
        let page = self.page(page_index)?;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {}", page_index))?;
        Ok(text.all())
    }

    #[instrument(skip(self))]
    fn rasterize(&self, request: RenderRequest) -> Result<RenderImage> {
        {
            let cache = self.cache.lock();
            if let Some(entry) = cache.as_ref() {
                if entry.page_index == request.page_index
                    && (entry.scale - request.scale).abs() < f32::EPSILON
                {
                    return Ok(entry.image.clone());
                }
            }
        }

        let image = self.render_internal(&request)?;

        let mut cache = self.cache.lock();
        *cache = Some(RenderCacheEntry {
            page_index: request.page_index,
            scale: request.scale,
            image: image.clone(),
        });

        Ok(image)
    }

    fn find_text(&self, page_index: usize, query: &str) -> Result<bool> {
        if query.is_empty() {
            return Ok(false);
        }
        let page = self.page(page_index)?;
        let text = page
            .text()
            .with_context(|| format!("failed to extract text for page {}", page_index))?;
        let search = text
            .search(query, &PdfSearchOptions::new())
            .with_context(|| format!("failed to perform search on page {}", page_index))?;
        Ok(search.find_next().is_some())
    }

    #[instrument(skip(self, replacement), fields(chars = replacement.text.len()))]
    fn replace_page_text(
        &mut self,
        page_index: usize,
        replacement: &TextReplacement,
    ) -> Result<()> {
        let metrics = metrics_for(&replacement.font_name)
            .ok_or_else(|| anyhow!("unsupported font {:?}", replacement.font_name))?;
        let layout = layout_text(
            &replacement.text,
            &replacement.rect,
            replacement.font_size,
            metrics,
            replacement.align,
        );
        if layout.dropped > 0 {
            warn!(
                page = page_index,
                dropped = layout.dropped,
                "replacement text does not fit the text box; trailing lines dropped"
            );
        }

        let document = self.document_mut()?;
        let font = builtin_font(document, metrics);
        let mut page = load_page(document, page_index)?;
        let page_height = page.height().value;
        let objects = page.objects_mut();

        let mut removed = 0usize;
        while !objects.is_empty() {
            let last = objects.len() - 1;
            objects
                .remove_object_at_index(last)
                .with_context(|| format!("failed to clear content of page {}", page_index))?;
            removed += 1;
        }

        for line in layout.lines.iter().filter(|line| !line.text.is_empty()) {
            // Page space has its origin at the bottom-left corner.
            objects
                .create_text_object(
                    PdfPoints::new(line.x),
                    PdfPoints::new(page_height - line.baseline),
                    &line.text,
                    font,
                    PdfPoints::new(replacement.font_size),
                )
                .with_context(|| format!("failed to insert text on page {}", page_index))?;
        }
        debug!(
            page = page_index,
            removed,
            lines = layout.lines.len(),
            "replaced page content"
        );

        self.invalidate_cache();
        Ok(())
    }

    #[instrument(skip(self))]
    fn save(&mut self, path: &Path, options: SaveOptions) -> Result<()> {
        // Pdfium always writes a complete, non-incremental copy and exposes no switch for
        // garbage collection or stream compression; the rewrite is the compaction.
        debug!(
            compact = options.compact,
            deflate = options.deflate,
            "writing full document copy"
        );
        self.document()?
            .save_to_file(path)
            .with_context(|| format!("failed to write {:?}", path))
    }

    fn close(&mut self) {
        self.invalidate_cache();
        if self.document.take().is_some() {
            debug!(path = %self.info.path.display(), "closed pdfium document");
        }
    }
}

fn load_page(document: &PdfDocument<'static>, page_index: usize) -> Result<PdfPage<'static>> {
    let index: PdfPageIndex = page_index
        .try_into()
        .map_err(|_| anyhow!("page {} is out of supported range", page_index))?;
    document
        .pages()
        .get(index)
        .with_context(|| format!("page {} out of range", page_index))
}

fn builtin_font(document: &mut PdfDocument<'static>, metrics: &FontMetrics) -> PdfFontToken {
    let fonts = document.fonts_mut();
    match metrics.base_font {
        "Courier" => fonts.courier(),
        "Times-Roman" => fonts.times_roman(),
        _ => fonts.helvetica(),
    }
}

/// Where pdfium may be loaded from, in the order candidates are tried.
enum LibrarySource {
    File(PathBuf),
    System,
}

impl LibrarySource {
    fn candidates(library_path: Option<&Path>) -> Vec<LibrarySource> {
        match library_path {
            Some(dir) if dir.is_dir() => vec![LibrarySource::File(
                Pdfium::pdfium_platform_library_name_at_path(dir),
            )],
            Some(file) => vec![LibrarySource::File(file.to_path_buf())],
            None => vec![
                LibrarySource::File(Pdfium::pdfium_platform_library_name_at_path("./")),
                LibrarySource::System,
            ],
        }
    }

    fn bind(&self) -> Result<Box<dyn PdfiumLibraryBindings>, PdfiumError> {
        match self {
            LibrarySource::File(path) => Pdfium::bind_to_library(path),
            LibrarySource::System => Pdfium::bind_to_system_library(),
        }
    }
}

impl fmt::Display for LibrarySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LibrarySource::File(path) => write!(f, "{}", path.display()),
            LibrarySource::System => f.write_str("system library path"),
        }
    }
}

/// An explicit `library_path` is the only candidate; otherwise the working
/// directory is tried before the system library path.
fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium> {
    let mut failures = Vec::new();
    for source in LibrarySource::candidates(library_path) {
        match source.bind() {
            Ok(bindings) => {
                debug!(library = %source, "bound pdfium");
                return Ok(Pdfium::new(bindings));
            }
            Err(err) => failures.push(format!("{source}: {err}")),
        }
    }
    Err(anyhow!(
        "failed to bind to a pdfium library; pass --pdfium-lib or install it ({})",
        failures.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_library_file_is_the_only_candidate() {
        let candidates = LibrarySource::candidates(Some(Path::new("/opt/pdfium/libpdfium.so")));

        assert_eq!(candidates.len(), 1);
        assert!(matches!(
            &candidates[0],
            LibrarySource::File(path) if path == Path::new("/opt/pdfium/libpdfium.so")
        ));
    }

    #[test]
    fn library_directory_resolves_platform_file_name() {
        let dir = std::env::temp_dir();
        let candidates = LibrarySource::candidates(Some(&dir));

        assert_eq!(candidates.len(), 1);
        assert!(matches!(
            &candidates[0],
            LibrarySource::File(path) if path.starts_with(&dir) && path != &dir
        ));
    }

    #[test]
    fn default_candidates_try_working_directory_then_system() {
        let candidates = LibrarySource::candidates(None);

        assert_eq!(candidates.len(), 2);
        assert!(matches!(&candidates[0], LibrarySource::File(_)));
        assert!(matches!(&candidates[1], LibrarySource::System));
        assert_eq!(candidates[1].to_string(), "system library path");
    }
}
