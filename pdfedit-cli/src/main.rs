use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossterm::cursor;
use crossterm::event::{self, DisableBracketedPaste, EnableBracketedPaste, Event};
use crossterm::style::Print;
use crossterm::terminal::{self, Clear, ClearType, SetTitle};
use directories::ProjectDirs;
use pdfedit_core::{
    Command, DocumentProvider, Effect, Mode, Notice, NoticeLevel, PageView, RenderImage, Viewer,
    ViewerConfig, APP_NAME,
};
use pdfedit_render::PdfProvider;
use pdfedit_tty::{
    draw_editor, write_status_line, DrawParams, EventMapper, InputMode, KittyRenderer, PromptKind,
    TextEditor, UiEvent,
};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

const CONFIG_FILE: &str = "config.toml";
const SPLASH: &str = "No PDF open. Press o to open a file, q to quit.";

#[derive(Debug, Parser)]
#[command(
    name = "pdfedit",
    version,
    about = "Terminal PDF viewer with single-page text editing"
)]
struct Args {
    /// PDF file to open on start
    file: Option<PathBuf>,

    /// Page to open the document on (1-based)
    #[arg(short = 'p', long = "page")]
    page: Option<usize>,

    /// Zoom change per zoom-in/zoom-out step
    #[arg(long, value_name = "FACTOR")]
    zoom_step: Option<f32>,

    /// Smallest zoom factor
    #[arg(long, value_name = "FACTOR")]
    zoom_floor: Option<f32>,

    /// Pdfium shared library, or the directory containing it
    #[arg(long, value_name = "PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Viewer config file [default: config.toml in the platform config dir]
    #[arg(short = 'c', long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `pdfedit_core=trace` [default: $RUST_LOG or info]
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

struct RawModeGuard;

impl RawModeGuard {
    fn new() -> anyhow::Result<Self> {
        terminal::enable_raw_mode()?;
        crossterm::execute!(io::stdout(), EnableBracketedPaste)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = crossterm::execute!(stdout, DisableBracketedPaste, cursor::Show);
        let _ = terminal::disable_raw_mode();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", APP_NAME, APP_NAME)
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let _log_guard = init_logging(&project_dirs, args.log_level.as_deref())?;

    let config = resolve_config(&args, &project_dirs.config_dir().join(CONFIG_FILE))?;
    debug!(?config, "viewer config resolved");
    let provider = PdfProvider::new(args.pdfium_lib.as_deref())?;
    let mut app = App::new(Viewer::new(provider, config));

    if let Some(path) = &args.file {
        app.dispatch(Command::Open { path: path.clone() });
        if let Some(page) = args.page.filter(|_| app.viewer.document().is_some()) {
            let delta = page.saturating_sub(1) as isize;
            app.dispatch(Command::Navigate { delta });
        }
    }

    let _raw = RawModeGuard::new()?;
    let mut stdout = io::stdout();
    crossterm::execute!(stdout, cursor::Hide)?;
    let mut renderer = KittyRenderer::new(stdout);
    let mut dirty = Redraw::Full;

    loop {
        match dirty {
            Redraw::Full => app.redraw(&mut renderer)?,
            Redraw::Status => app.draw_status(&mut renderer)?,
            Redraw::None => {}
        }
        dirty = Redraw::None;

        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        let ev = event::read()?;
        if let Event::Resize(..) = ev {
            dirty = Redraw::Full;
            continue;
        }
        let ui_event = app.mapper.map_event(ev);
        match app.handle_event(ui_event) {
            LoopAction::Continue(redraw) => dirty = redraw,
            LoopAction::Quit => break,
        }
    }

    {
        let mut writer = renderer.writer();
        crossterm::execute!(&mut writer, Clear(ClearType::All), cursor::MoveTo(0, 0))?;
    }
    renderer.delete_images()?;
    info!("exiting");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redraw {
    None,
    Status,
    Full,
}

#[derive(Debug, PartialEq, Eq)]
enum LoopAction {
    Continue(Redraw),
    Quit,
}

/// Presentation state derived from the effects the viewer has emitted.
struct App<P> {
    viewer: Viewer<P>,
    mapper: EventMapper,
    view: Option<PageView>,
    editor: Option<(usize, TextEditor)>,
    notice: Option<Notice>,
}

impl<P: DocumentProvider> App<P> {
    fn new(viewer: Viewer<P>) -> Self {
        Self {
            viewer,
            mapper: EventMapper::new(),
            view: None,
            editor: None,
            notice: None,
        }
    }

    fn dispatch(&mut self, command: Command) {
        self.notice = None;
        let effects = self.viewer.apply(command);
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Render(view) => {
                    self.view = Some(view);
                    self.editor = None;
                }
                Effect::ShowEditor { page_index, text } => {
                    self.editor = Some((page_index, TextEditor::new(&text)));
                }
                Effect::Notice(notice) => {
                    if notice.level != NoticeLevel::Info {
                        warn!(title = %notice.title, message = %notice.message, "notice");
                    }
                    self.notice = Some(notice);
                }
                Effect::Cleared => {
                    self.view = None;
                    self.editor = None;
                }
            }
        }

        // A failed open cancels editing without emitting a render.
        if self.viewer.mode() != Mode::Editing {
            self.editor = None;
        }
        if !matches!(self.mapper.mode(), InputMode::Prompt(_)) {
            let mode = if self.editor.is_some() {
                InputMode::Edit
            } else {
                InputMode::Normal
            };
            self.mapper.set_mode(mode);
        }
    }

    fn handle_event(&mut self, event: UiEvent) -> LoopAction {
        match event {
            UiEvent::Command(command) => {
                self.dispatch(command);
                LoopAction::Continue(Redraw::Full)
            }
            UiEvent::BeginPrompt(_) | UiEvent::PromptChanged { .. } | UiEvent::PromptCancel => {
                LoopAction::Continue(self.status_redraw())
            }
            UiEvent::PromptSubmit { kind, value } => {
                self.submit_prompt(kind, value);
                LoopAction::Continue(Redraw::Full)
            }
            UiEvent::Edit(action) => match self.editor.as_mut() {
                Some((_, editor)) => {
                    editor.apply(action);
                    LoopAction::Continue(Redraw::Full)
                }
                None => LoopAction::Continue(Redraw::None),
            },
            UiEvent::Quit => LoopAction::Quit,
            UiEvent::None => LoopAction::Continue(self.status_redraw()),
        }
    }

    fn submit_prompt(&mut self, kind: PromptKind, value: String) {
        match kind {
            PromptKind::Search => self.dispatch(Command::Search { query: value }),
            PromptKind::Open => {
                let value = value.trim();
                if !value.is_empty() {
                    self.dispatch(Command::Open {
                        path: PathBuf::from(value),
                    });
                }
            }
            PromptKind::SaveAs => {
                let text = self
                    .editor
                    .as_ref()
                    .map(|(_, editor)| editor.contents())
                    .unwrap_or_default();
                self.dispatch(Command::SetEditBuffer { text });
                if self.notice.is_none() {
                    self.dispatch(Command::Save {
                        path: PathBuf::from(value.trim()),
                    });
                }
            }
        }
    }

    /// The editor owns the cursor, so it is redrawn whole to keep it placed.
    fn status_redraw(&self) -> Redraw {
        if self.editor.is_some() {
            Redraw::Full
        } else {
            Redraw::Status
        }
    }

    fn status_text(&self) -> String {
        let title = self.view.as_ref().map(|view| view.title.as_str());
        format_status(
            title,
            &self.viewer.page_label(),
            self.notice.as_ref(),
            self.mapper.pending_input().as_deref(),
        )
    }

    fn redraw<W: Write>(&mut self, renderer: &mut KittyRenderer<W>) -> Result<()> {
        let window = terminal::window_size()?;
        let total_cols = u32::from(window.columns).max(1);
        let total_rows = u32::from(window.rows).max(1);
        let body_rows = total_rows.saturating_sub(1).max(1);

        renderer.begin_sync_update()?;
        renderer.delete_images()?;
        renderer.clear_all()?;
        crossterm::queue!(renderer.writer(), SetTitle(self.viewer.title()))?;

        if let Some((page_index, editor)) = self.editor.as_mut() {
            let header = format!(
                "Editing page {}. Esc cancels, Ctrl-S saves as a new file.",
                *page_index + 1
            );
            draw_editor(
                renderer.writer(),
                editor,
                &header,
                window.columns,
                body_rows as u16,
            )?;
        } else if let Some(view) = &self.view {
            let cell = (window.width > 0 && window.height > 0).then(|| {
                (
                    f32::from(window.width) / total_cols as f32,
                    f32::from(window.height) / total_rows as f32,
                )
            });
            let placement = place_image(
                view.image.width,
                view.image.height,
                cell,
                total_cols,
                body_rows,
            );
            let image = crop_image(&view.image, placement.crop_width, placement.crop_height);
            crossterm::queue!(renderer.writer(), cursor::Hide, cursor::MoveTo(0, 0))?;
            renderer.draw(
                &image,
                DrawParams::clamped(placement.columns, placement.rows),
            )?;
        } else {
            crossterm::queue!(
                renderer.writer(),
                cursor::Hide,
                cursor::MoveTo(0, 0),
                Print(SPLASH)
            )?;
        }

        self.write_status(renderer, total_rows)?;
        if let Some((_, editor)) = self.editor.as_ref() {
            // Put the cursor back on the editing position after the status row.
            let (row, col) = editor.cursor();
            let screen_row = row.saturating_sub(editor.scroll_offset()) + 1;
            crossterm::queue!(
                renderer.writer(),
                cursor::MoveTo(col.min(usize::from(u16::MAX)) as u16, screen_row as u16)
            )?;
        }
        renderer.end_sync_update()?;
        Ok(())
    }

    fn draw_status<W: Write>(&self, renderer: &mut KittyRenderer<W>) -> Result<()> {
        let window = terminal::window_size()?;
        self.write_status(renderer, u32::from(window.rows).max(1))
    }

    fn write_status<W: Write>(&self, renderer: &mut KittyRenderer<W>, total_rows: u32) -> Result<()> {
        let status_row = total_rows.saturating_sub(1);
        let writer = renderer.writer();
        crossterm::queue!(
            writer,
            cursor::MoveTo(0, status_row as u16),
            Clear(ClearType::CurrentLine)
        )?;
        write_status_line(writer, &self.status_text())?;
        Ok(())
    }
}

fn format_status(
    title: Option<&str>,
    page_label: &str,
    notice: Option<&Notice>,
    pending_input: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(title) = title {
        parts.push(title.to_string());
    }
    parts.push(page_label.to_string());
    if let Some(notice) = notice {
        parts.push(format!("{}: {}", notice.title, notice.message));
    }
    if let Some(pending) = pending_input.filter(|s| !s.is_empty()) {
        parts.push(pending.to_string());
    }
    parts.join(" | ")
}

/// How much of a page image to show and over how many cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    crop_width: u32,
    crop_height: u32,
    columns: u32,
    rows: u32,
}

/// Shows the image at its rendered size when the cell size in pixels is
/// known, cropping whatever exceeds the available cells. Without pixel
/// metrics the whole image is fitted, assuming cells twice as tall as wide.
fn place_image(
    width: u32,
    height: u32,
    cell: Option<(f32, f32)>,
    available_cols: u32,
    available_rows: u32,
) -> Placement {
    let available_cols = available_cols.max(1);
    let available_rows = available_rows.max(1);

    if width == 0 || height == 0 {
        return Placement {
            crop_width: width,
            crop_height: height,
            columns: available_cols,
            rows: available_rows,
        };
    }

    match cell.filter(|(w, h)| w.is_finite() && h.is_finite() && *w > 0.0 && *h > 0.0) {
        Some((cell_width, cell_height)) => {
            let max_width = ((available_cols as f32 * cell_width).floor() as u32).max(1);
            let max_height = ((available_rows as f32 * cell_height).floor() as u32).max(1);
            let crop_width = width.min(max_width);
            let crop_height = height.min(max_height);
            let columns = ((crop_width as f32 / cell_width).round() as u32).clamp(1, available_cols);
            let rows = ((crop_height as f32 / cell_height).round() as u32).clamp(1, available_rows);
            Placement {
                crop_width,
                crop_height,
                columns,
                rows,
            }
        }
        None => {
            let ratio = 2.0 * width as f32 / height as f32;
            let mut columns = available_cols as f32;
            let mut rows = (columns / ratio).round().max(1.0);
            if rows > available_rows as f32 {
                rows = available_rows as f32;
                columns = (rows * ratio).round().clamp(1.0, available_cols as f32);
            }
            Placement {
                crop_width: width,
                crop_height: height,
                columns: columns as u32,
                rows: rows as u32,
            }
        }
    }
}

/// Top-left `width` x `height` region of `image`.
fn crop_image(image: &RenderImage, width: u32, height: u32) -> RenderImage {
    if width >= image.width && height >= image.height {
        return image.clone();
    }

    let width = width.min(image.width).max(1);
    let height = height.min(image.height).max(1);
    let stride = image.width as usize * RenderImage::CHANNELS;
    let row_len = width as usize * RenderImage::CHANNELS;
    let mut pixels = Vec::with_capacity(row_len * height as usize);

    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(&image.pixels[start..start + row_len]);
    }

    RenderImage {
        width,
        height,
        pixels,
    }
}

/// File config (explicit `--config`, else the default location if present)
/// with command-line overrides applied on top.
fn resolve_config(args: &Args, default_path: &Path) -> Result<ViewerConfig> {
    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None if default_path.is_file() => ViewerConfig::load(default_path)?,
        None => ViewerConfig::default(),
    };
    if let Some(step) = args.zoom_step {
        config.zoom_step = step;
    }
    if let Some(floor) = args.zoom_floor {
        config.zoom_floor = floor;
    }
    config
        .validate()
        .context("invalid viewer settings on the command line")?;
    Ok(config)
}

fn init_logging(project_dirs: &ProjectDirs, level: Option<&str>) -> Result<WorkerGuard> {
    let log_dir = project_dirs.data_local_dir().join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "pdfedit.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = match level {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid log level {directives:?}"))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    // The terminal is in raw mode while running, so logs only go to the file.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}
