use std::io::{self, Write};

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use crossterm::{
    cursor,
    event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    style::{Attribute, Print, SetAttribute},
    terminal::{Clear, ClearType},
};
use pdfedit_core::{Command, RenderImage};
use png::{BitDepth, ColorType, Encoder};
use tracing::debug;

mod editor;

pub use editor::{EditAction, TextEditor};

pub struct KittyRenderer<W: Write> {
    writer: W,
    image_id: u32,
    placement_id: u32,
}

pub struct DrawParams {
    pub columns: u32,
    pub rows: u32,
}

impl DrawParams {
    pub fn clamped(columns: u32, rows: u32) -> Self {
        Self {
            columns: columns.max(1),
            rows: rows.max(1),
        }
    }
}

impl<W: Write> KittyRenderer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            image_id: 1,
            placement_id: 1,
        }
    }

    pub fn writer(&mut self) -> &mut W {
        &mut self.writer
    }

    /// Transmits an RGB page image as PNG and places it at the cursor.
    pub fn draw(&mut self, image: &RenderImage, params: DrawParams) -> Result<()> {
        let mut buffer = Vec::new();
        let mut encoder = Encoder::new(&mut buffer, image.width, image.height);
        encoder.set_color(ColorType::Rgb);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&image.pixels)?;
        writer.finish()?;

        let encoded = BASE64.encode(&buffer);
        debug!(
            width = image.width,
            height = image.height,
            png_bytes = buffer.len(),
            columns = params.columns,
            rows = params.rows,
            "transmitting page image"
        );
        let mut chunks = encoded.as_bytes().chunks(4096).peekable();
        let mut first = true;

        while let Some(chunk) = chunks.next() {
            let more = chunks.peek().is_some();
            if first {
                write!(
                    self.writer,
                    "\u{1b}_Ga=T,f=100,C=1,q=2,i={},p={},c={},r={},s={},v={},z=-1,m={}",
                    self.image_id,
                    self.placement_id,
                    params.columns,
                    params.rows,
                    image.width,
                    image.height,
                    if more { 1 } else { 0 }
                )?;
                first = false;
            } else {
                write!(self.writer, "\u{1b}_Gm={},q=2", if more { 1 } else { 0 })?;
            }
            if !chunk.is_empty() {
                self.writer.write_all(b";")?;
                self.writer.write_all(chunk)?;
            }
            write!(self.writer, "\u{1b}\\")?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Removes every placed image, e.g. before the text editor takes over.
    pub fn delete_images(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}_Ga=d,d=A,q=2\u{1b}\\")?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn begin_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026h")?;
        Ok(())
    }

    /// Disables synchronized updates.
    /// The terminal will render all buffered changes at once.
    pub fn end_sync_update(&mut self) -> Result<()> {
        write!(self.writer, "\u{1b}[?2026l")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Clears the entire screen.
    pub fn clear_all(&mut self) -> Result<()> {
        crossterm::execute!(
            &mut self.writer,
            Clear(ClearType::All),
            cursor::MoveTo(0, 0)
        )?;
        Ok(())
    }
}

/// Draws the visible window of `editor` into the top `rows` rows and leaves
/// the terminal cursor on the editing position.
pub fn draw_editor<W: Write>(
    writer: &mut W,
    editor: &mut TextEditor,
    header: &str,
    columns: u16,
    rows: u16,
) -> Result<()> {
    let width = usize::from(columns.max(1));
    let body_rows = usize::from(rows.saturating_sub(1).max(1));
    editor.ensure_visible(body_rows);

    crossterm::queue!(
        writer,
        cursor::MoveTo(0, 0),
        Clear(ClearType::All),
        SetAttribute(Attribute::Reverse),
        Print(fit_to_width(header, width)),
        SetAttribute(Attribute::Reset)
    )?;
    for (offset, line) in editor.visible_lines(body_rows).enumerate() {
        crossterm::queue!(
            writer,
            cursor::MoveTo(0, (offset + 1) as u16),
            Print(truncate_chars(line, width))
        )?;
    }

    let (row, col) = editor.cursor();
    let screen_row = row.saturating_sub(editor.scroll_offset()) + 1;
    let screen_col = col.min(width.saturating_sub(1));
    crossterm::queue!(
        writer,
        cursor::MoveTo(screen_col as u16, screen_row as u16),
        cursor::Show
    )?;
    writer.flush()?;
    Ok(())
}

fn truncate_chars(text: &str, width: usize) -> String {
    text.chars()
        .map(|ch| if ch == '\t' { ' ' } else { ch })
        .take(width)
        .collect()
}

fn fit_to_width(text: &str, width: usize) -> String {
    let mut line = truncate_chars(text, width);
    let len = line.chars().count();
    if len < width {
        line.push_str(&" ".repeat(width - len));
    }
    line
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Search,
    Open,
    SaveAs,
}

impl PromptKind {
    fn label(&self) -> &'static str {
        match self {
            PromptKind::Search => "/",
            PromptKind::Open => "open: ",
            PromptKind::SaveAs => "save as: ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    Command(Command),
    BeginPrompt(PromptKind),
    PromptChanged { kind: PromptKind, value: String },
    PromptSubmit { kind: PromptKind, value: String },
    PromptCancel,
    Edit(EditAction),
    Quit,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    #[default]
    Normal,
    Edit,
    Prompt(PromptKind),
}

#[derive(Debug, Default)]
pub struct EventMapper {
    pending_count: Option<usize>,
    pending_digits: String,
    mode: InputMode,
    resume_mode: InputMode,
    prompt_buffer: String,
}

impl EventMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_mode(&mut self, mode: InputMode) {
        if self.mode != mode {
            self.reset_count();
            self.prompt_buffer.clear();
            self.mode = mode;
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn map_event(&mut self, event: Event) -> UiEvent {
        if let Event::Key(KeyEvent { kind, .. }) = event {
            if kind == KeyEventKind::Release {
                return UiEvent::None;
            }
        }
        match self.mode {
            InputMode::Normal => self.map_event_normal(event),
            InputMode::Edit => self.map_event_edit(event),
            InputMode::Prompt(kind) => self.map_event_prompt(kind, event),
        }
    }

    fn map_event_normal(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Char(c), KeyModifiers::NONE) if c.is_ascii_digit() => {
                    if let Some(digit) = c.to_digit(10) {
                        self.push_digit(digit as usize);
                    }
                    UiEvent::None
                }
                (KeyCode::Char('j'), KeyModifiers::NONE)
                | (KeyCode::Down, _)
                | (KeyCode::PageDown, _) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::Navigate {
                        delta: count as isize,
                    })
                }
                (KeyCode::Char('k'), KeyModifiers::NONE)
                | (KeyCode::Up, _)
                | (KeyCode::PageUp, _) => {
                    let count = self.take_count();
                    UiEvent::Command(Command::Navigate {
                        delta: -(count as isize),
                    })
                }
                (KeyCode::Char('g'), KeyModifiers::NONE) | (KeyCode::Home, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::Navigate { delta: isize::MIN })
                }
                (KeyCode::Char('G'), _) | (KeyCode::End, _) => {
                    self.reset_count();
                    UiEvent::Command(Command::Navigate { delta: isize::MAX })
                }
                (KeyCode::Char('+'), _) | (KeyCode::Char('='), _) => {
                    self.reset_count();
                    UiEvent::Command(Command::ZoomIn)
                }
                (KeyCode::Char('-'), _) => {
                    self.reset_count();
                    UiEvent::Command(Command::ZoomOut)
                }
                (KeyCode::Char('/'), KeyModifiers::NONE) => self.begin_prompt(PromptKind::Search),
                (KeyCode::Char('o'), KeyModifiers::NONE) => self.begin_prompt(PromptKind::Open),
                (KeyCode::Char('e'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::ToggleEdit)
                }
                (KeyCode::Char('x'), KeyModifiers::NONE) => {
                    self.reset_count();
                    UiEvent::Command(Command::Close)
                }
                (KeyCode::Char('q'), _) => {
                    self.reset_count();
                    UiEvent::Quit
                }
                _ => {
                    self.reset_count();
                    UiEvent::None
                }
            },
            _ => UiEvent::None,
        }
    }

    fn map_event_edit(&mut self, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => UiEvent::Command(Command::CancelEdit),
                (KeyCode::Char('s'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
                    self.begin_prompt(PromptKind::SaveAs)
                }
                (KeyCode::Enter, _) => UiEvent::Edit(EditAction::Newline),
                (KeyCode::Backspace, _) => UiEvent::Edit(EditAction::Backspace),
                (KeyCode::Delete, _) => UiEvent::Edit(EditAction::Delete),
                (KeyCode::Left, _) => UiEvent::Edit(EditAction::Left),
                (KeyCode::Right, _) => UiEvent::Edit(EditAction::Right),
                (KeyCode::Up, _) => UiEvent::Edit(EditAction::Up),
                (KeyCode::Down, _) => UiEvent::Edit(EditAction::Down),
                (KeyCode::Home, _) => UiEvent::Edit(EditAction::Home),
                (KeyCode::End, _) => UiEvent::Edit(EditAction::End),
                (KeyCode::Tab, _) => UiEvent::Edit(EditAction::Insert('\t')),
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    UiEvent::Edit(EditAction::Insert(c))
                }
                _ => UiEvent::None,
            },
            Event::Paste(text) => UiEvent::Edit(EditAction::InsertText(text)),
            _ => UiEvent::None,
        }
    }

    fn map_event_prompt(&mut self, kind: PromptKind, event: Event) -> UiEvent {
        match event {
            Event::Key(KeyEvent {
                code, modifiers, ..
            }) => match (code, modifiers) {
                (KeyCode::Esc, _) => {
                    let resume = self.resume_mode;
                    self.set_mode(resume);
                    UiEvent::PromptCancel
                }
                (KeyCode::Enter, _) => {
                    let value = self.prompt_buffer.clone();
                    let resume = self.resume_mode;
                    self.set_mode(resume);
                    UiEvent::PromptSubmit { kind, value }
                }
                (KeyCode::Backspace, _) => {
                    self.prompt_buffer.pop();
                    UiEvent::PromptChanged {
                        kind,
                        value: self.prompt_buffer.clone(),
                    }
                }
                (KeyCode::Char(c), mods) if mods.is_empty() || mods == KeyModifiers::SHIFT => {
                    self.prompt_buffer.push(c);
                    UiEvent::PromptChanged {
                        kind,
                        value: self.prompt_buffer.clone(),
                    }
                }
                _ => UiEvent::None,
            },
            Event::Paste(text) => {
                self.prompt_buffer.push_str(text.trim_end_matches(['\r', '\n']));
                UiEvent::PromptChanged {
                    kind,
                    value: self.prompt_buffer.clone(),
                }
            }
            _ => UiEvent::None,
        }
    }

    fn begin_prompt(&mut self, kind: PromptKind) -> UiEvent {
        self.resume_mode = self.mode;
        self.set_mode(InputMode::Prompt(kind));
        UiEvent::BeginPrompt(kind)
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.pending_count.unwrap_or(0);
        let next = current.saturating_mul(10).saturating_add(digit);
        self.pending_count = Some(next);
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.pending_digits.push(c);
        }
    }

    fn take_count(&mut self) -> usize {
        let count = self
            .pending_count
            .take()
            .filter(|&count| count > 0)
            .unwrap_or(1);
        self.pending_digits.clear();
        count
    }

    fn reset_count(&mut self) {
        self.pending_count = None;
        self.pending_digits.clear();
    }

    pub fn pending_input(&self) -> Option<String> {
        if let InputMode::Prompt(kind) = self.mode {
            return Some(format!("{}{}", kind.label(), self.prompt_buffer));
        }
        if self.pending_digits.is_empty() {
            None
        } else {
            Some(self.pending_digits.clone())
        }
    }
}

pub fn write_status_line<W: Write>(writer: &mut W, label: &str) -> io::Result<()> {
    write!(writer, "{}", label)?;
    writer.flush()
}
