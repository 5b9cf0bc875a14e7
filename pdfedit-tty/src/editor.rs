//! Multi-line text buffer backing the edit surface.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    Insert(char),
    InsertText(String),
    Newline,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
}

/// Cursor positions are in chars, not bytes.
#[derive(Debug, Clone)]
pub struct TextEditor {
    lines: Vec<String>,
    row: usize,
    col: usize,
    scroll: usize,
}

impl TextEditor {
    pub fn new(text: &str) -> Self {
        let lines: Vec<String> = text
            .split('\n')
            .map(|line| line.trim_end_matches('\r').to_string())
            .collect();
        Self {
            lines,
            row: 0,
            col: 0,
            scroll: 0,
        }
    }

    pub fn contents(&self) -> String {
        self.lines.join("\n")
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll
    }

    pub fn visible_lines(&self, height: usize) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .skip(self.scroll)
            .take(height)
            .map(String::as_str)
    }

    /// Scrolls so the cursor row lies within a window of `height` rows.
    pub fn ensure_visible(&mut self, height: usize) {
        let height = height.max(1);
        if self.row < self.scroll {
            self.scroll = self.row;
        } else if self.row >= self.scroll + height {
            self.scroll = self.row + 1 - height;
        }
    }

    /// Applies one action; returns true when the text changed.
    pub fn apply(&mut self, action: EditAction) -> bool {
        match action {
            EditAction::Insert(ch) => {
                if ch == '\n' {
                    self.split_line();
                } else {
                    let at = self.byte_offset();
                    self.lines[self.row].insert(at, ch);
                    self.col += 1;
                }
                true
            }
            EditAction::InsertText(text) => {
                let mut changed = false;
                for ch in text.chars().filter(|&ch| ch != '\r') {
                    changed |= self.apply(EditAction::Insert(ch));
                }
                changed
            }
            EditAction::Newline => {
                self.split_line();
                true
            }
            EditAction::Backspace => {
                if self.col > 0 {
                    self.col -= 1;
                    let at = self.byte_offset();
                    self.lines[self.row].remove(at);
                    true
                } else if self.row > 0 {
                    let tail = self.lines.remove(self.row);
                    self.row -= 1;
                    self.col = self.line_len(self.row);
                    self.lines[self.row].push_str(&tail);
                    true
                } else {
                    false
                }
            }
            EditAction::Delete => {
                if self.col < self.line_len(self.row) {
                    let at = self.byte_offset();
                    self.lines[self.row].remove(at);
                    true
                } else if self.row + 1 < self.lines.len() {
                    let next = self.lines.remove(self.row + 1);
                    self.lines[self.row].push_str(&next);
                    true
                } else {
                    false
                }
            }
            EditAction::Left => {
                if self.col > 0 {
                    self.col -= 1;
                } else if self.row > 0 {
                    self.row -= 1;
                    self.col = self.line_len(self.row);
                }
                false
            }
            EditAction::Right => {
                if self.col < self.line_len(self.row) {
                    self.col += 1;
                } else if self.row + 1 < self.lines.len() {
                    self.row += 1;
                    self.col = 0;
                }
                false
            }
            EditAction::Up => {
                if self.row > 0 {
                    self.row -= 1;
                    self.col = self.col.min(self.line_len(self.row));
                }
                false
            }
            EditAction::Down => {
                if self.row + 1 < self.lines.len() {
                    self.row += 1;
                    self.col = self.col.min(self.line_len(self.row));
                }
                false
            }
            EditAction::Home => {
                self.col = 0;
                false
            }
            EditAction::End => {
                self.col = self.line_len(self.row);
                false
            }
        }
    }

    fn split_line(&mut self) {
        let at = self.byte_offset();
        let tail = self.lines[self.row].split_off(at);
        self.row += 1;
        self.col = 0;
        self.lines.insert(self.row, tail);
    }

    fn line_len(&self, row: usize) -> usize {
        self.lines[row].chars().count()
    }

    fn byte_offset(&self) -> usize {
        let line = &self.lines[self.row];
        line.char_indices()
            .nth(self.col)
            .map(|(offset, _)| offset)
            .unwrap_or(line.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(editor: &mut TextEditor, text: &str) {
        for ch in text.chars() {
            editor.apply(EditAction::Insert(ch));
        }
    }

    #[test]
    fn empty_text_starts_with_one_line() {
        let editor = TextEditor::new("");
        assert_eq!(editor.visible_lines(10).collect::<Vec<_>>(), vec![""]);
        assert_eq!(editor.contents(), "");
    }

    #[test]
    fn contents_round_trip_page_text() {
        let text = "Invoice 42\n\nTotal: 10 EUR\n";
        let editor = TextEditor::new(text);
        assert_eq!(editor.visible_lines(10).count(), 4);
        assert_eq!(editor.contents(), text);
    }

    #[test]
    fn carriage_returns_are_stripped() {
        let editor = TextEditor::new("a\r\nb\r\n");
        assert_eq!(editor.contents(), "a\nb\n");
    }

    #[test]
    fn typing_and_newline_split_lines() {
        let mut editor = TextEditor::new("");
        typed(&mut editor, "Hello");
        editor.apply(EditAction::Newline);
        typed(&mut editor, "World");

        assert_eq!(editor.contents(), "Hello\nWorld");
        assert_eq!(editor.cursor(), (1, 5));
    }

    #[test]
    fn newline_in_middle_moves_tail_down() {
        let mut editor = TextEditor::new("abcd");
        editor.apply(EditAction::Right);
        editor.apply(EditAction::Right);
        editor.apply(EditAction::Newline);

        assert_eq!(editor.contents(), "ab\ncd");
        assert_eq!(editor.cursor(), (1, 0));
    }

    #[test]
    fn backspace_at_line_start_joins_lines() {
        let mut editor = TextEditor::new("ab\ncd");
        editor.apply(EditAction::Down);

        assert!(editor.apply(EditAction::Backspace));
        assert_eq!(editor.contents(), "abcd");
        assert_eq!(editor.cursor(), (0, 2));
    }

    #[test]
    fn backspace_at_start_of_buffer_is_noop() {
        let mut editor = TextEditor::new("ab");
        assert!(!editor.apply(EditAction::Backspace));
        assert_eq!(editor.contents(), "ab");
    }

    #[test]
    fn delete_at_line_end_joins_next_line() {
        let mut editor = TextEditor::new("ab\ncd");
        editor.apply(EditAction::End);

        assert!(editor.apply(EditAction::Delete));
        assert_eq!(editor.contents(), "abcd");
        assert!(!editor.apply(EditAction::End));
        assert!(!editor.apply(EditAction::Delete));
    }

    #[test]
    fn vertical_moves_clamp_column() {
        let mut editor = TextEditor::new("long line\nab");
        editor.apply(EditAction::End);
        editor.apply(EditAction::Down);

        assert_eq!(editor.cursor(), (1, 2));
        editor.apply(EditAction::Down);
        assert_eq!(editor.cursor(), (1, 2));
    }

    #[test]
    fn multibyte_chars_are_edited_by_char() {
        let mut editor = TextEditor::new("héllo");
        editor.apply(EditAction::Right);
        editor.apply(EditAction::Right);
        editor.apply(EditAction::Backspace);
        typed(&mut editor, "e");

        assert_eq!(editor.contents(), "hello");
    }

    #[test]
    fn pasted_text_keeps_line_breaks() {
        let mut editor = TextEditor::new("");
        assert!(editor.apply(EditAction::InsertText("one\r\ntwo".to_string())));
        assert_eq!(editor.contents(), "one\ntwo");
        assert_eq!(editor.cursor(), (1, 3));
    }

    #[test]
    fn ensure_visible_scrolls_to_cursor() {
        let mut editor = TextEditor::new("1\n2\n3\n4\n5");
        for _ in 0..4 {
            editor.apply(EditAction::Down);
        }
        editor.ensure_visible(2);
        assert_eq!(editor.scroll_offset(), 3);
        assert_eq!(editor.visible_lines(2).collect::<Vec<_>>(), vec!["4", "5"]);

        for _ in 0..4 {
            editor.apply(EditAction::Up);
        }
        editor.ensure_visible(2);
        assert_eq!(editor.scroll_offset(), 0);
    }
}
