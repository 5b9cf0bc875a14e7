//! Word-wrapping of replacement text into a page text box, measured with the
//! AFM widths of the standard Type1 fonts.

use std::mem;

use pdfedit_core::{TextAlign, TextBox};
use textwrap::core::Fragment;
use textwrap::wrap_algorithms::wrap_first_fit;

/// Advance used for characters outside printable ASCII, in 1/1000 em.
const FALLBACK_WIDTH: u16 = 556;
const LINE_SPACING: f32 = 1.2;

#[derive(Debug)]
pub struct FontMetrics {
    pub base_font: &'static str,
    /// Widths of characters 32..=126, in 1/1000 em.
    widths: [u16; 95],
    ascent: f32,
    descent: f32,
}

impl FontMetrics {
    pub fn char_width(&self, ch: char, font_size: f32) -> f32 {
        let units = match ch as u32 {
            code @ 32..=126 => self.widths[(code - 32) as usize],
            _ => FALLBACK_WIDTH,
        };
        f32::from(units) * font_size / 1000.0
    }

    pub fn text_width(&self, text: &str, font_size: f32) -> f32 {
        text.chars().map(|ch| self.char_width(ch, font_size)).sum()
    }

    pub fn ascent(&self, font_size: f32) -> f32 {
        self.ascent * font_size / 1000.0
    }

    pub fn descent(&self, font_size: f32) -> f32 {
        self.descent * font_size / 1000.0
    }
}

#[rustfmt::skip]
static HELVETICA: FontMetrics = FontMetrics {
    base_font: "Helvetica",
    widths: [
        278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
        556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
        1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
        667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
        333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
        556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
    ],
    ascent: 718.0,
    descent: 207.0,
};

static COURIER: FontMetrics = FontMetrics {
    base_font: "Courier",
    widths: [600; 95],
    ascent: 629.0,
    descent: 157.0,
};

#[rustfmt::skip]
static TIMES_ROMAN: FontMetrics = FontMetrics {
    base_font: "Times-Roman",
    widths: [
        250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
        500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
        921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
        556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
        333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
        500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
    ],
    ascent: 683.0,
    descent: 217.0,
};

/// Resolves the short font names used for replacement text.
pub fn metrics_for(font_name: &str) -> Option<&'static FontMetrics> {
    match font_name.to_ascii_lowercase().as_str() {
        "helv" | "helvetica" => Some(&HELVETICA),
        "cour" | "courier" => Some(&COURIER),
        "tiro" | "times" | "times-roman" => Some(&TIMES_ROMAN),
        _ => None,
    }
}

/// One line of text positioned in page points, origin at the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub baseline: f32,
    pub width: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<PlacedLine>,
    /// Lines that did not fit below the box's bottom edge.
    pub dropped: usize,
}

pub fn layout_text(
    text: &str,
    rect: &TextBox,
    font_size: f32,
    metrics: &FontMetrics,
    align: TextAlign,
) -> TextLayout {
    let max_width = rect.width();
    let line_height = font_size * LINE_SPACING;
    let ascent = metrics.ascent(font_size);
    let descent = metrics.descent(font_size);

    let mut layout = TextLayout::default();
    let wrapped = text
        .lines()
        .flat_map(|paragraph| wrap_paragraph(paragraph, max_width, font_size, metrics));

    for (row, line) in wrapped.enumerate() {
        let baseline = ascent + row as f32 * line_height;
        if baseline + descent > rect.height() + f32::EPSILON {
            layout.dropped += 1;
            continue;
        }
        let width = metrics.text_width(&line, font_size);
        let offset = match align {
            TextAlign::Left | TextAlign::Justify => 0.0,
            TextAlign::Center => ((max_width - width) / 2.0).max(0.0),
            TextAlign::Right => (max_width - width).max(0.0),
        };
        layout.lines.push(PlacedLine {
            text: line,
            x: rect.left + offset,
            baseline: rect.top + baseline,
            width,
        });
    }

    layout
}

/// A word, or a piece of an over-long word, measured in points.
#[derive(Debug)]
struct Word {
    text: String,
    width: f64,
    /// Space that follows the word when another one shares its line.
    space: f64,
}

impl Fragment for Word {
    fn width(&self) -> f64 {
        self.width
    }

    fn whitespace_width(&self) -> f64 {
        self.space
    }

    fn penalty_width(&self) -> f64 {
        0.0
    }
}

fn wrap_paragraph(
    paragraph: &str,
    max_width: f32,
    font_size: f32,
    metrics: &FontMetrics,
) -> Vec<String> {
    let space = f64::from(metrics.char_width(' ', font_size));
    let mut words = Vec::new();
    for word in paragraph.split_whitespace() {
        if metrics.text_width(word, font_size) <= max_width {
            words.push(measure(word.to_string(), space, font_size, metrics));
            continue;
        }
        let mut pieces = break_word(word, max_width, font_size, metrics);
        let last = pieces.pop();
        words.extend(pieces.into_iter().map(|piece| measure(piece, 0.0, font_size, metrics)));
        words.extend(last.map(|piece| measure(piece, space, font_size, metrics)));
    }
    if words.is_empty() {
        return vec![String::new()];
    }

    wrap_first_fit(&words, &[f64::from(max_width)])
        .into_iter()
        .map(|line| {
            let mut text = String::new();
            for (index, word) in line.iter().enumerate() {
                text.push_str(&word.text);
                if index + 1 < line.len() && word.space > 0.0 {
                    text.push(' ');
                }
            }
            text
        })
        .collect()
}

fn measure(text: String, space: f64, font_size: f32, metrics: &FontMetrics) -> Word {
    Word {
        width: f64::from(metrics.text_width(&text, font_size)),
        text,
        space,
    }
}

/// Splits a word wider than the box; every piece holds at least one char.
fn break_word(word: &str, max_width: f32, font_size: f32, metrics: &FontMetrics) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut piece = String::new();
    let mut piece_width = 0.0;
    for ch in word.chars() {
        let width = metrics.char_width(ch, font_size);
        if !piece.is_empty() && piece_width + width > max_width {
            pieces.push(mem::take(&mut piece));
            piece_width = 0.0;
        }
        piece.push(ch);
        piece_width += width;
    }
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_box(width: f32, height: f32) -> TextBox {
        TextBox {
            left: 50.0,
            top: 50.0,
            right: 50.0 + width,
            bottom: 50.0 + height,
        }
    }

    fn texts(layout: &TextLayout) -> Vec<&str> {
        layout.lines.iter().map(|line| line.text.as_str()).collect()
    }

    #[test]
    fn font_names_resolve_case_insensitively() {
        assert_eq!(metrics_for("helv").unwrap().base_font, "Helvetica");
        assert_eq!(metrics_for("Courier").unwrap().base_font, "Courier");
        assert_eq!(metrics_for("tiro").unwrap().base_font, "Times-Roman");
        assert!(metrics_for("comic-sans").is_none());
    }

    #[test]
    fn helvetica_widths_follow_afm() {
        let helv = metrics_for("helv").unwrap();
        assert!((helv.char_width('a', 10.0) - 5.56).abs() < 1e-4);
        assert!((helv.char_width('W', 1000.0) - 944.0).abs() < 1e-3);
        assert!((helv.char_width('é', 10.0) - 5.56).abs() < 1e-4);
    }

    #[test]
    fn single_line_sits_on_first_baseline() {
        let helv = metrics_for("helv").unwrap();
        let layout = layout_text("Hello", &text_box(500.0, 600.0), 10.0, helv, TextAlign::Left);

        assert_eq!(texts(&layout), vec!["Hello"]);
        let line = &layout.lines[0];
        assert_eq!(line.x, 50.0);
        assert!((line.baseline - (50.0 + 7.18)).abs() < 1e-3);
        assert_eq!(layout.dropped, 0);
    }

    #[test]
    fn words_wrap_at_box_width() {
        let helv = metrics_for("helv").unwrap();
        // Each word is 55.6pt wide at 10pt; two of them plus a space exceed 100pt.
        let layout = layout_text(
            "aaaaaaaaaa bbbbbbbbbb",
            &text_box(100.0, 600.0),
            10.0,
            helv,
            TextAlign::Left,
        );

        assert_eq!(texts(&layout), vec!["aaaaaaaaaa", "bbbbbbbbbb"]);
        assert!((layout.lines[1].baseline - layout.lines[0].baseline - 12.0).abs() < 1e-3);
    }

    #[test]
    fn explicit_newlines_and_blank_lines_are_kept() {
        let helv = metrics_for("helv").unwrap();
        let layout = layout_text("one\n\ntwo", &text_box(300.0, 600.0), 10.0, helv, TextAlign::Left);

        assert_eq!(texts(&layout), vec!["one", "", "two"]);
    }

    #[test]
    fn overlong_word_is_broken_across_lines() {
        let cour = metrics_for("cour").unwrap();
        // 6pt per char at 10pt Courier, so 30pt holds five chars.
        let layout = layout_text(
            "abcdefghijkl",
            &text_box(30.0, 600.0),
            10.0,
            cour,
            TextAlign::Left,
        );

        assert_eq!(texts(&layout), vec!["abcde", "fghij", "kl"]);
    }

    #[test]
    fn broken_word_tail_shares_line_with_next_word() {
        let cour = metrics_for("cour").unwrap();
        // Five chars per 30pt line; "kl" + space + "mn" is exactly 30pt.
        let layout = layout_text(
            "abcdefghijkl mn",
            &text_box(30.0, 600.0),
            10.0,
            cour,
            TextAlign::Left,
        );

        assert_eq!(texts(&layout), vec!["abcde", "fghij", "kl mn"]);
    }

    #[test]
    fn short_words_fill_lines_greedily() {
        let cour = metrics_for("cour").unwrap();
        // 6pt per char: "ab cd" is 30pt and fits a 32pt box, "ef" does not.
        let layout = layout_text(
            "ab cd ef",
            &text_box(32.0, 600.0),
            10.0,
            cour,
            TextAlign::Left,
        );

        assert_eq!(texts(&layout), vec!["ab cd", "ef"]);
    }

    #[test]
    fn lines_below_the_box_are_dropped() {
        let helv = metrics_for("helv").unwrap();
        let layout = layout_text("a\nb\nc", &text_box(300.0, 20.0), 10.0, helv, TextAlign::Left);

        assert_eq!(texts(&layout), vec!["a"]);
        assert_eq!(layout.dropped, 2);
    }

    #[test]
    fn center_and_right_alignment_offset_lines() {
        let cour = metrics_for("cour").unwrap();
        let rect = text_box(100.0, 600.0);

        let centered = layout_text("abcde", &rect, 10.0, cour, TextAlign::Center);
        let right = layout_text("abcde", &rect, 10.0, cour, TextAlign::Right);

        assert!((centered.lines[0].x - 85.0).abs() < 1e-3);
        assert!((right.lines[0].x - 120.0).abs() < 1e-3);
    }

    #[test]
    fn empty_text_produces_no_lines() {
        let helv = metrics_for("helv").unwrap();
        let layout = layout_text("", &text_box(100.0, 100.0), 10.0, helv, TextAlign::Left);

        assert!(layout.lines.is_empty());
        assert_eq!(layout.dropped, 0);
    }
}
