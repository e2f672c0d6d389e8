//! Terminal rendering of a brochure that may be re-shown many times while it streams.

use brochure_common::Result;
use brochure_web::MarkdownDisplay;
use crossterm::{
    cursor::{MoveToColumn, MoveUp},
    queue,
    style::Print,
    terminal::{self, Clear, ClearType},
};
use std::io::{self, IsTerminal, Stdout, Write};

const FALLBACK_WIDTH: u16 = 80;

/// Shows markdown on a terminal, rewriting only the part that changed since
/// the previous call. Without a terminal the text is held back and written
/// once by [`TerminalDisplay::finish`].
pub struct TerminalDisplay<W: Write> {
    out: W,
    interactive: bool,
    width: u16,
    shown: String,
}

impl TerminalDisplay<Stdout> {
    pub fn stdout() -> Self {
        let out = io::stdout();
        let interactive = out.is_terminal();
        let width = terminal::size()
            .map(|(cols, _)| cols)
            .unwrap_or(FALLBACK_WIDTH);
        Self::new(out, interactive, width)
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, interactive: bool, width: u16) -> Self {
        Self {
            out,
            interactive,
            width: width.max(1),
            shown: String::new(),
        }
    }

    /// Terminate the output with a newline, flushing held-back text first.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.interactive {
            self.out.write_all(self.shown.as_bytes())?;
        }
        if !self.shown.is_empty() {
            self.out.write_all(b"\n")?;
        }
        self.out.flush()
    }

    fn redraw(&mut self, markdown: &str) -> io::Result<()> {
        let keep = common_prefix_len(&self.shown, markdown);
        if keep < self.shown.len() {
            let (end_row, _) = cursor_offset(&self.shown, self.width);
            let (row, col) = cursor_offset(&self.shown[..keep], self.width);
            let up = end_row - row;
            if up > 0 {
                queue!(self.out, MoveUp(clamp_u16(up)))?;
            }
            queue!(
                self.out,
                MoveToColumn(clamp_u16(col)),
                Clear(ClearType::FromCursorDown)
            )?;
        }
        queue!(self.out, Print(&markdown[keep..]))?;
        self.out.flush()
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> MarkdownDisplay for TerminalDisplay<W> {
    fn show(&mut self, markdown: &str) -> Result<()> {
        if self.interactive {
            self.redraw(markdown)?;
        }
        self.shown.clear();
        self.shown.push_str(markdown);
        Ok(())
    }
}

fn clamp_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}

/// Byte length of the longest common prefix, on a char boundary.
pub fn common_prefix_len(a: &str, b: &str) -> usize {
    a.char_indices()
        .zip(b.chars())
        .find(|((_, ca), cb)| ca != cb)
        .map(|((idx, _), _)| idx)
        .unwrap_or_else(|| a.len().min(b.len()))
}

/// Row and column the cursor ends on after printing `text` from column 0 of
/// a terminal `width` cells wide. Every char counts as one cell.
pub fn cursor_offset(text: &str, width: u16) -> (usize, usize) {
    let width = usize::from(width.max(1));
    let (mut row, mut col) = (0, 0);
    for c in text.chars() {
        if c == '\n' {
            row += 1;
            col = 0;
            continue;
        }
        if col == width {
            row += 1;
            col = 0;
        }
        col += 1;
    }
    (row, col.min(width - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(display: TerminalDisplay<Vec<u8>>) -> String {
        String::from_utf8(display.into_inner()).unwrap()
    }

    #[test]
    fn prefix_len_respects_char_boundaries() {
        assert_eq!(common_prefix_len("héllo", "hélp"), 4);
        assert_eq!(common_prefix_len("abc", "abcdef"), 3);
        assert_eq!(common_prefix_len("abcdef", "abc"), 3);
        assert_eq!(common_prefix_len("", "x"), 0);
        assert_eq!(common_prefix_len("é", "è"), 0);
    }

    #[test]
    fn offset_counts_newlines_and_wraps() {
        assert_eq!(cursor_offset("", 80), (0, 0));
        assert_eq!(cursor_offset("abc", 80), (0, 3));
        assert_eq!(cursor_offset("ab\ncd", 80), (1, 2));
        assert_eq!(cursor_offset("abcdef", 4), (1, 2));
        assert_eq!(cursor_offset("abcd\nx", 4), (1, 1));
    }

    #[test]
    fn appended_text_prints_only_the_tail() {
        let mut display = TerminalDisplay::new(Vec::new(), true, 80);
        display.show("# Ac").unwrap();
        display.show("# Acme\nRockets").unwrap();
        assert_eq!(output(display), "# Acme\nRockets");
    }

    #[test]
    fn diverging_text_clears_back_to_the_change() {
        let mut display = TerminalDisplay::new(Vec::new(), true, 80);
        display.show("```mark").unwrap();
        display.show("\n# Acme").unwrap();
        let out = output(display);
        assert!(out.starts_with("```mark"));
        // Clear(FromCursorDown) then the replacement text.
        assert!(out.ends_with("\x1b[J\n# Acme"));
    }

    #[test]
    fn non_interactive_output_is_written_once_at_finish() {
        let mut display = TerminalDisplay::new(Vec::new(), false, 80);
        display.show("mark").unwrap();
        display.show("\n# Acme").unwrap();
        display.finish().unwrap();
        assert_eq!(output(display), "\n# Acme\n");
    }

    #[test]
    fn finish_on_nothing_writes_nothing() {
        let mut display = TerminalDisplay::new(Vec::new(), false, 80);
        display.finish().unwrap();
        assert_eq!(output(display), "");
    }
}
