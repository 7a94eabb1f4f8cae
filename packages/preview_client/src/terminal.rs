use std::io::{self, Write};

/// Something that displays a demo's raw terminal output.
///
/// A surface has one fixed size for its whole life. Nothing in the preview
/// path ever resizes it; keeping it identical to the size the child was
/// started with is what keeps the two in sync.
pub trait TerminalSurface {
    /// `(cols, rows)`
    fn size(&self) -> (u16, u16);

    /// Apply output verbatim.
    fn write(&mut self, data: &str) -> io::Result<()>;

    /// Drop all state (screen, cursor, modes, scrollback) as if freshly
    /// created at the same size.
    fn reset(&mut self) -> io::Result<()>;
}

/// In-memory emulator, for tests and headless previews.
pub struct Vt100Surface {
    parser: vt100::Parser,
    cols: u16,
    rows: u16,
}

impl Vt100Surface {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            parser: vt100::Parser::new(rows, cols, 0),
            cols,
            rows,
        }
    }

    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    /// Visible text, rows joined with newlines
    pub fn contents(&self) -> String {
        self.parser.screen().contents()
    }
}

impl TerminalSurface for Vt100Surface {
    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        self.parser.process(data.as_bytes());
        Ok(())
    }

    fn reset(&mut self) -> io::Result<()> {
        // A new parser also forgets modes a plain clear would keep
        self.parser = vt100::Parser::new(self.rows, self.cols, 0);
        Ok(())
    }
}

/// RIS: full terminal reset
const HARD_RESET: &[u8] = b"\x1bc";

/// A real terminal behind any writer, usually stdout.
pub struct AnsiSurface<W: Write> {
    out: W,
    cols: u16,
    rows: u16,
}

impl<W: Write> AnsiSurface<W> {
    pub fn new(out: W, cols: u16, rows: u16) -> Self {
        Self { out, cols, rows }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> TerminalSurface for AnsiSurface<W> {
    fn size(&self) -> (u16, u16) {
        (self.cols, self.rows)
    }

    fn write(&mut self, data: &str) -> io::Result<()> {
        self.out.write_all(data.as_bytes())?;
        self.out.flush()
    }

    fn reset(&mut self) -> io::Result<()> {
        self.out.write_all(HARD_RESET)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vt100_write_and_reset() {
        let mut surface = Vt100Surface::new(20, 5);
        surface.write("hello\r\nworld").unwrap();
        assert_eq!(surface.contents(), "hello\nworld");

        surface.reset().unwrap();
        assert_eq!(surface.contents(), "");
        assert_eq!(surface.screen().cursor_position(), (0, 0));
        assert_eq!(surface.size(), (20, 5));
    }

    #[test]
    fn test_vt100_reset_clears_modes() {
        let mut surface = Vt100Surface::new(20, 5);
        // Alternate screen and hidden cursor
        surface.write("\x1b[?1049h\x1b[?25l").unwrap();
        assert!(surface.screen().alternate_screen());
        assert!(surface.screen().hide_cursor());

        surface.reset().unwrap();
        assert!(!surface.screen().alternate_screen());
        assert!(!surface.screen().hide_cursor());
    }

    #[test]
    fn test_vt100_wraps_at_fixed_width() {
        let mut surface = Vt100Surface::new(4, 3);
        surface.write("abcdef").unwrap();
        assert_eq!(surface.contents(), "abcdef");
        assert_eq!(surface.screen().cursor_position(), (1, 2));
    }

    #[test]
    fn test_ansi_surface_passes_bytes_through() {
        let mut surface = AnsiSurface::new(Vec::new(), 80, 24);
        surface.write("\x1b[1mbold").unwrap();
        surface.reset().unwrap();
        assert_eq!(surface.into_inner(), b"\x1b[1mbold\x1bc");
    }
}
