use std::fmt;

use crate::error::LaunchError;

/// Terminal dimensions a demo is rendered at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    /// Validate dimensions coming off the wire.
    pub fn new(cols: i64, rows: i64) -> Result<Self, LaunchError> {
        match (u16::try_from(cols), u16::try_from(rows)) {
            (Ok(c), Ok(r)) if c > 0 && r > 0 => Ok(Self { cols: c, rows: r }),
            _ => Err(LaunchError::InvalidDimensions { cols, rows }),
        }
    }

    /// Variables that tell a child which size to render at and that it
    /// should emit color even though stdout is not a TTY.
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            ("COLUMNS".to_string(), self.cols.to_string()),
            ("LINES".to_string(), self.rows.to_string()),
            ("TERM".to_string(), "xterm-256color".to_string()),
            ("COLORTERM".to_string(), "truecolor".to_string()),
            ("FORCE_COLOR".to_string(), "1".to_string()),
            ("CLICOLOR_FORCE".to_string(), "1".to_string()),
        ]
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl fmt::Display for TermSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}
