//! Local terminal queries.

use crossterm::terminal;
use ptysh_core::PtySize;

/// Get the current terminal size as (columns, rows).
///
/// Falls back to (80, 24) if the size cannot be determined.
pub fn get_terminal_size() -> (u16, u16) {
    terminal::size().unwrap_or((80, 24))
}

/// The local terminal size as a pty size, for the initial child window.
pub fn local_pty_size() -> PtySize {
    let (cols, rows) = get_terminal_size();
    PtySize {
        rows,
        cols,
        ..PtySize::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_size_returns_nonzero() {
        let (cols, rows) = get_terminal_size();
        // Under a pipe we get the fallback values.
        assert!(cols > 0);
        assert!(rows > 0);
    }

    #[test]
    fn local_size_matches_terminal_size() {
        let (cols, rows) = get_terminal_size();
        let size = local_pty_size();
        assert_eq!((size.cols, size.rows), (cols, rows));
        assert_eq!(size.pixel_width, 0);
    }
}
