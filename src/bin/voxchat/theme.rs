//! ANSI color tokens so rendering code references semantic colors, not raw escapes.

/// Escape codes for one rendering profile. `plain()` keeps layout identical
/// with every code empty, for tests and NO_COLOR terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    pub info: &'static str,
    pub success: &'static str,
    pub warning: &'static str,
    pub error: &'static str,
    pub accent: &'static str,
    pub dim: &'static str,
    pub bold: &'static str,
    pub italic: &'static str,
    pub code: &'static str,
    pub reset: &'static str,
}

impl Palette {
    pub const fn colored() -> Self {
        Self {
            info: "\x1b[36m",
            success: "\x1b[32m",
            warning: "\x1b[33m",
            error: "\x1b[31m",
            accent: "\x1b[35m",
            dim: "\x1b[2m",
            bold: "\x1b[1m",
            italic: "\x1b[3m",
            code: "\x1b[96m",
            reset: "\x1b[0m",
        }
    }

    pub const fn plain() -> Self {
        Self {
            info: "",
            success: "",
            warning: "",
            error: "",
            accent: "",
            dim: "",
            bold: "",
            italic: "",
            code: "",
            reset: "",
        }
    }

    /// Honor an explicit opt-out plus the conventional NO_COLOR variable.
    pub fn detect(no_color_flag: bool) -> Self {
        if no_color_flag || std::env::var_os("NO_COLOR").is_some() {
            Self::plain()
        } else {
            Self::colored()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_palette_renders_no_escapes() {
        let palette = Palette::plain();
        assert!(palette.info.is_empty());
        assert!(palette.reset.is_empty());
    }

    #[test]
    fn colored_palette_resets() {
        let palette = Palette::colored();
        assert_eq!(palette.reset, "\x1b[0m");
    }
}
