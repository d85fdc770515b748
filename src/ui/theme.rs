//! Terminal styles, chosen once per process

use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// One style per kind of text the CLI prints
#[derive(Debug, Clone)]
pub struct Theme {
    pub title: Style,
    pub ok: Style,
    pub failure: Style,
    pub label: Style,
    pub faint: Style,
}

impl Theme {
    pub fn new(colored: bool) -> Self {
        if !colored {
            return Self {
                title: Style::new(),
                ok: Style::new(),
                failure: Style::new(),
                label: Style::new(),
                faint: Style::new(),
            };
        }
        Self {
            title: Style::new().cyan().bold(),
            ok: Style::new().green().bold(),
            failure: Style::new().red().bold(),
            label: Style::new().magenta(),
            faint: Style::new().bright_black(),
        }
    }
}

/// Colored when stdout is a terminal, plain when piped
pub fn theme() -> &'static Theme {
    THEME.get_or_init(|| Theme::new(console::Term::stdout().is_term()))
}
