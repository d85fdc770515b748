//! Status lines printed by the CLI

use crate::ui::theme;
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("🗄️  {}", text.style(theme().title.clone()));
}

pub fn success(text: &str) {
    println!("✅ {}", text.style(theme().ok.clone()));
}

pub fn error(text: &str) {
    eprintln!("❌ {}", text.style(theme().failure.clone()));
}

/// `label: value` with the label de-emphasized
pub fn info(label: &str, value: &str) {
    println!("   {}: {}", label.style(theme().label.clone()), value);
}

/// Placeholder line for an empty listing, e.g. `(no rows)`
pub fn empty(what: &str) {
    println!("{}", format!("(no {})", what).style(theme().faint.clone()));
}
