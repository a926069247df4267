//! Console styling helpers.

use console::Style;

use uidsync_core::models::EntityKind;

/// Green check mark prefix.
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Red cross prefix.
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Yellow warning prefix.
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Bold section heading.
pub fn header(msg: &str) -> String {
    Style::new().bold().apply_to(msg).to_string()
}

/// Dimmed secondary text.
pub fn dim(msg: &str) -> String {
    Style::new().dim().apply_to(msg).to_string()
}

/// `old → new`, with the new ID highlighted.
pub fn remap(old_id: u32, new_id: u32) -> String {
    format!(
        "{} → {}",
        Style::new().dim().apply_to(old_id),
        Style::new().cyan().bold().apply_to(new_id)
    )
}

/// `user` in blue, `group` in magenta.
pub fn kind(kind: EntityKind) -> String {
    let style = match kind {
        EntityKind::User => Style::new().blue(),
        EntityKind::Group => Style::new().magenta(),
    };
    style.apply_to(kind).to_string()
}
