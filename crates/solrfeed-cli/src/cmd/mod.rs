pub mod index;

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::config::Settings;

/// Print effective settings as a table on stderr.
pub fn show_config(settings: &Settings) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let secs = |d: Option<std::time::Duration>| {
        d.map_or_else(|| "none".to_string(), |d| format!("{}s", d.as_secs()))
    };

    table.add_row(vec![
        "Chunk size".to_string(),
        settings.pipeline.chunk_size.to_string(),
    ]);
    table.add_row(vec![
        "Workers".to_string(),
        settings.pipeline.workers.to_string(),
    ]);
    table.add_row(vec![
        "Request timeout".to_string(),
        secs(settings.http.request_timeout),
    ]);
    table.add_row(vec![
        "Connect timeout".to_string(),
        secs(settings.http.connect_timeout),
    ]);
    table.add_row(vec![
        "Relsyn collection".to_string(),
        settings.relsyn_collection.clone(),
    ]);

    eprintln!("\n{table}");
}
