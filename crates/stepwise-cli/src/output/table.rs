//! Table formatting using comfy-table

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use std::io::IsTerminal;
use stepwise_dap::AdapterAvailability;

fn create_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);

    if std::io::stdout().is_terminal() {
        let header_cells: Vec<Cell> = headers
            .iter()
            .map(|h| Cell::new(h).fg(Color::Cyan))
            .collect();
        table.set_header(header_cells);
    } else {
        table.set_header(headers);
    }
    table
}

pub fn print_adapters(adapters: &[AdapterAvailability]) {
    if adapters.is_empty() {
        println!("No adapters registered");
        return;
    }

    let mut table = create_table(&["LANGUAGE", "AVAILABLE", "ADAPTER", "EXECUTABLE", "VERSION"]);
    for adapter in adapters {
        let available = if adapter.available { "✓" } else { "✗" };
        let executable = adapter
            .executable
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            adapter.language.to_string(),
            available.to_string(),
            adapter.adapter_name.clone().unwrap_or_else(|| "-".to_string()),
            executable,
            adapter.version.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    println!("{table}");

    for adapter in adapters.iter().filter(|a| !a.available) {
        if let Some(guidance) = &adapter.install_guidance {
            println!("{}: {}", adapter.language, guidance);
        }
        for error in &adapter.errors {
            println!("  error: {}", error);
        }
    }
    for adapter in adapters {
        for warning in &adapter.warnings {
            println!("{}: warning: {}", adapter.language, warning);
        }
    }
}
