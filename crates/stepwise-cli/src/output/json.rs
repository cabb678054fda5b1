//! JSON output formatting

use serde::Serialize;
use serde_json::json;
use stepwise_dap::AdapterAvailability;

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing to JSON: {}", e),
    }
}

pub fn print_adapters(adapters: &[AdapterAvailability]) {
    print_json(&adapters);
}

pub fn print_dry_run(command_line: &str, transport: &str) {
    print_json(&json!({
        "commandLine": command_line,
        "transport": transport,
    }));
}
