use stepwise_dap::AdapterAvailability;

/// Output format for CLI commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format (default)
    #[default]
    Table,
    /// JSON format for scripting
    Json,
}

/// Unified formatter for CLI output
#[derive(Clone, Debug)]
pub struct Formatter {
    pub format: OutputFormat,
}

impl Formatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn print_adapters(&self, adapters: &[AdapterAvailability]) {
        match self.format {
            OutputFormat::Table => super::table::print_adapters(adapters),
            OutputFormat::Json => super::json::print_adapters(adapters),
        }
    }

    /// Print the backend command a session would spawn
    pub fn print_dry_run(&self, command_line: &str, transport: &str) {
        match self.format {
            OutputFormat::Table => {
                println!("Command:   {}", command_line);
                println!("Transport: {}", transport);
            }
            OutputFormat::Json => super::json::print_dry_run(command_line, transport),
        }
    }
}
