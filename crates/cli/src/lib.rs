pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tenantry_core::config::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "tenantry",
    about = "Tenantry operator CLI",
    long_about = "Apply migrations, inspect configuration, check readiness, preview invoice \
                  identifiers and render HTML documents to PDF.",
    after_help = "Examples:\n  tenantry doctor --json\n  tenantry next-invoice-id --organization \
                  org-1\n  tenantry render-pdf --input invoice.html --name \"INV 42\""
)]
pub struct Cli {
    #[arg(long, global = true, help = "Read configuration from this TOML file (must exist)")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, database connectivity, browser and font readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Compute the next invoice identifier for an organization")]
    NextInvoiceId {
        #[arg(long, help = "Organization id")]
        organization: String,
    },
    #[command(about = "Render an HTML file to PDF through the headless browser")]
    RenderPdf {
        #[arg(long, help = "HTML document or fragment to render")]
        input: PathBuf,
        #[arg(long, help = "Requested filename; sanitized and suffixed with .pdf")]
        name: String,
        #[arg(long, help = "Write into this directory instead of pdf.output_dir")]
        output_dir: Option<PathBuf>,
    },
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        match &self.config {
            Some(path) => LoadOptions {
                config_path: Some(path.clone()),
                require_file: true,
                ..LoadOptions::default()
            },
            None => LoadOptions::default(),
        }
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.load_options();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(options) }
        }
        Command::Doctor { json } => commands::doctor::run(options, json),
        Command::NextInvoiceId { organization } => {
            commands::next_invoice_id::run(options, &organization)
        }
        Command::RenderPdf { input, name, output_dir } => {
            commands::render_pdf::run(options, &input, &name, output_dir)
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
