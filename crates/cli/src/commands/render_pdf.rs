use std::path::{Path, PathBuf};

use tenantry_core::config::LoadOptions;
use tenantry_server::pdf::{PdfError, PdfRenderer, RenderRequest};

use crate::commands::{
    current_thread_runtime, load_config, CommandResult, EXIT_CONFIG, EXIT_FAILURE,
};

const COMMAND: &str = "render-pdf";

pub fn run(
    options: LoadOptions,
    input: &Path,
    name: &str,
    output_dir: Option<PathBuf>,
) -> CommandResult {
    let config = match load_config(COMMAND, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let html = match std::fs::read_to_string(input) {
        Ok(html) => html,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "input",
                format!("could not read `{}`: {error}", input.display()),
                EXIT_FAILURE,
            );
        }
    };
    let runtime = match current_thread_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let renderer = PdfRenderer::with_chromium(config.pdf);
    let request = RenderRequest { html, filename: name.to_string(), output_dir };

    match runtime.block_on(renderer.render(request)) {
        Ok(document) => CommandResult::success(
            COMMAND,
            format!("wrote {} ({} bytes)", document.path.display(), document.bytes),
        ),
        Err(error @ (PdfError::MissingExecutable | PdfError::ExecutableNotFound(_))) => {
            CommandResult::failure(COMMAND, "browser_configuration", error.to_string(), EXIT_CONFIG)
        }
        Err(error @ PdfError::InvalidFilename(_)) => {
            CommandResult::failure(COMMAND, "bad_input", error.to_string(), EXIT_FAILURE)
        }
        Err(error) => CommandResult::failure(COMMAND, "rendering", error.to_string(), EXIT_FAILURE),
    }
}
