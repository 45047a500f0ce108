pub mod clean;

use std::process;

use rulesift::PipelineError;

/// Report a fatal error and exit. Rule-scoped errors render against the
/// offending rule's text.
pub fn fail(err: &PipelineError) -> ! {
    match err.key() {
        Some(key) => err.to_diagnostic().render("<rule>", key),
        None => eprintln!("error: {}", err),
    }
    process::exit(1);
}
