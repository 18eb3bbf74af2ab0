//! Fatal error reporting

use tracing::error;

use crate::error::ReconError;

/// Print `error` and exit with its exit code.
///
/// A [`ReconError`] prints its user message, plus the full developer chain
/// with `-v`. Anything else prints its display and exits with 1.
pub fn handle_fatal_error(error: anyhow::Error, verbose: u8) -> ! {
    error!("Fatal error: {}", error);

    let exit_code = if let Some(recon_err) = error.downcast_ref::<ReconError>() {
        eprintln!("{}", recon_err.user_message());
        if verbose >= 1 {
            eprintln!("\nContext Chain:\n{}", recon_err.developer_message());
        }
        recon_err.exit_code()
    } else {
        eprintln!("Error: {error}");
        if verbose >= 1 {
            eprintln!("\nError chain:");
            for (i, cause) in error.chain().enumerate() {
                eprintln!("  {}: {}", i, cause);
            }
        }
        1
    };

    std::process::exit(exit_code)
}
