//! Error handling and display for the CLI.

use colored::Colorize;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("API error: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
        retry_after_seconds: Option<u32>,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl CliError {
    pub fn api(
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
        retry_after_seconds: Option<u32>,
    ) -> Self {
        Self::Api {
            status,
            code: code.into(),
            message: message.into(),
            retry_after_seconds,
        }
    }
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {}", "Error:".red().bold(), err);

    let Some(cli_err) = err.downcast_ref::<CliError>() else {
        return;
    };
    match cli_err {
        CliError::Api {
            retry_after_seconds: Some(secs),
            ..
        } => {
            eprintln!(
                "\n{}",
                format!("Hint: The node is changing power state. Retry in {secs}s.").yellow()
            );
        }
        CliError::Api { code, .. } if code == "last_online_node" => {
            eprintln!(
                "\n{}",
                "Hint: Power on another node before powering this one off.".yellow()
            );
        }
        CliError::Api { code, .. } if code == "no_suitable_node" => {
            eprintln!(
                "\n{}",
                "Hint: Relax the constraints or use `farmctl node list` to check free capacity."
                    .yellow()
            );
        }
        CliError::Network(_) => {
            eprintln!(
                "\n{}",
                "Hint: Check that farmerbot is running and --url points at it.".yellow()
            );
        }
        _ => {}
    }
}
