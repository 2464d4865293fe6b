//! Command-line interface definition.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Rentora account and session tool.
#[derive(Debug, Parser)]
#[command(name = "rentora", version, about)]
pub struct Cli {
    /// Config file (defaults to the XDG config path)
    #[arg(long, global = true, env = "RENTORA_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands. Output is JSON on stdout.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the current session
    Status,

    /// Sign in
    Login {
        /// Account email
        email: String,
        /// Account password
        #[arg(long, env = "RENTORA_PASSWORD", hide_env_values = true)]
        password: String,
        /// Keep the session for this process only
        #[arg(long)]
        no_remember: bool,
    },

    /// Sign out
    Logout {
        /// Clear the local session without notifying the service
        #[arg(long)]
        local: bool,
    },

    /// Create an account
    Register {
        /// Given name
        first_name: String,
        /// Family name
        last_name: String,
        /// Account email
        email: String,
        /// Account password
        #[arg(long, env = "RENTORA_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Confirm an email address with the token from the verification link
    VerifyEmail {
        /// Verification token
        token: String,
    },

    /// Send another verification email
    ResendVerification {
        /// Account email
        email: String,
    },

    /// Request a password reset email
    ForgotPassword {
        /// Account email
        email: String,
    },

    /// Check whether an email address is free to register
    CheckEmail {
        /// Address to check
        email: String,
    },

    /// Load the signed-in user's profile
    Profile {
        /// Profile email (defaults to the signed-in user)
        email: Option<String>,
    },

    /// Print the session snapshot (and debug internals when enabled)
    Export,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_login() {
        let cli = Cli::parse_from([
            "rentora",
            "login",
            "a@b.com",
            "--password",
            "Aa1@aaaa",
            "--no-remember",
        ]);
        match cli.command {
            Command::Login {
                email,
                password,
                no_remember,
            } => {
                assert_eq!(email, "a@b.com");
                assert_eq!(password, "Aa1@aaaa");
                assert!(no_remember);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_profile_without_email() {
        let cli = Cli::parse_from(["rentora", "--config", "/tmp/rentora.toml", "profile"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/rentora.toml")));
        assert!(matches!(cli.command, Command::Profile { email: None }));
    }
}
