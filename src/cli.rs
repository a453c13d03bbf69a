//! Command-line interface

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use session_core::{Identity, SigningKey};

use crate::Result;

/// Guestbook API - GitHub sign-in and a public guestbook
#[derive(Parser, Debug)]
#[command(name = "guestbook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "GUESTBOOK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "GUESTBOOK_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "GUESTBOOK_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "GUESTBOOK_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "GUESTBOOK_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default)
    Serve,

    /// Session token utilities
    #[command(subcommand)]
    Token(TokenCommand),
}

/// Token subcommands
#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Issue a session token with the configured signing key
    Issue {
        /// Provider subject identifier
        #[arg(long)]
        subject: String,

        /// Display handle
        #[arg(long)]
        handle: String,

        /// Avatar URL
        #[arg(long, default_value = "")]
        avatar_url: String,
    },

    /// Verify a session token and print its claims
    Verify {
        /// Token to verify
        #[arg(required = true)]
        token: String,
    },
}

/// What a token command prints, and how the process should exit
#[derive(Debug)]
pub struct TokenOutput {
    /// Text for stdout
    pub output: String,
    /// Process exit code
    pub exit_code: ExitCode,
}

impl TokenCommand {
    /// Issue or verify a token with `key`
    ///
    /// `verify` prints the claims as JSON, or `invalid` with a failing exit
    /// code.
    pub fn run(&self, key: &SigningKey) -> Result<TokenOutput> {
        match self {
            Self::Issue {
                subject,
                handle,
                avatar_url,
            } => {
                let identity = Identity::new(subject, handle, avatar_url);
                Ok(TokenOutput {
                    output: session_core::issue(&identity, key)?,
                    exit_code: ExitCode::SUCCESS,
                })
            }
            Self::Verify { token } => Ok(match session_core::verify(token, key) {
                Some(claims) => TokenOutput {
                    output: serde_json::to_string_pretty(&claims)?,
                    exit_code: ExitCode::SUCCESS,
                },
                None => TokenOutput {
                    output: "invalid".to_string(),
                    exit_code: ExitCode::FAILURE,
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let cli = Cli::parse_from(["guestbook"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_token_issue_args() {
        let cli = Cli::parse_from([
            "guestbook",
            "token",
            "issue",
            "--subject",
            "1",
            "--handle",
            "alice",
        ]);
        match cli.command {
            Some(Command::Token(TokenCommand::Issue {
                subject,
                handle,
                avatar_url,
            })) => {
                assert_eq!(subject, "1");
                assert_eq!(handle, "alice");
                assert!(avatar_url.is_empty());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_token_verify_requires_token() {
        assert!(Cli::try_parse_from(["guestbook", "token", "verify"]).is_err());
    }

    fn key() -> SigningKey {
        SigningKey::new("cli-test-key").unwrap()
    }

    fn issue(key: &SigningKey) -> String {
        let cmd = TokenCommand::Issue {
            subject: "1".to_string(),
            handle: "alice".to_string(),
            avatar_url: "http://x/a.png".to_string(),
        };
        let issued = cmd.run(key).unwrap();
        assert_eq!(issued.exit_code, ExitCode::SUCCESS);
        issued.output
    }

    #[test]
    fn test_issued_token_verifies() {
        let key = key();
        let token = issue(&key);

        let verified = TokenCommand::Verify { token }.run(&key).unwrap();
        assert_eq!(verified.exit_code, ExitCode::SUCCESS);

        let claims: serde_json::Value = serde_json::from_str(&verified.output).unwrap();
        assert_eq!(claims["sub"], "1");
        assert_eq!(claims["login"], "alice");
        assert_eq!(claims["avatar_url"], "http://x/a.png");
    }

    #[test]
    fn test_tampered_token_is_invalid() {
        let key = key();
        let mut token = issue(&key);
        let last = token.pop().unwrap();
        token.push(if last == 'A' { 'B' } else { 'A' });

        let verified = TokenCommand::Verify { token }.run(&key).unwrap();
        assert_eq!(verified.output, "invalid");
        assert_eq!(verified.exit_code, ExitCode::FAILURE);
    }

    #[test]
    fn test_token_from_other_key_is_invalid() {
        let token = issue(&SigningKey::new("another-key").unwrap());
        let verified = TokenCommand::Verify { token }.run(&key()).unwrap();
        assert_eq!(verified.output, "invalid");
        assert_eq!(verified.exit_code, ExitCode::FAILURE);
    }

    #[test]
    fn test_cli_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
