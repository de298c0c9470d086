use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "auth_client", version, about = "Pop-up sign-in handshake and portal client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Open the identity provider window and wait for the sign-in to finish.
    SignIn,
    /// Forget the stored identity.
    SignOut,
    /// Print the stored identity, if any.
    Whoami,
    /// Create an account on the portal API.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Upload one or more files to the portal API.
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}
