use clap::{Parser, Subcommand};

const ENVIRONMENT_HELP: &str = "\
Environment:
    FSVAULT_DATADIR       the datastore filesystem path
    FSVAULT_SECRET_KEYS   comma-separated encryption keys (16, 24 or 32 bytes), primary first
    FSVAULT_DEBUG         enable debug logging

Examples:
    fsvault put --key /user/23/passphrase --data \"The green cow has eaten the maple oatmeal\"
    fsvault get --key /user/23/passphrase";

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "fsvault",
    about = "Interact with an FSVault key/value datastore",
    version,
    propagate_version = true,
    after_help = ENVIRONMENT_HELP
)]
pub struct Cli {
    /// Enable debug logging.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Put a value into the datastore.
    Put {
        /// Key to the data.
        #[arg(short, long)]
        key: String,
        /// Data to store.
        #[arg(short, long)]
        data: String,
    },
    /// Get a value from the datastore.
    Get {
        #[arg(short, long)]
        key: String,
    },
    /// Delete a key in the datastore.
    Delete {
        #[arg(short, long)]
        key: String,
    },
    /// List keys at a datastore path.
    List {
        #[arg(short, long, default_value = "/")]
        key: String,
    },
    /// Re-encrypt the value at a key with the primary encryption key.
    Refresh {
        #[arg(short, long)]
        key: String,
    },
    /// Run a put/get/delete round-trip against the datastore.
    Health,
    /// Print a fresh random encryption key.
    Keygen,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
