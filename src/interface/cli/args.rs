use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::Mode;

#[derive(Parser, Debug)]
#[command(name = "tunnelkeeper")]
#[command(about = "Keeps a reverse tunnel to this machine alive")]
#[command(version)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Without a command: make sure the tunnel is up and print its address
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Settings file (TOML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Where pid, URL, mode and logs are kept
    #[arg(long, global = true, value_name = "PATH")]
    pub state_dir: Option<PathBuf>,

    /// Send the new address to the notifier after start, restart or switch
    #[arg(long, global = true)]
    pub notify: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start the tunnel (persisted mode if none given)
    Start { mode: Option<Mode> },
    /// Stop the running tunnel
    Stop,
    /// Stop, then start the persisted mode
    Restart,
    /// Print the address of the live tunnel
    Status {
        /// Print the full handle as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the last recorded address
    #[command(alias = "info")]
    Url,
    /// Print the persisted mode
    Mode,
    /// Switch to the web (HTTPS) tunnel
    Web,
    /// Switch to the ssh (TCP) tunnel
    Ssh,
    /// Probe the published web URL
    Health,
    /// Reconcile periodically until interrupted
    Watch {
        /// Seconds between reconciles (settings file value by default)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
}
