use clap::{Parser, Subcommand};

/// asubox - container archive lifecycle with sandboxed execution
#[derive(Parser, Debug)]
#[command(name = "asubox")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a git repository and pack it into a container archive
    Create {
        /// Repository URL (https or git)
        #[arg(value_name = "URL")]
        url: String,

        /// Branch or tag to fetch
        #[arg(long, value_name = "NAME", conflicts_with = "commit")]
        branch: Option<String>,

        /// Commit hash to check out after cloning
        #[arg(long, value_name = "HASH")]
        commit: Option<String>,

        /// Skip the file extension allowlist check
        #[arg(long, default_value = "false")]
        no_validate: bool,
    },

    /// Show a container's metadata and execution history
    Info {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,

        /// Emit JSON instead of a human-readable summary
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// List active containers
    List {
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Run a command inside a container's sandbox
    Exec {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,

        /// Program to run
        #[arg(value_name = "COMMAND")]
        command: String,

        /// Program arguments
        #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Execution timeout in milliseconds (default: 30000)
        #[arg(long)]
        timeout: Option<u64>,

        /// Skip dependency installation before running
        #[arg(long, default_value = "false")]
        no_bootstrap: bool,
    },

    /// Terminate the container's running command
    Stop {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,
    },

    /// Show whether the container has a running command
    Status {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,
    },

    /// Delete a container's archive and mark it deleted
    Delete {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,
    },

    /// Set an environment variable for a container
    EnvSet {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,

        #[arg(value_name = "NAME")]
        name: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// List a container's environment variables
    EnvList {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,
    },

    /// Show captured output for a container, newest first
    Logs {
        #[arg(value_name = "CONTAINER_ID")]
        id: String,

        /// Page number, 1-based (50 entries per page)
        #[arg(long, default_value = "1")]
        page: u32,
    },

    /// Expire containers past their retention window now
    Sweep,

    /// Rebuild indexes and compact the metadata database
    Maintain,

    /// Run the periodic sweeper in the foreground
    Daemon,
}
