use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "murmur")]
#[command(about = "Read your feed and like, save, share, follow or block from the terminal")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name (Supabase project + stored session)
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show recent posts
    Feed {
        /// Number of posts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only posts written by this user id
        #[arg(long, value_name = "USER_ID", conflicts_with = "saved")]
        user: Option<String>,
        /// Only posts you saved
        #[arg(long)]
        saved: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Like or unlike a post
    Like {
        /// Post ID
        id: String,
    },
    /// Save or unsave a post
    Save {
        /// Post ID
        id: String,
    },
    /// Share or unshare a post
    Share {
        /// Post ID
        id: String,
    },
    /// Follow or unfollow a user
    Follow {
        /// User ID
        id: String,
    },
    /// Block or unblock a user
    Block {
        /// User ID
        id: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Authenticate CLI profile with Supabase
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Do not make this the active profile
        #[arg(long)]
        no_activate: bool,
    },
    /// Print a profile's config
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with email and password
    Login {
        /// Profile name to sign in
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Account email
        #[arg(long)]
        email: String,
        /// Account password
        #[arg(long)]
        password: String,
    },
    /// Show sign-in status
    Status {
        /// Profile name to inspect
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
    /// Sign out and remove the stored session
    Logout {
        /// Profile name to sign out
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
    },
}
