use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use eb_core::ReactionKind;

#[derive(Debug, Parser)]
#[command(name = "echo-board")]
#[command(about = "Boards, threads and reactions stored in your own repository")]
#[command(version)]
pub struct Cli {
    /// Path to a configuration file (defaults to ./echo-board.toml when present)
    #[arg(short, long, env = "ECHOBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Where listing commands read from.
#[derive(Debug, Clone, Copy, Default, Args)]
pub struct ScopeArgs {
    /// Also read every account you follow
    #[arg(long, conflicts_with = "own")]
    pub follows: bool,

    /// Read only your own repository
    #[arg(long)]
    pub own: bool,
}

impl ScopeArgs {
    /// The explicit choice, or `default` when neither flag is given.
    pub fn include_follows(self, default: bool) -> bool {
        match (self.follows, self.own) {
            (true, _) => true,
            (_, true) => false,
            _ => default,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a session with an app password (read from ECHOBOARD_APP_PASSWORD)
    Login {
        /// Handle or DID; falls back to the configured identifier
        #[arg(short, long)]
        identifier: Option<String>,

        /// Service to log in to; falls back to the configured service
        #[arg(short, long)]
        service: Option<String>,
    },

    /// Clear the stored session
    Logout,

    /// Show the current session
    Whoami,

    /// List board ids
    Boards {
        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// List threads, newest first
    Threads {
        /// Only threads of this board
        #[arg(short, long)]
        board: Option<String>,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Create a board with a generated id
    NewBoard {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Start a thread
    NewThread {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        board: Option<String>,
    },

    /// List the posts of a thread, oldest first
    Posts {
        /// Route token of the thread
        thread: String,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Reply to a thread
    Reply {
        /// Route token of the thread
        thread: String,

        #[arg(short, long)]
        text: String,

        /// Route token of the post being answered
        #[arg(long)]
        reply_to: Option<String>,
    },

    /// React to a thread or post
    React {
        /// Route token of the thread or post
        subject: String,

        #[arg(value_parser = parse_kind)]
        kind: ReactionKind,
    },

    /// Show reactions on a thread or post
    Reactions {
        /// Route token of the thread or post
        subject: String,

        /// Repository to read (defaults to your own)
        #[arg(long)]
        repo: Option<String>,

        #[arg(long)]
        cursor: Option<String>,

        #[arg(long)]
        limit: Option<u32>,
    },
}

fn parse_kind(raw: &str) -> Result<ReactionKind, String> {
    raw.parse::<ReactionKind>().map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_reaction_kinds() {
        let cli = Cli::try_parse_from(["echo-board", "react", "dG9rZW4", "star"]).unwrap();
        assert!(matches!(cli.command, Command::React { kind: ReactionKind::Star, .. }));
        assert!(Cli::try_parse_from(["echo-board", "react", "dG9rZW4", "heart"]).is_err());
    }

    #[test]
    fn scope_flags_override_the_default() {
        let cli = Cli::try_parse_from(["echo-board", "threads", "--follows", "--board", "xyz"]).unwrap();
        let Command::Threads { board, scope } = cli.command else {
            panic!("expected threads");
        };
        assert_eq!(board.as_deref(), Some("xyz"));
        assert!(scope.include_follows(false));
        assert!(!ScopeArgs { follows: false, own: true }.include_follows(true));
        assert!(ScopeArgs::default().include_follows(true));
        assert!(Cli::try_parse_from(["echo-board", "boards", "--follows", "--own"]).is_err());
    }
}
