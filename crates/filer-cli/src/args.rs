//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "filer")]
#[command(about = "Lists and watches directories", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (default: ~/.config/filer/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List directories
    Ls {
        /// Show dot-files
        #[arg(short = 'a', long)]
        show_hidden: bool,

        /// Generate thumbnails for images
        #[arg(short = 't', long)]
        show_thumbs: bool,

        #[arg(value_name = "DIR", required = true)]
        dirs: Vec<String>,
    },

    /// List DIR and relist it whenever it changes
    Watch {
        /// Show dot-files
        #[arg(short = 'a', long)]
        show_hidden: bool,

        #[arg(value_name = "DIR")]
        dir: String,
    },

    /// Saved selection groups
    Group {
        #[command(subcommand)]
        action: GroupCommand,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum GroupCommand {
    /// Remember LEAF... in DIR as group NAME
    Save {
        name: String,
        #[arg(value_name = "DIR")]
        dir: String,
        #[arg(value_name = "LEAF")]
        leaves: Vec<String>,
    },

    /// Print the paths saved in group NAME
    Restore { name: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("filer").chain(args.iter().copied()))
    }

    #[test]
    fn definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ls_with_switches() {
        let cli = parse(&["ls", "-a", "/tmp", "/etc"]).unwrap();
        assert_eq!(cli.config, None);
        assert_eq!(
            cli.command,
            Command::Ls {
                show_hidden: true,
                show_thumbs: false,
                dirs: vec!["/tmp".into(), "/etc".into()],
            }
        );
    }

    #[test]
    fn config_anywhere() {
        let cli = parse(&["watch", "/tmp", "--config", "/c.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/c.toml")));
        let cli = parse(&["--config=/d.toml", "group", "restore", "1"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/d.toml")));
        assert_eq!(
            cli.command,
            Command::Group {
                action: GroupCommand::Restore { name: "1".into() }
            }
        );
    }

    #[test]
    fn group_save_collects_leaves() {
        let cli = parse(&["group", "save", "2", "/src", "a.rs", "b.rs"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Group {
                action: GroupCommand::Save {
                    name: "2".into(),
                    dir: "/src".into(),
                    leaves: vec!["a.rs".into(), "b.rs".into()],
                }
            }
        );
    }

    #[test]
    fn errors() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["ls"]).is_err());
        assert!(parse(&["ls", "-z", "/tmp"]).is_err());
        assert!(parse(&["watch", "/a", "/b"]).is_err());
        assert!(parse(&["group", "save", "1"]).is_err());
        assert!(parse(&["ls", "/tmp", "--config"]).is_err());
        assert!(parse(&["frobnicate"]).is_err());
    }
}
