use crate::config::Config;
use crate::dispatch::Modes;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Save the current pasteboard contents to disk
#[derive(Debug, Parser)]
#[command(name = "pdc", version, disable_help_flag = true)]
pub struct Cli {
    /// Save pasteboard images to local file
    #[arg(short = 'i', long = "image")]
    pub image: bool,

    /// Save pasteboard rich text content to html file
    #[arg(short = 'h', long = "html")]
    pub html: bool,

    /// Save pasteboard rich text content to rtfd file
    #[arg(short = 'r', long = "rtfd")]
    pub rtfd: bool,

    /// Save pasteboard files to local
    #[arg(short = 'f', long = "files")]
    pub files: bool,

    /// Property list holding `output` and optional `log`
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = Config::DEFAULT_PATH)]
    pub config: PathBuf,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    pub fn modes(&self) -> Modes {
        Modes {
            files: self.files,
            image: self.image,
            html: self.html,
            rtfd: self.rtfd,
        }
    }
}
