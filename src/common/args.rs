use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Arguments {
    #[command(subcommand)]
    pub command: Command,
    /// Log at debug level. `RUST_LOG` takes precedence when set.
    #[arg(long, global = true)]
    pub debug: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert Markdown into WeChat-ready HTML.
    Convert {
        /// A Markdown file, or a directory to convert every `*.md` file beneath.
        input: PathBuf,
        /// Where to write the HTML. Defaults to the input path with an `.html` extension.
        output: Option<PathBuf>,
        /// The document theme, from `themes/markdown/<name>.css`.
        #[arg(short, long)]
        theme: Option<String>,
        /// The code theme, from `themes/code/<name>.css`.
        #[arg(short, long)]
        code_theme: Option<String>,
        /// Print the HTML to standard output instead of writing a file. Single files only.
        #[arg(long)]
        stdout: bool,
        /// Omit the window-control header above code blocks.
        #[arg(long)]
        no_mac_style: bool,
    },
    /// Print the title and digest that would be published for a Markdown file.
    Meta {
        input: PathBuf,
    },
}
