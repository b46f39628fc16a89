#![warn(clippy::perf, clippy::style, warnings)]

use std::io::Write;
use std::path::Path;

use clap::Parser;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use md2wechat::convert::{convert_dir, output_path, Converter, Options};
use md2wechat::meta::Metadata;
use md2wechat::prelude::*;
use md2wechat::theme::ThemeSelection;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Arguments::parse();
    install_logging(args.debug);

    let config = Config::load()?;

    match args.command {
        Command::Convert {
            input,
            output,
            theme,
            code_theme,
            stdout,
            no_mac_style,
        } => {
            let mut selection = ThemeSelection::from(&config.theme);
            selection.name = theme.unwrap_or(selection.name);
            selection.code = code_theme.unwrap_or(selection.code);

            let mut options = Options::from_config(&config);
            options.render.code.mac_style &= !no_mac_style;

            run_convert(&input, output.as_deref(), &selection, options, stdout)
        }
        Command::Meta { input } => {
            let markdown = std::fs::read_to_string(&input)
                .wrap_err_with(|| format!("Could not read {}.", input.display()))?;
            let meta = Metadata::extract(&markdown);

            println!("Title:  {}", meta.title);
            println!("Digest: {}", meta.digest);
            let author = meta.author.unwrap_or(config.publish.default_author);
            if !author.is_empty() {
                println!("Author: {author}");
            }
            Ok(())
        }
    }
}

fn install_logging(debug: bool) {
    let default = match debug {
        true => "debug",
        false => "warn",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(ErrorLayer::default())
        .try_init();
}

fn run_convert(
    input: &Path,
    output: Option<&Path>,
    selection: &ThemeSelection,
    options: Options,
    stdout: bool,
) -> Result<()> {
    if stdout && input.is_dir() {
        let err = eyre!("Cannot print a directory conversion to standard output.")
            .suggestion("Pass a single Markdown file, or drop --stdout.");
        bail!(err)
    }

    Progressor::set_dummy(stdout);

    let progress = Progressor::new(Message::LoadTheme);
    let css = selection.load();
    progress.finish();

    let progress = Progressor::new(Message::Converting);

    if input.is_dir() {
        let count = convert_dir(input, output, &css, &options)?;
        progress.finish();
        Message::ConvertOK(count).print();
        return Ok(());
    }

    if !input.is_file() {
        let err = eyre!("Input file {} does not exist.", input.display())
            .note("md2wechat converts a single Markdown file or every *.md file beneath a directory.");
        bail!(err)
    }

    let converter = Converter::new(css, options);

    if stdout {
        let markdown = std::fs::read_to_string(input)
            .wrap_err_with(|| format!("Could not read {}.", input.display()))?;
        let html = converter.convert(&markdown)?;
        progress.finish();

        let mut out = std::io::stdout().lock();
        out.write_all(html.as_bytes())?;
        out.write_all(b"\n")?;
        return Ok(());
    }

    converter.convert_file(input, &output_path(input, output))?;
    progress.finish();
    Message::ConvertOK(1).print();

    Ok(())
}
