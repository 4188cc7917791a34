//! `the-transform`: run a transform script over a file.
//!
//! One-shot mode prints (or with `--write` saves) the transformed text.
//! `--watch` keeps the target open as a live preview and re-runs the script
//! every time its file is saved.

mod cli;
mod run;
mod watch;

use anyhow::{
  Context,
  Result,
};
use clap::Parser;

use crate::cli::Cli;

fn setup_logging(verbosity: u8) -> Result<()> {
  let level = match verbosity {
    0 => log::LevelFilter::Warn,
    1 => log::LevelFilter::Info,
    2 => log::LevelFilter::Debug,
    _ => log::LevelFilter::Trace,
  };

  let stderr_config = fern::Dispatch::new()
    .format(|out, message, record| out.finish(format_args!("{}: {message}", record.level())))
    .chain(std::io::stderr());

  let file_config = fern::Dispatch::new()
    .format(|out, message, record| {
      out.finish(format_args!(
        "{} {} [{}] {message}",
        chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
        record.target(),
        record.level(),
      ))
    })
    .chain(fern::log_file(the_loader::log_file())?);

  fern::Dispatch::new()
    .level(level)
    .chain(stderr_config)
    .chain(file_config)
    .apply()?;
  Ok(())
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  the_loader::initialize_config_file(cli.config_file.clone());
  the_loader::initialize_log_file(cli.log_file.clone());
  setup_logging(cli.verbosity).context("failed to initialize logging")?;

  let config = the_loader::config::load_user().context("failed to load config")?;
  log::debug!("loaded config: {config:?}");

  if cli.check {
    return run::check(&cli, &config);
  }
  if cli.watch {
    return watch::run(&cli, config);
  }
  run::once(&cli, &config)
}
