//! Command-line arguments.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub(crate) const USAGE: &str = "\
usage: lookout [--config DIR] [--listen ADDR] [--wait] SCRIPT...

Runs SCRIPT files on the scripted engine and serves a Chrome DevTools
Protocol debugger for them.

options:
  --config DIR    read config.toml from DIR instead of the platform default
  --listen ADDR   socket address to listen on (overrides server.listen)
  --wait          hold the first script until the debugger resumes it
  -h, --help      print this message";

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct CliArgs {
    pub config_dir: Option<PathBuf>,
    pub listen: Option<String>,
    pub wait: bool,
    pub help: bool,
    pub scripts: Vec<PathBuf>,
}

/// Parse arguments, not including the program name.
pub(crate) fn parse_args<I>(args: I) -> Result<CliArgs>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let dir = args.next().context("--config needs a directory")?;
                parsed.config_dir = Some(PathBuf::from(dir));
            }
            "--listen" => {
                parsed.listen = Some(args.next().context("--listen needs an address")?);
            }
            "--wait" => parsed.wait = true,
            "-h" | "--help" => parsed.help = true,
            "--" => parsed.scripts.extend(args.by_ref().map(PathBuf::from)),
            flag if flag.starts_with('-') => bail!("unknown option {flag}"),
            script => parsed.scripts.push(PathBuf::from(script)),
        }
    }
    if parsed.scripts.is_empty() && !parsed.help {
        bail!("no script given");
    }
    Ok(parsed)
}
