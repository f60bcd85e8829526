//! `livemetrics [PID] [--pretty]`
//!
//! With a process id, streams that process's live metrics to stdout until
//! Ctrl+C. Without one, lists the processes the agent can monitor.
//! Settings come from `LIVEMETRICS_*` environment variables.

use anyhow::bail;
use livemetrics_runtime::RuntimeBuilder;

const USAGE: &str = "usage: livemetrics [PID] [--pretty] [--list]";

/// Parsed command line
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    target: Option<String>,
    pretty: bool,
    list: bool,
    help: bool,
}

impl Args {
    /// Flags may appear before or after the pid
    fn parse<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Args::default();
        for arg in args {
            match arg.as_str() {
                "--pretty" => parsed.pretty = true,
                "--list" => parsed.list = true,
                "-h" | "--help" => parsed.help = true,
                flag if flag.starts_with('-') => bail!("unknown option '{flag}'\n{USAGE}"),
                _ if parsed.target.is_some() => bail!("only one PID may be given\n{USAGE}"),
                other => parsed.target = Some(other.to_string()),
            }
        }
        Ok(parsed)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;

    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    match args.target {
        Some(pid) if !args.list => {
            let builder = RuntimeBuilder::new();
            let builder = if args.pretty { builder.pretty() } else { builder };
            builder.start(pid).await
        }
        _ => {
            let processes = RuntimeBuilder::new().processes().await?;
            if processes.is_empty() {
                println!("No processes available");
            }
            for process in processes {
                let marker = if process.is_default { " (default)" } else { "" };
                println!("{:>8}  {}{}", process.pid, process.name, marker);
            }
            Ok(())
        }
    }
}
