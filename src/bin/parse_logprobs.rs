use clap::Parser;
use logprobs::logging::{self, LogLevel};
use logprobs::render::{self, write_entry};
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "parse_logprobs",
    version,
    about = "Print tokens and log probabilities from logprobs output"
)]
struct Cli {
    /// Path to the JSON file, or - for stdin
    #[arg(default_value = "logprobs.json")]
    path: PathBuf,

    /// Number of alternative tokens to show
    #[arg(long, default_value_t = 3)]
    top: usize,

    /// Logging verbosity level
    #[arg(long, default_value = "error")]
    log_level: LogLevel,
}

fn run<W: Write>(cli: &Cli, out: &mut W) -> anyhow::Result<()> {
    let completion = logprobs::load(&cli.path)?;
    let content = completion.content()?;
    debug!(tokens = content.len(), top = cli.top, "loaded response");
    for (idx, entry) in content.iter().enumerate() {
        write_entry(out, idx, entry, cli.top)?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level);
    render::to_stdout(|out| run(&cli, out))
}
