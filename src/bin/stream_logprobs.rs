use anyhow::Context;
use clap::Parser;
use logprobs::logging::{self, LogLevel};
use logprobs::render::{self, write_value};
use logprobs::{ArrayStream, DEFAULT_CHUNK_SIZE};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "stream_logprobs", version, about = "Stream tokens from logprobs.json")]
struct Cli {
    /// Path to logprobs.json, or - for stdin
    file: PathBuf,

    /// Print only the first N tokens
    #[arg(long)]
    limit: Option<usize>,

    /// Key whose array holds the tokens
    #[arg(long, default_value = "content")]
    key: String,

    /// Bytes read from the file per refill
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Logging verbosity level
    #[arg(long, default_value = "error")]
    log_level: LogLevel,
}

fn run<W: Write>(cli: &Cli, out: &mut W) -> anyhow::Result<()> {
    let input: Box<dyn Read> = if cli.file == Path::new("-") {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(
            File::open(&cli.file)
                .with_context(|| format!("failed to open {}", cli.file.display()))?,
        )
    };
    // A limit of zero prints everything.
    let limit = cli.limit.filter(|&n| n > 0).unwrap_or(usize::MAX);
    let tokens = ArrayStream::new(input, &cli.key)
        .with_chunk_size(cli.chunk_size)
        .take(limit);

    let mut printed = 0usize;
    for token in tokens {
        let token = token.with_context(|| format!("failed to stream {}", cli.file.display()))?;
        write_value(out, &token)?;
        printed += 1;
    }
    debug!(printed, "done");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level);
    render::to_stdout(|out| run(&cli, out))
}
