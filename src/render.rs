use std::io::{BufWriter, ErrorKind, StdoutLock, Write};

use serde::Serialize;

use crate::document::TokenLogprob;

/// Write one token entry followed by up to `top` alternatives and a blank line.
///
/// # Examples
///
/// ```
/// use logprobs::{TokenLogprob, render::write_entry};
///
/// let entry = TokenLogprob {
///     token: "Hi".into(),
///     logprob: -0.1,
///     bytes: None,
///     top_logprobs: Vec::new(),
/// };
/// let mut out = Vec::new();
/// write_entry(&mut out, 0, &entry, 3).unwrap();
/// assert_eq!(String::from_utf8(out).unwrap(), "0: Hi\t(logprob -0.1000)\n\n");
/// ```
pub fn write_entry<W: Write>(
    out: &mut W,
    index: usize,
    entry: &TokenLogprob,
    top: usize,
) -> std::io::Result<()> {
    writeln!(out, "{index}: {}\t(logprob {:.4})", entry.token, entry.logprob)?;
    for alt in entry.top_logprobs.iter().take(top) {
        writeln!(out, "    {}\t{:.4}", alt.token, alt.logprob)?;
    }
    writeln!(out)
}

/// Write a decoded value as compact JSON on its own line.
pub fn write_value<W: Write, T: Serialize>(out: &mut W, value: &T) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)
}

/// Run `body` against a buffered, locked stdout and hand the outcome to [`finish`].
pub fn to_stdout<F>(body: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut BufWriter<StdoutLock<'static>>) -> anyhow::Result<()>,
{
    let mut out = BufWriter::new(std::io::stdout().lock());
    let result = body(&mut out);
    finish(out, result)
}

/// Flush whatever was written before reporting `result`.
///
/// A reader that closed the pipe early (`| head`) is not a failure.
pub fn finish<W: Write>(mut out: W, result: anyhow::Result<()>) -> anyhow::Result<()> {
    let flushed = out.flush().map_err(anyhow::Error::from);
    match result.and(flushed) {
        Err(e) if is_broken_pipe(&e) => Ok(()),
        other => other,
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == ErrorKind::BrokenPipe)
}
