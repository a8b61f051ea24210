//! Drives one [`Session`] over a line-oriented byte stream.
//!
//! The same loop serves stdin/stdout and TCP sockets. Input lines and queued
//! output batches are multiplexed with `select!`, so writing a late result
//! never waits for the next input line and vice versa.
//!
//! Input is framed on raw bytes. Invalid UTF-8 is decoded lossily and lines
//! longer than [`MAX_LINE_LENGTH`] are rejected, so malformed input costs the
//! peer one `Error:` line rather than its session.

use std::io;

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
    select,
};
use tracing::{debug, warn};

use crate::{
    error::TransportError,
    session::{Outbound, Session, SessionState},
    store::RecordStore,
};

/// Longest accepted input line in bytes, excluding the delimiter.
pub const MAX_LINE_LENGTH: usize = 16384;

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Line(String),
    /// The current line passed [`MAX_LINE_LENGTH`]; the rest of it is skipped.
    TooLong,
    Eof,
}

/// Splits a byte stream into lines without ever holding more than
/// [`MAX_LINE_LENGTH`] bytes of a single line.
///
/// Partial lines live in `buf` across calls, so [`LineReader::next`] can be
/// dropped mid-read inside `select!` without losing input.
struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    fn new(reader: R, limit: usize) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            limit,
            discarding: false,
        }
    }

    async fn next(&mut self) -> io::Result<Input> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.discarding || self.buf.is_empty() {
                    self.discarding = false;
                    return Ok(Input::Eof);
                }
                return Ok(Input::Line(self.take_line()));
            }

            let newline = available.iter().position(|byte| *byte == b'\n');
            let chunk_len = newline.unwrap_or(available.len());
            if !self.discarding {
                self.buf.extend_from_slice(&available[..chunk_len]);
            }
            let consumed = newline.map_or(chunk_len, |at| at + 1);
            self.reader.consume(consumed);

            if newline.is_some() {
                if std::mem::take(&mut self.discarding) {
                    continue;
                }
                if self.buf.len() > self.limit {
                    self.buf.clear();
                    return Ok(Input::TooLong);
                }
                return Ok(Input::Line(self.take_line()));
            }

            if !self.discarding && self.buf.len() > self.limit {
                self.buf.clear();
                self.discarding = true;
                return Ok(Input::TooLong);
            }
        }
    }

    fn take_line(&mut self) -> String {
        let mut bytes = std::mem::take(&mut self.buf);
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Greets the peer, then feeds it lines until `quit`, end of input, or a
/// transport failure. The session is always left [`SessionState::Closed`].
pub async fn serve<R, W, S>(
    reader: R,
    mut writer: W,
    mut session: Session<S>,
    mut outbound: Outbound,
) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: RecordStore,
{
    session.greet();
    let result = run_session_loop(reader, &mut writer, &mut session, &mut outbound).await;

    if result.is_ok() {
        if let Err(error) = flush_queued(&mut writer, &mut outbound).await {
            warn!(session = session.id(), %error, "failed to flush queued output");
        }
        shutdown_writer(&mut writer).await;
    }
    session.transport_closed();
    debug!(session = session.id(), "connection finished");
    result
}

async fn run_session_loop<R, W, S>(
    reader: R,
    writer: &mut W,
    session: &mut Session<S>,
    outbound: &mut Outbound,
) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: RecordStore,
{
    let mut lines = LineReader::new(reader, MAX_LINE_LENGTH);

    loop {
        select! {
            biased;

            batch = outbound.recv() => {
                if let Some(batch) = batch {
                    write_lines(writer, &batch).await?;
                }
            }
            input = lines.next() => {
                if !handle_input(input?, session).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Returns `false` once the session should stop reading.
async fn handle_input<S: RecordStore>(input: Input, session: &mut Session<S>) -> bool {
    match input {
        Input::Line(line) => {
            session.on_line(&line);
            session.state() == SessionState::Active
        }
        Input::TooLong => {
            session.on_oversized_line(MAX_LINE_LENGTH);
            true
        }
        Input::Eof => {
            // Input is exhausted but output is still writable: let pending
            // operations finish so their results reach the peer.
            debug!(session = session.id(), pending = session.pending(), "input closed");
            session.request_close();
            session.settle().await;
            false
        }
    }
}

async fn flush_queued<W>(writer: &mut W, outbound: &mut Outbound) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(batch) = outbound.try_recv() {
        write_lines(writer, &batch).await?;
    }
    Ok(())
}

/// Writes a batch in one buffer so it reaches the peer contiguously.
pub async fn write_lines<W>(writer: &mut W, lines: &[String]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut encoded = Vec::new();
    for line in lines {
        encoded.extend_from_slice(line.as_bytes());
        encoded.push(b'\n');
    }
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

async fn shutdown_writer<W: AsyncWrite + Unpin>(writer: &mut W) {
    if let Err(error) = writer.shutdown().await {
        warn!(?error, "failed to shut down writer cleanly");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, BufReader};

    use super::*;
    use crate::{
        commands,
        session::GREETING,
        store::{MemoryStore, RecordStore},
    };

    async fn run_script(script: &[u8]) -> String {
        let store = Arc::new(MemoryStore::new());
        store.initialize(&["Don Johnson"]).await.expect("initialize");
        let registry = Arc::new(commands::standard_registry().expect("registry"));
        let (session, outbound) = Session::new(1, store, registry);

        let (client, server) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server);
        let (mut client_read, mut client_write) = tokio::io::split(client);

        // Scripts may exceed the pipe's capacity, so feed them concurrently.
        let script = script.to_vec();
        let feeder = tokio::spawn(async move {
            client_write.write_all(&script).await.expect("write script");
            client_write.shutdown().await.expect("close input");
        });

        serve(BufReader::new(server_read), server_write, session, outbound)
            .await
            .expect("serve");
        feeder.await.expect("feeder");

        let mut transcript = String::new();
        client_read
            .read_to_string(&mut transcript)
            .await
            .expect("read transcript");
        transcript
    }

    async fn collect_inputs<R: AsyncBufRead + Unpin>(reader: R, limit: usize) -> Vec<Input> {
        let mut lines = LineReader::new(reader, limit);
        let mut inputs = Vec::new();
        loop {
            let input = lines.next().await.expect("read input");
            if input == Input::Eof {
                return inputs;
            }
            inputs.push(input);
        }
    }

    #[tokio::test]
    async fn quit_ends_the_transcript() {
        let transcript = run_script(b"help\r\nquit\nhelp\n").await;
        assert_eq!(
            transcript,
            "DB query system. Type 'help' for help.\n\
             Valid commands: add find help quit\n\
             Goodbye.\n"
        );
    }

    #[tokio::test]
    async fn end_of_input_flushes_pending_results() {
        let transcript = run_script(b"find don\n").await;
        assert_eq!(
            transcript,
            "DB query system. Type 'help' for help.\n\
             ----------\n\
             1 - Don Johnson\n\
             ----------\n"
        );
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_end_the_session() {
        let transcript = run_script(b"find \xff\nhelp\n").await;

        assert!(transcript.starts_with(GREETING), "{transcript}");
        assert!(
            transcript.contains("Valid commands: add find help quit\n"),
            "{transcript}"
        );
        assert!(transcript.contains("No results\n"), "{transcript}");
    }

    #[tokio::test]
    async fn oversized_line_is_rejected_and_reading_continues() {
        let mut script = vec![b'x'; MAX_LINE_LENGTH + 100];
        script.extend_from_slice(b"\nhelp\n");

        let transcript = run_script(&script).await;
        assert_eq!(
            transcript,
            format!(
                "{GREETING}\n\
                 Error: line too long (limit {MAX_LINE_LENGTH} bytes)\n\
                 Valid commands: add find help quit\n"
            )
        );
    }

    #[tokio::test]
    async fn line_reader_strips_delimiters_and_keeps_trailing_partial_line() {
        let inputs = collect_inputs(&b"ab\r\nlong-line\ncd"[..], 4).await;
        assert_eq!(
            inputs,
            vec![
                Input::Line("ab".into()),
                Input::TooLong,
                Input::Line("cd".into()),
            ]
        );
    }

    #[tokio::test]
    async fn line_reader_discards_overflow_across_reads() {
        // A two-byte buffer forces the overflow to be detected mid-line.
        let reader = BufReader::with_capacity(2, &b"abcdefgh\nok\n"[..]);
        let inputs = collect_inputs(reader, 4).await;
        assert_eq!(inputs, vec![Input::TooLong, Input::Line("ok".into())]);
    }

    #[tokio::test]
    async fn line_reader_decodes_invalid_utf8_lossily() {
        let inputs = collect_inputs(&b"find \xff\n"[..], MAX_LINE_LENGTH).await;
        assert_eq!(inputs, vec![Input::Line("find \u{fffd}".into())]);
    }
}
