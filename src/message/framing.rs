//! Newline-delimited record framing over any async byte stream.

use bytes::Bytes;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{EncodeError, FrameError, Message};

/// Upper bound on a single record, delimiter excluded.
pub const DEFAULT_MAX_RECORD_LEN: usize = 64 * 1024;

/// Splits a byte stream into records, one per line.
///
/// Partially received records are kept across calls, so [`next_record`](Self::next_record) is
/// cancellation safe and can be used as a `tokio::select!` branch.
#[derive(Debug)]
pub struct RecordReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_len: usize,
}

impl<R> RecordReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(inner: R, max_len: usize) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            max_len,
        }
    }

    /// Read the next non-blank record, without its line terminator.
    ///
    /// Returns `Ok(None)` once the stream is closed.
    pub async fn next_record(&mut self) -> Result<Option<Bytes>, FrameError> {
        loop {
            // One byte of slack past the bound for the `\r` of a CRLF terminator.
            let overflowing = self.buf.len() > self.max_len + 1
                || (self.buf.len() == self.max_len + 1 && self.buf.last() != Some(&b'\r'));
            if overflowing {
                return Err(self.too_long());
            }

            let limit = (self.max_len + 2 - self.buf.len()) as u64;
            let read = (&mut self.inner)
                .take(limit)
                .read_until(b'\n', &mut self.buf)
                .await?;

            if self.buf.last() == Some(&b'\n') {
                let mut record = std::mem::take(&mut self.buf);
                record.pop();
                if record.last() == Some(&b'\r') {
                    record.pop();
                }
                if record.len() > self.max_len {
                    return Err(self.too_long());
                }
                if is_blank(&record) {
                    continue;
                }
                return Ok(Some(Bytes::from(record)));
            }

            if read == 0 {
                // Stream closed, possibly with an unterminated last record.
                let record = std::mem::take(&mut self.buf);
                if is_blank(&record) {
                    return Ok(None);
                }
                if record.len() > self.max_len {
                    return Err(self.too_long());
                }
                return Ok(Some(Bytes::from(record)));
            }
        }
    }

    fn too_long(&mut self) -> FrameError {
        self.buf.clear();
        FrameError::RecordTooLong {
            limit: self.max_len,
        }
    }

    /// Read the next record and decode it, surfacing both framing and decoding failures.
    pub async fn next_message(
        &mut self,
    ) -> Result<Option<(Bytes, Result<Message, super::MalformedMessage>)>, FrameError> {
        Ok(self.next_record().await?.map(|record| {
            let message = Message::decode(&record);
            (record, message)
        }))
    }
}

fn is_blank(record: &[u8]) -> bool {
    record.iter().all(u8::is_ascii_whitespace)
}

/// Writes whole records to a byte stream, flushing after each one.
#[derive(Debug)]
pub struct RecordWriter<W> {
    inner: W,
}

impl<W> RecordWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write an already encoded record. A missing line terminator is added.
    pub async fn write_record(&mut self, record: &[u8]) -> std::io::Result<()> {
        self.inner.write_all(record).await?;
        if record.last() != Some(&b'\n') {
            self.inner.write_all(b"\n").await?;
        }
        self.inner.flush().await
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), SendError> {
        let record = message.encode()?;
        self.write_record(&record).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}

/// Indicates that a message could not be written to the stream.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("stream error")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    fn reader(input: &'static [u8], max_len: usize) -> RecordReader<BufReader<&'static [u8]>> {
        RecordReader::new(BufReader::new(input), max_len)
    }

    #[tokio::test]
    async fn test_splits_records() {
        let mut records = reader(b"first\nsecond\r\n\n  \nthird", 64);

        assert_eq!(records.next_record().await.unwrap().unwrap(), "first");
        assert_eq!(records.next_record().await.unwrap().unwrap(), "second");
        assert_eq!(records.next_record().await.unwrap().unwrap(), "third");
        assert!(records.next_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_at_limit_is_accepted() {
        let mut records = reader(b"12345678\nabc\n", 8);
        assert_eq!(records.next_record().await.unwrap().unwrap(), "12345678");
        assert_eq!(records.next_record().await.unwrap().unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_crlf_record_at_limit_is_accepted() {
        let mut records = reader(b"12345678\r\nabc\r\n", 8);
        assert_eq!(records.next_record().await.unwrap().unwrap(), "12345678");
        assert_eq!(records.next_record().await.unwrap().unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_crlf_record_over_limit_is_rejected() {
        let mut records = reader(b"123456789\r\n", 8);
        let result = records.next_record().await;
        assert!(matches!(result, Err(FrameError::RecordTooLong { limit: 8 })));

        let mut records = reader(b"12345678\r9\n", 8);
        let result = records.next_record().await;
        assert!(matches!(result, Err(FrameError::RecordTooLong { limit: 8 })));
    }

    #[tokio::test]
    async fn test_record_over_limit_is_rejected() {
        let mut records = reader(b"123456789\n", 8);
        let result = records.next_record().await;
        assert!(matches!(result, Err(FrameError::RecordTooLong { limit: 8 })));
    }

    #[tokio::test]
    async fn test_next_message_decodes() {
        let mut records = reader(b"{\"type\":\"scmd\",\"command\":\"list-drones\"}\nnope\n", 1024);

        let (_, message) = records.next_message().await.unwrap().unwrap();
        assert_eq!(message.unwrap(), Message::server_command("list-drones"));

        let (raw, message) = records.next_message().await.unwrap().unwrap();
        assert_eq!(raw, "nope");
        assert!(message.is_err());
    }

    #[tokio::test]
    async fn test_writer_terminates_records() {
        let mut out = Vec::new();
        {
            let mut writer = RecordWriter::new(&mut out);
            writer.send(&Message::identify("Drone-1")).await.unwrap();
            writer.write_record(b"{}").await.unwrap();
        }
        assert_eq!(out, b"{\"type\":\"cid\",\"component\":\"Drone-1\"}\n{}\n");
    }
}
