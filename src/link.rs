//! Client side of the relay protocol: connect, identify, then exchange records.

use bytes::Bytes;
use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::client::ClientName;
use crate::message::framing::SendError;
use crate::message::{
    DEFAULT_MAX_RECORD_LEN, FrameError, MalformedMessage, Message, RecordReader, RecordWriter,
};

pub type LinkReader = RecordReader<BufReader<OwnedReadHalf>>;
pub type LinkWriter = RecordWriter<OwnedWriteHalf>;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("failed to connect to relay")]
    Connect(#[source] std::io::Error),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// An identified connection to the relay.
#[derive(Debug)]
pub struct Link {
    name: ClientName,
    reader: LinkReader,
    writer: LinkWriter,
}

impl Link {
    /// Connect to `addr` and identify as `name`.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        name: impl Into<ClientName>,
    ) -> Result<Self, LinkError> {
        let name = name.into();
        let stream = TcpStream::connect(addr).await.map_err(LinkError::Connect)?;
        stream.set_nodelay(true).map_err(LinkError::Connect)?;

        let (read_half, write_half) = stream.into_split();
        let mut link = Self {
            reader: RecordReader::new(BufReader::new(read_half), DEFAULT_MAX_RECORD_LEN),
            writer: RecordWriter::new(write_half),
            name,
        };

        link.send(&Message::identify(link.name.as_str())).await?;
        debug!(client = %link.name, "Identified to relay");
        Ok(link)
    }

    pub fn name(&self) -> &ClientName {
        &self.name
    }

    pub async fn send(&mut self, message: &Message) -> Result<(), LinkError> {
        Ok(self.writer.send(message).await?)
    }

    /// Next raw record from the relay, `None` once it closes the connection.
    pub async fn next_record(&mut self) -> Result<Option<Bytes>, LinkError> {
        Ok(self.reader.next_record().await?)
    }

    pub async fn next_message(
        &mut self,
    ) -> Result<Option<(Bytes, Result<Message, MalformedMessage>)>, LinkError> {
        Ok(self.reader.next_message().await?)
    }

    /// Split into independently usable halves, e.g. to read and write from separate tasks.
    pub fn into_parts(self) -> (ClientName, LinkReader, LinkWriter) {
        (self.name, self.reader, self.writer)
    }
}
