//! # Serial Transport
//!
//! The gateway writes commands through the [`Transport`] trait and receives bytes
//! through a [`ByteSink`]. [`StreamTransport`] adapts any async writer, which covers
//! the Wio-E5 serial port as well as in-memory pipes used in tests.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::constants::{DEFAULT_BAUDRATE, LINE_TERMINATOR};
use crate::error::GatewayError;
use crate::link::queue::ByteSink;

/// Line-oriented output towards the radio module
#[async_trait]
pub trait Transport: Send {
    /// Write `text` followed by the line terminator and flush it.
    async fn write_line(&mut self, text: &str) -> io::Result<()>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn write_line(&mut self, text: &str) -> io::Result<()> {
        (**self).write_line(text).await
    }
}

/// Configuration for serial connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baudrate: u32,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: DEFAULT_BAUDRATE,
            timeout: Duration::from_secs(1),
        }
    }
}

/// [`Transport`] over any async byte writer
#[derive(Debug)]
pub struct StreamTransport<W> {
    writer: W,
    lines_written: u64,
}

impl<W> StreamTransport<W> {
    pub fn new(writer: W) -> Self {
        StreamTransport {
            writer,
            lines_written: 0,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Transport for StreamTransport<W> {
    async fn write_line(&mut self, text: &str) -> io::Result<()> {
        trace!("TX: {text}");
        self.writer.write_all(text.as_bytes()).await?;
        self.writer.write_all(LINE_TERMINATOR.as_bytes()).await?;
        self.writer.flush().await?;
        self.lines_written += 1;
        Ok(())
    }
}

/// Write half of an open Wio-E5 serial port
pub type SerialTransport = StreamTransport<WriteHalf<SerialStream>>;

/// Read half of an open Wio-E5 serial port
pub type SerialReader = ReadHalf<SerialStream>;

/// Open the serial port the radio module is attached to (8N1).
pub fn open_serial(
    port_name: &str,
    config: &SerialConfig,
) -> Result<(SerialTransport, SerialReader), GatewayError> {
    let port = tokio_serial::new(port_name, config.baudrate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None)
        .timeout(config.timeout)
        .open_native_async()
        .map_err(|e| GatewayError::SerialPortError(e.to_string()))?;

    debug!("Opened {port_name} at {} baud", config.baudrate);
    let (reader, writer) = tokio::io::split(port);
    Ok((StreamTransport::new(writer), reader))
}

/// Spawn a task delivering every byte read from `reader` into `sink`.
///
/// The task ends with the total byte count when the reader reaches end of stream,
/// or with the read error.
pub fn spawn_byte_reader<R>(mut reader: R, sink: ByteSink) -> JoinHandle<io::Result<u64>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                debug!("Byte reader reached end of stream after {total} bytes");
                return Ok(total);
            }
            sink.feed_slice(&buf[..n]);
            total += n as u64;
        }
    })
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
