//! Physical links a line channel can run over

use std::{
    io,
    pin::Pin,
    task::{ Context, Poll },
    time::Duration,
};
use log::info;
use tokio::{
    io::{ AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf },
    net::TcpStream,
};
use tokio_serial::{ SerialPortBuilderExt, SerialStream };
use crate::error::{ Error, Result };

/// Sent to a GPIB gateway after every query so it reads the addressed instrument
pub const GPIB_READ_REQUEST: &str = "++read eoi";

/// An open byte stream to an instrument
///
/// Raw sockets, telnet ports, serial lines, GPIB gateways and simulated instruments all end up
/// as one of these, so the transports above never need to know which one they drive.
pub enum Link
{
    Tcp(TcpStream),
    Serial(SerialStream),
    /// In-process peer, see [`crate::sim`]
    Simulated(DuplexStream),
}

impl Link
{
    pub async fn tcp(address: &str, timeout: Duration) -> Result<Self>
    {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| Error::Timeout { command: format!("connect {}", address), timeout: timeout })??;
        stream.set_nodelay(true)?;
        info!("Connected to {}", address);

        Ok(Link::Tcp(stream))
    }

    /// Opens a serial port at 8N1 with no flow control
    pub fn serial(path: &str, baud_rate: u32) -> Result<Self>
    {
        let stream = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|err| Error::Io(io::Error::new(io::ErrorKind::Other, err)))?;
        info!("Opened serial port {} at {} baud", path, baud_rate);

        Ok(Link::Serial(stream))
    }

    /// Connects to a Prologix-style GPIB-over-Ethernet gateway and addresses one instrument
    ///
    /// The gateway is put in controller mode with automatic reads off; pair the link with
    /// [`GPIB_READ_REQUEST`] as the channel's read request.
    pub async fn gpib(address: &str, gpib_address: u8, timeout: Duration) -> Result<Self>
    {
        if gpib_address > 30 {
            return Err(Error::OutOfRange {
                what: "GPIB address",
                value: gpib_address as f64,
                min: 0.0,
                max: 30.0,
            });
        }

        let mut link = Self::tcp(address, timeout).await?;
        let setup = format!("++mode 1\n++addr {}\n++auto 0\n++eoi 1\n", gpib_address);
        link.write_all(setup.as_bytes()).await?;
        link.flush().await?;
        info!("Addressed GPIB instrument {} through {}", gpib_address, address);

        Ok(link)
    }

    pub fn simulated(stream: DuplexStream) -> Self
    {
        Link::Simulated(stream)
    }
}

impl AsyncRead for Link
{
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>>
    {
        match self.get_mut() {
            Link::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Link::Serial(stream) => Pin::new(stream).poll_read(cx, buf),
            Link::Simulated(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Link
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>>
    {
        match self.get_mut() {
            Link::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Link::Serial(stream) => Pin::new(stream).poll_write(cx, buf),
            Link::Simulated(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>
    {
        match self.get_mut() {
            Link::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Link::Serial(stream) => Pin::new(stream).poll_flush(cx),
            Link::Simulated(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>>
    {
        match self.get_mut() {
            Link::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Link::Serial(stream) => Pin::new(stream).poll_shutdown(cx),
            Link::Simulated(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
