//! Printer transports
//!
//! One contract over three incompatible ways of reaching a receipt printer:
//! - Network: raw TCP to port 9100 (most thermal printers)
//! - USB: bulk OUT endpoint matched by vendor/product id
//! - Bluetooth: serial over an RFCOMM binding managed by the OS
//!
//! A transport is built from an immutable [`PrinterConfig`] snapshot per
//! attempt; construction validates the configuration exhaustively before
//! any device is touched.

use crate::error::{PrintError, PrintResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{info, instrument, warn};

/// Default raw-printing TCP port
pub const DEFAULT_NETWORK_PORT: u16 = 9100;

/// Local RFCOMM device slot used for the serial binding
const RFCOMM_SLOT: u8 = 0;

/// Immutable printer configuration snapshot
///
/// Owned by the caller and replaced wholesale on reconfiguration; a running
/// worker never sees the driver change under it.
#[derive(Debug, Clone)]
pub struct PrinterConfig {
    /// Driver tag: "network", "usb" or "bluetooth"
    pub driver: String,
    /// Network host or Bluetooth MAC address
    pub address: Option<String>,
    /// Network port (raw printing convention is 9100)
    pub port: u16,
    /// USB vendor id as a 16-bit hex string (e.g. "0x04b8" or "04b8")
    pub vendor_id: Option<String>,
    /// USB product id as a 16-bit hex string
    pub product_id: Option<String>,
    /// Bluetooth RFCOMM channel
    pub channel: u8,
    /// Text encoding label for device output (e.g. "utf-8", "gbk")
    pub encoding: String,
    /// Optional store logo image, rendered before the receipt body
    pub logo_path: Option<String>,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            driver: "network".to_string(),
            address: None,
            port: DEFAULT_NETWORK_PORT,
            vendor_id: None,
            product_id: None,
            channel: 1,
            encoding: "utf-8".to_string(),
            logo_path: None,
        }
    }
}

/// A byte-oriented connection to the physical printer
///
/// Exactly three variants; an unknown driver tag fails at construction.
/// `close` is safe on every path, including after a failed `open`.
pub enum Transport {
    Network(NetworkTransport),
    Usb(UsbTransport),
    Bluetooth(BluetoothTransport),
}

impl Transport {
    /// Build a transport from the configuration snapshot.
    ///
    /// Validation is exhaustive and happens before any device access:
    /// missing addresses, unparsable USB ids and unknown driver tags all
    /// fail here with [`PrintError::Config`].
    pub fn from_config(config: &PrinterConfig) -> PrintResult<Self> {
        match config.driver.as_str() {
            "network" => {
                let host = config
                    .address
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        PrintError::Config("printer address is not configured".to_string())
                    })?;
                Ok(Self::Network(NetworkTransport::new(host, config.port)))
            }
            "usb" => {
                let vendor_id = parse_usb_id("vendor id", config.vendor_id.as_deref())?;
                let product_id = parse_usb_id("product id", config.product_id.as_deref())?;
                Ok(Self::Usb(UsbTransport::new(vendor_id, product_id)))
            }
            "bluetooth" => {
                let address = config
                    .address
                    .as_deref()
                    .filter(|a| !a.is_empty())
                    .ok_or_else(|| {
                        PrintError::Config("bluetooth address is not configured".to_string())
                    })?;
                Ok(Self::Bluetooth(BluetoothTransport::new(
                    address,
                    config.channel,
                )))
            }
            other => Err(PrintError::Config(format!(
                "unknown printer driver: {other}"
            ))),
        }
    }

    /// Open the device connection
    pub async fn open(&mut self) -> PrintResult<()> {
        match self {
            Self::Network(t) => t.open().await,
            Self::Usb(t) => t.open().await,
            Self::Bluetooth(t) => t.open().await,
        }
    }

    /// Write raw bytes to the open device
    pub async fn write(&mut self, bytes: &[u8]) -> PrintResult<()> {
        match self {
            Self::Network(t) => t.write(bytes).await,
            Self::Usb(t) => t.write(bytes).await,
            Self::Bluetooth(t) => t.write(bytes).await,
        }
    }

    /// Close the device, releasing anything acquired by `open`.
    ///
    /// Safe to call when `open` failed partway or was never called.
    pub async fn close(&mut self) -> PrintResult<()> {
        match self {
            Self::Network(t) => t.close().await,
            Self::Usb(t) => t.close().await,
            Self::Bluetooth(t) => t.close().await,
        }
    }
}

/// Parse a 16-bit hex USB identifier ("0x04b8" or "04b8")
fn parse_usb_id(what: &str, value: Option<&str>) -> PrintResult<u16> {
    let raw = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PrintError::Config(format!("usb {what} is not configured")))?;
    let trimmed = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(trimmed, 16)
        .map_err(|_| PrintError::Config(format!("invalid usb {what}: {raw}")))
}

// ============================================================================
// Network
// ============================================================================

/// TCP transport (raw printing, port 9100 by convention)
pub struct NetworkTransport {
    addr: String,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
            stream: None,
        }
    }

    /// Connect to the printer.
    ///
    /// No connect timeout is applied: a hung printer blocks the queue until
    /// the OS gives up. This matches how the service has always behaved.
    #[instrument(skip(self), fields(addr = %self.addr))]
    pub async fn open(&mut self) -> PrintResult<()> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| PrintError::Transport(format!("connect {}: {e}", self.addr)))?;
        info!("printer connected");
        self.stream = Some(stream);
        Ok(())
    }

    pub async fn write(&mut self, bytes: &[u8]) -> PrintResult<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| PrintError::Transport("device not open".to_string()))?;
        stream.write_all(bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> PrintResult<()> {
        if let Some(mut stream) = self.stream.take() {
            // Shutdown failures only mean the peer is already gone
            let _ = stream.shutdown().await;
        }
        Ok(())
    }
}

// ============================================================================
// USB
// ============================================================================

/// USB transport: bulk OUT endpoint on the device matching vendor/product id
pub struct UsbTransport {
    vendor_id: u16,
    product_id: u16,
    handle: Option<Arc<rusb::DeviceHandle<rusb::GlobalContext>>>,
    interface: u8,
    endpoint: u8,
}

impl UsbTransport {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            handle: None,
            interface: 0,
            endpoint: 0,
        }
    }

    /// Find and claim the printer.
    ///
    /// libusb calls are blocking, so the whole open sequence runs on the
    /// blocking pool (same treatment the OS driver path gets elsewhere).
    #[instrument(skip(self), fields(vid = format!("{:04x}", self.vendor_id), pid = format!("{:04x}", self.product_id)))]
    pub async fn open(&mut self) -> PrintResult<()> {
        let vid = self.vendor_id;
        let pid = self.product_id;

        let (handle, interface, endpoint) = tokio::task::spawn_blocking(move || {
            open_usb_device(vid, pid)
        })
        .await
        .map_err(|e| PrintError::Transport(format!("usb task join failed: {e}")))??;

        info!(interface, endpoint, "usb printer claimed");
        self.handle = Some(Arc::new(handle));
        self.interface = interface;
        self.endpoint = endpoint;
        Ok(())
    }

    pub async fn write(&mut self, bytes: &[u8]) -> PrintResult<()> {
        let handle = self
            .handle
            .as_ref()
            .cloned()
            .ok_or_else(|| PrintError::Transport("device not open".to_string()))?;
        let endpoint = self.endpoint;
        let data = bytes.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut written = 0;
            while written < data.len() {
                // Zero timeout = unlimited; a wedged printer blocks the queue
                let n = handle
                    .write_bulk(endpoint, &data[written..], Duration::ZERO)
                    .map_err(|e| PrintError::Transport(format!("usb write: {e}")))?;
                if n == 0 {
                    return Err(PrintError::Transport("usb write stalled".to_string()));
                }
                written += n;
            }
            Ok(())
        })
        .await
        .map_err(|e| PrintError::Transport(format!("usb task join failed: {e}")))?
    }

    pub async fn close(&mut self) -> PrintResult<()> {
        if let Some(handle) = self.handle.take() {
            let interface = self.interface;
            let _ = tokio::task::spawn_blocking(move || {
                if let Err(e) = handle.release_interface(interface) {
                    warn!(error = %e, "usb interface release failed");
                }
            })
            .await;
        }
        Ok(())
    }
}

/// Blocking half of the USB open: enumerate, match, claim, find bulk OUT.
fn open_usb_device(
    vid: u16,
    pid: u16,
) -> PrintResult<(rusb::DeviceHandle<rusb::GlobalContext>, u8, u8)> {
    let devices = rusb::devices()
        .map_err(|e| PrintError::Transport(format!("usb enumeration failed: {e}")))?;

    for device in devices.iter() {
        let descriptor = match device.device_descriptor() {
            Ok(d) => d,
            Err(_) => continue,
        };
        if descriptor.vendor_id() != vid || descriptor.product_id() != pid {
            continue;
        }

        let handle = device.open().map_err(|e| {
            PrintError::Transport(format!("usb open {vid:04x}:{pid:04x}: {e}"))
        })?;

        let config = device.active_config_descriptor().map_err(|e| {
            PrintError::Transport(format!("usb config descriptor: {e}"))
        })?;

        for interface in config.interfaces() {
            for descriptor in interface.descriptors() {
                for endpoint in descriptor.endpoint_descriptors() {
                    if endpoint.direction() == rusb::Direction::Out
                        && endpoint.transfer_type() == rusb::TransferType::Bulk
                    {
                        let iface = descriptor.interface_number();
                        // Kernel usblp driver may own the interface
                        let _ = handle.set_auto_detach_kernel_driver(true);
                        handle.claim_interface(iface).map_err(|e| {
                            PrintError::Transport(format!("usb claim interface {iface}: {e}"))
                        })?;
                        return Ok((handle, iface, endpoint.address()));
                    }
                }
            }
        }

        return Err(PrintError::Transport(format!(
            "usb device {vid:04x}:{pid:04x} has no bulk OUT endpoint"
        )));
    }

    Err(PrintError::Transport(format!(
        "usb device {vid:04x}:{pid:04x} not found"
    )))
}

// ============================================================================
// Bluetooth (serial over RFCOMM)
// ============================================================================

/// Bluetooth transport: writes to the serial device created by an RFCOMM
/// binding of the printer's MAC address.
pub struct BluetoothTransport {
    address: String,
    channel: u8,
    file: Option<tokio::fs::File>,
}

impl BluetoothTransport {
    pub fn new(address: &str, channel: u8) -> Self {
        Self {
            address: address.to_string(),
            channel,
            file: None,
        }
    }

    fn device_path(&self) -> String {
        format!("/dev/rfcomm{RFCOMM_SLOT}")
    }

    fn bind_command(&self) -> String {
        format!("rfcomm bind {RFCOMM_SLOT} {} {}", self.address, self.channel)
    }

    /// (Re)establish the RFCOMM binding, best-effort and idempotent.
    ///
    /// The slot is released first so binding the same address+channel twice
    /// never errors. Failures are logged, not fatal: the binding may already
    /// exist from a previous run or have been set up by the operator.
    pub async fn bind_channel(&self) -> PrintResult<()> {
        let release = tokio::process::Command::new("rfcomm")
            .args(["release", &RFCOMM_SLOT.to_string()])
            .output()
            .await;
        if let Err(e) = release {
            warn!(error = %e, "rfcomm release failed");
        }

        let bind = tokio::process::Command::new("rfcomm")
            .args([
                "bind",
                &RFCOMM_SLOT.to_string(),
                &self.address,
                &self.channel.to_string(),
            ])
            .output()
            .await;
        match bind {
            Ok(out) if !out.status.success() => {
                warn!(
                    address = %self.address,
                    channel = self.channel,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "rfcomm bind failed"
                );
            }
            Err(e) => warn!(error = %e, "rfcomm bind could not run"),
            Ok(_) => {}
        }
        Ok(())
    }

    #[instrument(skip(self), fields(address = %self.address, channel = self.channel))]
    pub async fn open(&mut self) -> PrintResult<()> {
        self.bind_channel().await?;

        let path = self.device_path();
        if tokio::fs::metadata(&path).await.is_err() {
            return Err(PrintError::Transport(format!(
                "serial device {path} not found; run: {}",
                self.bind_command()
            )));
        }

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .await
            .map_err(|e| PrintError::Transport(format!("open {path}: {e}")))?;
        info!(path = %path, "bluetooth serial device opened");
        self.file = Some(file);
        Ok(())
    }

    pub async fn write(&mut self, bytes: &[u8]) -> PrintResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| PrintError::Transport("device not open".to_string()))?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn close(&mut self) -> PrintResult<()> {
        // Dropping the handle releases the serial device; the RFCOMM binding
        // itself stays for the next attempt.
        self.file = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_config(address: Option<&str>) -> PrinterConfig {
        PrinterConfig {
            driver: "network".to_string(),
            address: address.map(str::to_string),
            ..PrinterConfig::default()
        }
    }

    #[test]
    fn test_unknown_driver_is_config_error() {
        let config = PrinterConfig {
            driver: "parallel".to_string(),
            address: Some("192.168.1.50".to_string()),
            ..PrinterConfig::default()
        };
        match Transport::from_config(&config) {
            Err(PrintError::Config(msg)) => assert!(msg.contains("parallel")),
            Err(other) => panic!("expected config error, got {other:?}"),
            Ok(_) => panic!("expected config error, got a transport"),
        }
    }

    #[test]
    fn test_network_requires_address() {
        assert!(matches!(
            Transport::from_config(&network_config(None)),
            Err(PrintError::Config(_))
        ));
        assert!(matches!(
            Transport::from_config(&network_config(Some(""))),
            Err(PrintError::Config(_))
        ));
        assert!(Transport::from_config(&network_config(Some("192.168.1.50"))).is_ok());
    }

    #[test]
    fn test_usb_ids_parsed_before_device_access() {
        let mut config = PrinterConfig {
            driver: "usb".to_string(),
            vendor_id: Some("0x04b8".to_string()),
            product_id: Some("0202".to_string()),
            ..PrinterConfig::default()
        };
        assert!(Transport::from_config(&config).is_ok());

        config.product_id = Some("zz99".to_string());
        match Transport::from_config(&config) {
            Err(PrintError::Config(msg)) => assert!(msg.contains("zz99")),
            Err(other) => panic!("expected config error, got {other:?}"),
            Ok(_) => panic!("expected config error, got a transport"),
        }

        config.product_id = None;
        assert!(matches!(
            Transport::from_config(&config),
            Err(PrintError::Config(_))
        ));
    }

    #[test]
    fn test_bluetooth_requires_address() {
        let config = PrinterConfig {
            driver: "bluetooth".to_string(),
            ..PrinterConfig::default()
        };
        assert!(matches!(
            Transport::from_config(&config),
            Err(PrintError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_network_open_refused_is_transport_error() {
        // Port 1 on loopback refuses immediately
        let mut transport = NetworkTransport::new("127.0.0.1", 1);
        match transport.open().await {
            Err(PrintError::Transport(msg)) => assert!(!msg.is_empty()),
            other => panic!("expected transport error, got {other:?}"),
        }
        // Close after a failed open must be a no-op
        assert!(transport.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_network_round_trip() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut transport = NetworkTransport::new("127.0.0.1", addr.port());
        transport.open().await.unwrap();
        transport.write(b"ESC data").await.unwrap();
        transport.close().await.unwrap();

        assert_eq!(server.await.unwrap(), b"ESC data");
    }

    #[tokio::test]
    async fn test_write_before_open_fails() {
        let mut transport = NetworkTransport::new("127.0.0.1", 9100);
        assert!(matches!(
            transport.write(b"x").await,
            Err(PrintError::Transport(_))
        ));
    }

    #[test]
    fn test_bluetooth_error_carries_bind_command() {
        let transport = BluetoothTransport::new("00:11:22:33:44:55", 2);
        assert_eq!(
            transport.bind_command(),
            "rfcomm bind 0 00:11:22:33:44:55 2"
        );
    }
}
