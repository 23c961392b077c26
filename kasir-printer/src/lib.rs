//! # kasir-printer
//!
//! ESC/POS receipt printer library - low-level printing capabilities only.
//!
//! ## Scope
//!
//! This crate handles HOW to reach the printer and talk ESC/POS:
//! - ESC/POS command building
//! - Configurable text encoding for device output
//! - Network printing (TCP port 9100)
//! - USB printing (bulk OUT by vendor/product id)
//! - Bluetooth serial printing (RFCOMM binding)
//! - Logo raster processing
//!
//! Business logic (WHAT to print) stays in application code: receipt
//! rendering, the job queue and retry policy live in `kasir-bridge`.
//!
//! ## Example
//!
//! ```ignore
//! use kasir_printer::{EscPosBuilder, PrinterConfig, Transport, resolve_encoding};
//!
//! let config = PrinterConfig {
//!     driver: "network".into(),
//!     address: Some("192.168.1.100".into()),
//!     ..PrinterConfig::default()
//! };
//!
//! let mut builder = EscPosBuilder::new(resolve_encoding(&config.encoding));
//! builder.center();
//! builder.line("TOKO MAJU JAYA");
//! builder.cut_feed(3);
//!
//! let mut transport = Transport::from_config(&config)?;
//! transport.open().await?;
//! transport.write(&builder.build()).await?;
//! transport.close().await?;
//! ```

mod encoding;
mod error;
mod escpos;
mod transport;

// Re-exports
pub use encoding::{encode_text, resolve_encoding};
pub use error::{PrintError, PrintResult};
pub use escpos::EscPosBuilder;
pub use transport::{
    BluetoothTransport, DEFAULT_NETWORK_PORT, NetworkTransport, PrinterConfig, Transport,
    UsbTransport,
};

#[cfg(feature = "image")]
pub use escpos::process_logo;
