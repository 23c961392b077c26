//! Bridge configuration
//!
//! All configuration items can be overridden via environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | WORK_DIR | /var/lib/kasir | working directory (job database, logs) |
//! | LOG_LEVEL | info | tracing level filter |
//! | LOG_DIR | (unset) | daily rolling log files when set |
//! | MAX_RETRIES | 3 | print attempts before a job is marked failed |
//! | PRINTER_DRIVER | network | network \| usb \| bluetooth |
//! | PRINTER_ADDRESS | (unset) | host/IP (network) or MAC address (bluetooth) |
//! | PRINTER_PORT | 9100 | TCP port for the network driver |
//! | PRINTER_VENDOR_ID | (unset) | USB vendor id, 16-bit hex |
//! | PRINTER_PRODUCT_ID | (unset) | USB product id, 16-bit hex |
//! | PRINTER_CHANNEL | 1 | RFCOMM channel for the bluetooth driver |
//! | PRINTER_ENCODING | utf-8 | text encoding label (e.g. gbk, windows-1252) |
//! | PRINTER_LOGO | (unset) | path to a logo image printed atop receipts |

use kasir_printer::PrinterConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// Working directory, holds the job database and log files
    pub work_dir: String,
    pub log_level: String,
    pub log_dir: Option<String>,
    /// Print attempts before a job is terminally failed
    pub max_retries: u32,

    // === Printer transport ===
    pub printer_driver: String,
    pub printer_address: Option<String>,
    pub printer_port: u16,
    pub printer_vendor_id: Option<String>,
    pub printer_product_id: Option<String>,
    pub printer_channel: u8,
    pub printer_encoding: String,
    pub printer_logo: Option<String>,
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/kasir".into()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_dir: std::env::var("LOG_DIR").ok(),
            max_retries: std::env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3),

            printer_driver: std::env::var("PRINTER_DRIVER").unwrap_or_else(|_| "network".into()),
            printer_address: std::env::var("PRINTER_ADDRESS").ok(),
            printer_port: std::env::var("PRINTER_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(9100),
            printer_vendor_id: std::env::var("PRINTER_VENDOR_ID").ok(),
            printer_product_id: std::env::var("PRINTER_PRODUCT_ID").ok(),
            printer_channel: std::env::var("PRINTER_CHANNEL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1),
            printer_encoding: std::env::var("PRINTER_ENCODING").unwrap_or_else(|_| "utf-8".into()),
            printer_logo: std::env::var("PRINTER_LOGO").ok(),
        }
    }

    /// Snapshot of the printer transport settings.
    ///
    /// Transport validation happens when the snapshot is used to build a
    /// transport, not here: a bridge with a misconfigured printer still
    /// starts and still queues jobs.
    pub fn printer_config(&self) -> PrinterConfig {
        PrinterConfig {
            driver: self.printer_driver.clone(),
            address: self.printer_address.clone(),
            port: self.printer_port,
            vendor_id: self.printer_vendor_id.clone(),
            product_id: self.printer_product_id.clone(),
            channel: self.printer_channel,
            encoding: self.printer_encoding.clone(),
            logo_path: self.printer_logo.clone(),
        }
    }
}
