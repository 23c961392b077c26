//! Print execution
//!
//! Drives one complete printer interaction per call: build a transport
//! from the configuration snapshot, open, send, close. The transport
//! handle never outlives a call, so every code path - including failures
//! before any byte is written - releases the device.

use kasir_printer::{EscPosBuilder, PrintResult, PrinterConfig, Transport, resolve_encoding};
use tracing::{info, instrument};

/// Seam between the queue worker and the physical printer.
///
/// The worker is generic over this so tests can substitute a printer that
/// fails on demand.
#[allow(async_fn_in_trait)]
pub trait ReceiptPrinter {
    /// Print one rendered receipt: open, logo, body, cut, close.
    async fn print_receipt(&self, lines: &[String]) -> PrintResult<()>;
}

/// Result of a connection probe
#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

/// Executes printer interactions against an immutable config snapshot.
///
/// Reconfiguration replaces the executor (and the worker holding it)
/// wholesale; nothing here is mutated after construction.
pub struct PrintExecutor {
    config: PrinterConfig,
}

impl PrintExecutor {
    pub fn new(config: PrinterConfig) -> Self {
        Self { config }
    }

    /// Probe the configured transport: open then close, no bytes printed.
    /// Never touches job state.
    #[instrument(skip(self), fields(driver = %self.config.driver))]
    pub async fn check_connection(&self) -> ConnectionStatus {
        let mut transport = match Transport::from_config(&self.config) {
            Ok(t) => t,
            Err(e) => {
                return ConnectionStatus {
                    connected: false,
                    message: e.to_string(),
                };
            }
        };

        match transport.open().await {
            Ok(()) => {
                let _ = transport.close().await;
                ConnectionStatus {
                    connected: true,
                    message: "printer reachable".to_string(),
                }
            }
            Err(e) => {
                let _ = transport.close().await;
                ConnectionStatus {
                    connected: false,
                    message: e.to_string(),
                }
            }
        }
    }

    /// Kick the cash drawer: open, pulse, close.
    ///
    /// Synchronous with respect to the caller - never queued, never
    /// retried, never persisted.
    #[instrument(skip(self), fields(driver = %self.config.driver))]
    pub async fn open_drawer(&self) -> PrintResult<()> {
        let mut builder = EscPosBuilder::new(resolve_encoding(&self.config.encoding));
        builder.open_drawer();
        let data = builder.build();

        let mut transport = Transport::from_config(&self.config)?;
        transport.open().await?;
        let written = transport.write(&data).await;
        let closed = transport.close().await;
        written?;
        closed?;
        info!("cash drawer pulse sent");
        Ok(())
    }

    fn render(&self, lines: &[String]) -> Vec<u8> {
        let mut builder = EscPosBuilder::new(resolve_encoding(&self.config.encoding));
        builder.center();
        if let Some(path) = &self.config.logo_path
            && let Some(raster) = kasir_printer::process_logo(path)
        {
            builder.raw(&raster);
        }
        for line in lines {
            builder.line(line);
        }
        builder.cut_feed(3);
        builder.build()
    }
}

impl ReceiptPrinter for PrintExecutor {
    #[instrument(skip(self, lines), fields(driver = %self.config.driver, lines = lines.len()))]
    async fn print_receipt(&self, lines: &[String]) -> PrintResult<()> {
        let mut transport = Transport::from_config(&self.config)?;
        transport.open().await?;

        let data = self.render(lines);
        let written = transport.write(&data).await;
        let closed = transport.close().await;
        written?;
        closed?;
        info!(bytes = data.len(), "receipt sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> PrinterConfig {
        PrinterConfig {
            driver: "network".to_string(),
            // Loopback port 1 refuses immediately
            address: Some("127.0.0.1".to_string()),
            port: 1,
            ..PrinterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_check_connection_unreachable() {
        let executor = PrintExecutor::new(unreachable_config());
        let status = executor.check_connection().await;
        assert!(!status.connected);
        assert!(!status.message.is_empty());
    }

    #[tokio::test]
    async fn test_check_connection_bad_driver() {
        let executor = PrintExecutor::new(PrinterConfig {
            driver: "carrier-pigeon".to_string(),
            ..PrinterConfig::default()
        });
        let status = executor.check_connection().await;
        assert!(!status.connected);
        assert!(status.message.contains("carrier-pigeon"));
    }

    #[tokio::test]
    async fn test_print_receipt_reaches_printer() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let executor = PrintExecutor::new(PrinterConfig {
            driver: "network".to_string(),
            address: Some("127.0.0.1".to_string()),
            port: addr.port(),
            ..PrinterConfig::default()
        });

        let lines = vec!["WARUNG BU TINI".to_string(), "Kembali  : 0".to_string()];
        executor.print_receipt(&lines).await.unwrap();

        let received = server.await.unwrap();
        let text = String::from_utf8_lossy(&received);
        assert!(text.contains("WARUNG BU TINI"));
        assert!(text.contains("Kembali  : 0"));
        // Full cut with feed at the end
        assert!(received.windows(4).any(|w| w == [0x1D, 0x56, 0x42, 3]));
    }

    #[tokio::test]
    async fn test_open_drawer_sends_pulse() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let executor = PrintExecutor::new(PrinterConfig {
            driver: "network".to_string(),
            address: Some("127.0.0.1".to_string()),
            port: addr.port(),
            ..PrinterConfig::default()
        });

        executor.open_drawer().await.unwrap();

        let received = server.await.unwrap();
        assert!(received.windows(5).any(|w| w == [0x1B, 0x70, 0x00, 25, 250]));
    }
}
