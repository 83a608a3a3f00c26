//! Line-oriented operator console.
//!
//! Input lines:
//! - `<barcode> [quantity]`: process a scan
//! - `status`: print the connection status as JSON
//! - `retry`: drain the unsent queue now
//! - `again`: re-submit the last scan that failed to record locally
//! - `quit`: exit
//!
//! A failed command never ends the session. When a scan cannot be written
//! to the local store it is held here until `again` succeeds.

use tracing::error;

use crate::orchestrator::{Orchestrator, SendOutcome};

/// What the caller should do with one input line's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Print(String),
    Silent,
    Quit,
}

/// A scan that could not be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeldScan {
    pub barcode: String,
    pub quantity: i64,
}

pub struct Console {
    orchestrator: Orchestrator,
    held: Option<HeldScan>,
}

impl Console {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            held: None,
        }
    }

    pub fn held(&self) -> Option<&HeldScan> {
        self.held.as_ref()
    }

    pub async fn handle_line(&mut self, line: &str) -> Reply {
        let line = line.trim();
        match line {
            "" => Reply::Silent,
            "quit" | "exit" => Reply::Quit,
            "status" => self.status().await,
            "retry" => match self.orchestrator.force_retry().await {
                Ok(outcome) => Reply::Print(outcome_line(&outcome)),
                Err(e) => {
                    error!(error = %e, "Manual retry failed");
                    Reply::Print(format!("FAIL {e}"))
                }
            },
            "again" => match self.held.take() {
                Some(held) => self.scan(held.barcode, held.quantity).await,
                None => Reply::Print("FAIL No held scan to retry".to_string()),
            },
            _ => {
                let mut parts = line.split_whitespace();
                let barcode = parts.next().unwrap_or_default().to_string();
                match parts.next().map(str::parse::<i64>) {
                    None => self.scan(barcode, 1).await,
                    Some(Ok(quantity)) => self.scan(barcode, quantity).await,
                    Some(Err(_)) => {
                        Reply::Print("FAIL Quantity must be a whole number".to_string())
                    }
                }
            }
        }
    }

    async fn status(&self) -> Reply {
        let status = match self.orchestrator.connection_status().await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "Could not read connection status");
                return Reply::Print(format!("FAIL {e}"));
            }
        };
        match serde_json::to_string_pretty(&status) {
            Ok(json) => Reply::Print(json),
            Err(e) => Reply::Print(format!("FAIL {e}")),
        }
    }

    async fn scan(&mut self, barcode: String, quantity: i64) -> Reply {
        match self.orchestrator.process_scan(&barcode, quantity).await {
            Ok(outcome) => Reply::Print(outcome_line(&outcome)),
            Err(e) => {
                error!(barcode = %barcode, quantity, error = %e, "Scan not recorded; holding it");
                self.held = Some(HeldScan { barcode, quantity });
                Reply::Print(format!("FAIL {e} - scan held, enter `again` to retry"))
            }
        }
    }
}

fn outcome_line(outcome: &SendOutcome) -> String {
    let tag = if outcome.success { "OK" } else { "FAIL" };
    format!("{tag} {}", outcome.status)
}
