//! Best-effort change notification to the status-bar process.

use std::process::{Command, Stdio};

use log::debug;

/// Signals an external UI process after every cache update. The bar may not
/// be running at all; every failure is swallowed.
pub struct NotificationSink {
    process_name: String,
    rtmin_offset: u8,
}

impl NotificationSink {
    pub fn new(process_name: String, rtmin_offset: u8) -> Self {
        Self {
            process_name,
            rtmin_offset,
        }
    }

    pub fn notify(&self) {
        let signal = format!("-RTMIN+{}", self.rtmin_offset);
        let result = Command::new("pkill")
            .arg(&signal)
            .arg(&self.process_name)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if let Err(error) = result {
            debug!("Failed to signal {}: {error}", self.process_name);
        }
    }
}
