use crate::alerts::domain::alert::Alert;
use crate::alerts::domain::alert_sink::{AlertError, AlertSink};

/// Writes alerts to the log instead of sending them anywhere.
#[derive(Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
        let message = alert.summary();
        log::info!("To {}: {}", alert.recipient, message.subject);
        for line in message.body.lines().filter(|l| !l.is_empty()) {
            log::info!("  {line}");
        }
        Ok(())
    }
}
