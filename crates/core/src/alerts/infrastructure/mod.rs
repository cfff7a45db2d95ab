pub mod log_alert_sink;
