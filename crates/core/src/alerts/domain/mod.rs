pub mod alert;
pub mod alert_sink;
pub mod cooldown_ledger;
