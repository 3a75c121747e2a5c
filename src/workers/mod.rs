pub mod notify_retry;
pub mod status_sweep;
