pub mod order_notifier;
pub mod push_initiator;
pub mod reconciler;
pub mod refund;
pub mod status_verifier;
