//! M-Pesa push-payment integration

pub mod daraja;
pub mod phone;
pub mod types;
