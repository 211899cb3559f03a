//! Booking relay — classify rental-platform notification emails, extract a
//! canonical record and forward it to configured webhooks.

pub mod config;
pub mod email;
pub mod error;
pub mod pipeline;
