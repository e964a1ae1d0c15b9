pub mod socket;
pub mod status;
pub mod webhooks;
