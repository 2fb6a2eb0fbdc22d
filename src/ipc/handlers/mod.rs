pub mod checkin;
pub mod core;
pub mod registry;
