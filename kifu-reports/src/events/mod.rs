pub mod bus;
pub mod subscriber;

pub use bus::ReportEvents;
