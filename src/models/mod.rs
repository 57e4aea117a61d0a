pub mod booking;
pub mod pricing;
pub mod quote;
pub mod trip;
