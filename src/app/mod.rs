pub mod ports;
pub mod wiring;
