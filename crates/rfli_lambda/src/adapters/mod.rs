pub mod invoke;
pub mod key_value;
pub mod market_source;
pub mod notify;
pub mod parameters;
pub mod secrets;
