pub mod currency;
pub mod driver;
pub mod order;
pub mod rate;
