//! Data models for CityWatch

mod aggregate;
mod alert;
mod anomaly;
mod reading;

pub use aggregate::*;
pub use alert::*;
pub use anomaly::*;
pub use reading::*;
