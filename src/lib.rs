#[macro_use]
extern crate async_trait;

pub mod aggregate;
pub mod configuration;
pub mod generator;
pub mod model;
pub mod period;
pub mod run;
pub mod sharded_stats;
pub mod store;
pub mod timing;
