#[macro_use]
extern crate log;

pub mod climate;
