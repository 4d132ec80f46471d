#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod edge;
pub mod hal;
pub mod node;
pub mod poll;
pub mod protocol;
pub mod radio;
pub mod storage;

// Board support depends on esp-hal and is only available with the embedded feature
#[cfg(feature = "embedded")]
pub mod board;
