pub mod bus;
pub mod driver;
pub mod mode;
pub mod registers;
pub mod traits;

#[cfg(test)]
pub mod sim;

pub use driver::{Rfm69, Rfm69Pins};
pub use mode::RadioMode;
pub use traits::{Band, PacketRadio, RadioConfig, RadioError, RadioFrame};
