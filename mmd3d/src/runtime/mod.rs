mod counter;
mod morph;
mod physics;
mod pose;

pub use counter::*;
pub use morph::*;
pub use physics::*;
pub use pose::*;



#[cfg(test)]
mod morph_tests;
