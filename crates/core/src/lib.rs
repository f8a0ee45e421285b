pub mod package;
pub mod reel;
pub mod shared;
pub mod writer;
