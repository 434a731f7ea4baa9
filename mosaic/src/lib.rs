pub mod bitmap;
pub mod config;
pub mod convolution;
pub mod coordinator;
pub mod error;
pub mod job;
pub mod kernel;
pub mod partition;
pub mod transport;
pub mod wire;
pub mod worker;

pub use bitmap::{Bitmap, BitmapDesc};
pub use config::Config;
pub use convolution::Accumulation;
pub use error::{Error, Result};
pub use job::{blur, blur_file};
pub use kernel::Kernel;
