mod asset_loader_error;
mod decode_error;
mod load_error;

pub use asset_loader_error::*;
pub use decode_error::*;
pub use load_error::*;
