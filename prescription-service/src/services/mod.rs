pub mod cleanup;
pub mod file_type;
pub mod providers;

pub use cleanup::AssetGuard;
pub use file_type::{validate_file_type, FileTypeError};
