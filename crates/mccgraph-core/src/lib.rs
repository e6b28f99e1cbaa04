pub mod config_manager;
pub mod credentials;
pub mod error;
pub mod traits;
pub mod types;

pub use config_manager::*;
pub use credentials::*;
pub use error::*;
pub use traits::*;
pub use types::*;
