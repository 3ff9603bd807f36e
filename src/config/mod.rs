pub mod types;
pub mod resolve;
pub mod validator;
pub mod resolved;

pub use types::*;
pub use resolve::*;
pub use validator::*;
pub use resolved::*;
