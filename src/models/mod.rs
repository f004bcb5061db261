pub mod letter;
pub mod user;

pub use letter::*;
pub use user::*;
