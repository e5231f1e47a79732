pub mod claims;
mod login;
mod register;
pub mod session;

pub use login::{handle_login, handle_me};
pub use register::handle_register;
