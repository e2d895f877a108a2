pub mod credential;
pub mod session;
