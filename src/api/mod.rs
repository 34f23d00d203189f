pub mod auth;
pub mod middleware;
pub mod question;
pub mod room;
