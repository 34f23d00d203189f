pub mod bcrypt;
pub mod jwt;
