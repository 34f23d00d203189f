pub mod question_model;
pub mod room_model;
pub mod user_model;
