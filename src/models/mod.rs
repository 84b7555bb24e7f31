pub mod credential;
pub mod member;
