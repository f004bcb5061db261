pub mod health;
pub mod auth;
pub mod letters;
pub mod realtime;
pub mod admin;
pub mod swagger;
