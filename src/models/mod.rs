// src/models/mod.rs

pub mod comment;
pub mod interaction;
pub mod post;
pub mod tag;
pub mod user;
