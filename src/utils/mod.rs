// src/utils/mod.rs

pub mod admin_key;
pub mod answer_key;
pub mod html;
pub mod scoring;
pub mod upload;
