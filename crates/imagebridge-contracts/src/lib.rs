pub mod chat;
pub mod models;
pub mod regions;

mod nullable;
