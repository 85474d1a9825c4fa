pub mod ask;
pub mod conversations;
pub mod extractions;
pub mod health;
pub mod models;
