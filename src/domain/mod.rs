pub mod models;
pub mod palette;
