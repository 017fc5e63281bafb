pub mod health;
pub mod skin;
pub mod stats;
