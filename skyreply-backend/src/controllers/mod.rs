pub mod health;
pub mod mentions;
