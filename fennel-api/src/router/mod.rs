pub mod router;
pub mod health;
pub mod models;
pub mod relay;

#[cfg(test)]
mod tests;
