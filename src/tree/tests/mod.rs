pub mod helpers;
mod tests_facade;
