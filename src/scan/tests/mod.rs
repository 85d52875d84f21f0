pub mod helpers;
mod tests_buffers;
