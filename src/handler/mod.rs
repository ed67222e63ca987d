pub mod middleware;
pub mod webhook;

pub use webhook::router;
