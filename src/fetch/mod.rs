pub mod client;
pub mod pages;
pub mod retry;

pub use client::*;
pub use pages::*;
pub use retry::*;
