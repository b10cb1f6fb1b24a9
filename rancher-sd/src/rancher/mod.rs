pub mod api;
pub mod client;
mod projects;
pub mod services;
pub mod stacks;

pub use client::RancherClient;
pub use services::{candidates, Candidate};
pub use stacks::StackNames;
