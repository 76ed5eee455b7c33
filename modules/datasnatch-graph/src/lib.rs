pub mod builder;
pub mod components;

pub use builder::{GraphBuilder, GraphStats};
pub use components::connected_groups;
