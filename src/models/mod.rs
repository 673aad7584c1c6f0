pub mod moderation;

pub use moderation::*;
