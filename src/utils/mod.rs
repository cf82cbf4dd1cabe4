mod span;

pub use span::{LineIndex, Location};
