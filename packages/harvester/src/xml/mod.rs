//! XML navigation helpers shared by the feed and RDF readers.

mod utils;

pub use utils::*;
