pub mod input_selector;
pub mod ring_builder;

pub use input_selector::{InputSelector, UtxoSelection};
pub use ring_builder::{build_anon_ring, PreparedRing};
