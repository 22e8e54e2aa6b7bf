pub mod conflict;
pub mod consensus;
pub mod normalize;
pub mod odds;
pub mod pick;
pub mod record;
pub mod selector;

pub use consensus::{ConsensusEngine, Rating};
pub use pick::{Confidence, Pick, PickResult};
pub use selector::select_featured;
