pub mod phare;

pub use phare::{Phare, PharePhase, PhareSpec, PhareStatus};
