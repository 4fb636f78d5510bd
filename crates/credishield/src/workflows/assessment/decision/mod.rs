mod confidence;
mod recommendations;

pub use confidence::{band_for_score, estimate, ConfidenceBand, ConfidenceResult};
pub use recommendations::{format_rupees, recommend, MAX_RECOMMENDATIONS};
