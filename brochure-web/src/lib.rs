//! Page acquisition and brochure assembly.
//!
//! - HTML extraction into immutable [`extract::Page`] values (`extract`)
//! - Browser-like page fetching over HTTP (`fetch`)
//! - Landing page plus selected sub-pages folded into one document (`aggregate`)
//! - Prompt building, whole and streamed brochure generation (`brochure`)

pub mod aggregate;
pub mod brochure;
pub mod extract;
pub mod fetch;

pub use aggregate::ContentAggregator;
pub use brochure::{BrochureGenerator, MarkdownDisplay};
pub use extract::Page;
pub use fetch::PageFetcher;
