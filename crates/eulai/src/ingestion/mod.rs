//! Document ingestion: tree building, noise filtering, extraction and segmentation

pub mod extractor;
pub mod filter;
pub mod html;
pub mod node;
pub mod segmenter;

pub use extractor::{normalize, Extractor, MAX_TREE_DEPTH};
pub use filter::{ExclusionPredicate, NoiseFilter};
pub use html::HtmlDocument;
pub use node::{NodeKind, StructuredNode};
pub use segmenter::Segmenter;
