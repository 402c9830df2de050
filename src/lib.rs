//! Resolves a video id into directly fetchable stream URLs plus metadata, by reading the
//! player configuration embedded in the watch page and deciphering scrambled signatures
//! with a transform program mined from the player script.

pub mod cipher;
pub mod error;
pub mod extractor;
pub mod formats;
pub mod models;
pub mod page;
pub mod thumbnails;
pub mod transport;
pub mod utils;

pub use cipher::{Transform, TransformProgram, derive_program};
pub use error::ExtractError;
pub use extractor::{ExtractorBuilder, ResolveTask, YouTubeExtractor};
pub use formats::{Container, FormatDescriptor, Resolution};
pub use models::{ExtractionResult, ResolvedStream};
pub use thumbnails::{Thumbnail, thumbnail, thumbnails};
pub use transport::{HttpTransport, Transport};
