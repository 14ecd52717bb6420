//! Microscopy Container Extraction Library
//!
//! Reads image planes out of Leica-style microscopy files and rebuilds single
//! images as standalone containers. Three file families are understood:
//!
//! - **Container** (`.lif`): one file with an embedded XML tree and many
//!   memory blocks
//! - **FolderIndex** (`.xlef`): an index referencing SingleImage files
//! - **SingleImage** (`.lof`): one raw image payload after a fixed header
//!
//! XML parsing happens upstream. Every operation here takes a validated
//! [`MetadataRecord`] describing where the raw bytes of one image live.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use microimg_extract::{composite, extract, MetadataRecord, PlaneRequest};
//! use microimg_extract::composite::{MinMaxStretch, NamedColors};
//!
//! let record = MetadataRecord::from_json_file("image.json")?;
//! let request = PlaneRequest::new(0, 0, 0, 512);
//! let planes = extract(&record, &request)?;
//! let rgb = composite(&planes, &record, None, &NamedColors, &MinMaxStretch);
//! rgb.to_rgb8().save("preview.png")?;
//! ```
//!
//! # Single-image export
//!
//! ```rust,ignore
//! use microimg_extract::{OutputConfig, SubContainerWriter, WriterConfig};
//! use microimg_extract::progress::NullProgress;
//!
//! let writer = SubContainerWriter::new(WriterConfig::default());
//! let outcome = writer.write_single_image(&record, &OutputConfig::default(), &NullProgress)?;
//! println!("wrote {}", outcome.path.display());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod batch;
pub mod cli;
pub mod composite;
pub mod config;
pub mod container;
pub mod convert;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod progress;
pub mod router;
pub mod stats;
pub mod writer;

// Re-export commonly used types
pub use address::{resolve, PlaneAddress, PlaneShape};
pub use composite::{composite, render_preview, RgbImage};
pub use config::{AppConfig, OutputConfig, RouterConfig, SamplerConfig, WriterConfig};
pub use container::{ContainerIndex, MemoryBlock};
pub use convert::{ConversionResult, Converter, OmeTiffEncoder};
pub use error::{MicroImgError, Result};
pub use extract::{extract, ExtractedPlanes, Plane, PlaneRequest};
pub use metadata::{FileType, MetadataRecord, SampleType};
pub use router::{route, Strategy};
pub use stats::{sample, ChannelStats};
pub use writer::{SubContainerWriter, WriteOutcome};

/// Library version information.
pub mod version {
    /// Library version string.
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    /// Library name.
    pub const NAME: &str = env!("CARGO_PKG_NAME");

    /// Get full version string.
    pub fn full_version() -> String {
        format!("{} {}", NAME, VERSION)
    }
}
