//! Output strategy selection.

use serde::Serialize;

use crate::config::RouterConfig;
use crate::metadata::{FileType, MetadataRecord};

/// How an image should be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Strategy {
    /// Write a standalone single-image container.
    ExtractSingleImage,
    /// The existing SingleImage file is already the answer.
    PassthroughExisting,
    /// Hand the image to the OME-TIFF encoder.
    ConvertToOmeTiff {
        /// Interleaved RGB source.
        rgb: bool,
    },
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::ExtractSingleImage => write!(f, "extract single image"),
            Strategy::PassthroughExisting => write!(f, "pass through existing file"),
            Strategy::ConvertToOmeTiff { rgb: true } => write!(f, "convert to OME-TIFF (RGB)"),
            Strategy::ConvertToOmeTiff { rgb: false } => write!(f, "convert to OME-TIFF"),
        }
    }
}

/// Pick the strategy for `metadata`. Never fails.
pub fn route(metadata: &MetadataRecord, config: &RouterConfig) -> Strategy {
    let separated_tiles = metadata.dims.tiles > 1 && metadata.overlap_is_negative;
    let convert = Strategy::ConvertToOmeTiff {
        rgb: metadata.isrgb,
    };

    match metadata.filetype {
        FileType::Container if separated_tiles => Strategy::ExtractSingleImage,
        FileType::Container => convert,
        FileType::FolderIndex | FileType::SingleImage => {
            let small = metadata.dims.xs <= config.xy_threshold
                && metadata.dims.ys <= config.xy_threshold;
            if small || separated_tiles {
                Strategy::PassthroughExisting
            } else {
                convert
            }
        }
    }
}
