//! Strategy execution: turn a routing decision into an output file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{OutputConfig, RouterConfig, WriterConfig};
use crate::error::{MicroImgError, Result};
use crate::metadata::MetadataRecord;
use crate::progress::ProgressHandler;
use crate::router::{route, Strategy};
use crate::writer::SubContainerWriter;

/// External OME-TIFF encoder.
pub trait OmeTiffEncoder: Send + Sync {
    /// Encode the image `uuid` of `source` into `output_dir`.
    ///
    /// Returns the created file name (not the full path). Implementations
    /// also write into `alt_output_dir` when it is given.
    fn encode(
        &self,
        source: &Path,
        uuid: &str,
        output_dir: &Path,
        alt_output_dir: Option<&Path>,
        rgb: bool,
    ) -> Result<String>;
}

/// Encoder for builds without OME-TIFF support; always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedEncoder;

impl OmeTiffEncoder for UnsupportedEncoder {
    fn encode(&self, source: &Path, _: &str, _: &Path, _: Option<&Path>, _: bool) -> Result<String> {
        Err(MicroImgError::Encoder(format!(
            "no OME-TIFF encoder configured for {}",
            source.display()
        )))
    }
}

/// Output of one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    /// Base name without extension (and without a trailing `.ome`).
    pub name: String,
    /// Primary output file.
    pub full_path: PathBuf,
    /// Copy in the secondary folder, if it exists.
    pub alt_path: Option<PathBuf>,
}

/// Routes images and executes the chosen strategy.
pub struct Converter<E: OmeTiffEncoder> {
    router: RouterConfig,
    writer: SubContainerWriter,
    encoder: E,
}

impl<E: OmeTiffEncoder> Converter<E> {
    /// Create a converter.
    pub fn new(router: RouterConfig, writer: WriterConfig, encoder: E) -> Self {
        Self {
            router,
            writer: SubContainerWriter::new(writer),
            encoder,
        }
    }

    /// Strategy that [`Converter::convert`] would execute.
    pub fn strategy(&self, record: &MetadataRecord) -> Strategy {
        route(record, &self.router)
    }

    /// Route `record` and produce its output.
    pub fn convert(
        &self,
        record: &MetadataRecord,
        output: &OutputConfig,
        progress: &dyn ProgressHandler,
    ) -> Result<ConversionResult> {
        let strategy = self.strategy(record);
        log::info!("{:?}: {}", record.name, strategy);

        match strategy {
            Strategy::ExtractSingleImage => {
                let outcome = self.writer.write_single_image(record, output, progress)?;
                Ok(ConversionResult {
                    name: base_name(&outcome.file_name),
                    full_path: outcome.path,
                    alt_path: outcome.alt_path,
                })
            }
            Strategy::PassthroughExisting => passthrough(&record.file_path, output),
            Strategy::ConvertToOmeTiff { rgb } => {
                let out_dir = output.resolve_output_dir(&record.file_path);
                fs::create_dir_all(&out_dir)?;
                let created = self.encoder.encode(
                    &record.file_path,
                    &record.uuid,
                    &out_dir,
                    output.alt_output_dir.as_deref(),
                    rgb,
                )?;
                let file_name = Path::new(&created)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| MicroImgError::Encoder(format!("invalid output name {:?}", created)))?;
                let alt_path = output
                    .alt_output_dir
                    .as_ref()
                    .map(|dir| dir.join(&file_name))
                    .filter(|p| p.exists());
                Ok(ConversionResult {
                    name: base_name(&file_name),
                    full_path: out_dir.join(&file_name),
                    alt_path,
                })
            }
        }
    }
}

fn passthrough(path: &Path, output: &OutputConfig) -> Result<ConversionResult> {
    if !path.exists() {
        return Err(MicroImgError::UnavailableSource(format!(
            "file not found: {}",
            path.display()
        )));
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let alt_path = match &output.alt_output_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let dest = dir.join(&file_name);
            fs::copy(path, &dest)?;
            Some(dest)
        }
        None => None,
    };

    Ok(ConversionResult {
        name: base_name(&file_name),
        full_path: path.to_path_buf(),
        alt_path,
    })
}

/// File stem with a trailing `.ome` removed.
pub fn base_name(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_suffix(".ome") {
        Some(stripped) => stripped.to_string(),
        None => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Dims, DisplayRange, FileType, Strides};
    use crate::progress::NullProgress;
    use tempfile::TempDir;

    struct FakeEncoder;

    impl OmeTiffEncoder for FakeEncoder {
        fn encode(
            &self,
            _source: &Path,
            uuid: &str,
            output_dir: &Path,
            alt_output_dir: Option<&Path>,
            rgb: bool,
        ) -> Result<String> {
            let name = format!("{}{}.ome.tiff", uuid, if rgb { "_rgb" } else { "" });
            fs::write(output_dir.join(&name), b"tiff").unwrap();
            if let Some(alt) = alt_output_dir {
                fs::create_dir_all(alt).unwrap();
                fs::write(alt.join(&name), b"tiff").unwrap();
            }
            Ok(name)
        }
    }

    fn record(path: PathBuf, filetype: FileType, xs: u32) -> MetadataRecord {
        MetadataRecord {
            filetype,
            file_path: path,
            base_position: 62,
            dims: Dims {
                xs,
                ys: 10,
                ..Dims::default()
            },
            isrgb: false,
            channel_bits: vec![8],
            strides: Strides::default(),
            display: DisplayRange::default(),
            lut_names: Vec::new(),
            overlap_is_negative: false,
            name: "img".into(),
            uuid: "abc".into(),
            element: None,
        }
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("image.ome.tiff"), "image");
        assert_eq!(base_name("sample_Series001.lif"), "sample_Series001");
        assert_eq!(base_name("plain"), "plain");
    }

    #[test]
    fn test_passthrough_copies_to_alt() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("cells.lof");
        fs::write(&source, b"payload").unwrap();
        let output = OutputConfig::default().with_alt(dir.path().join("alt"));

        let converter = Converter::new(RouterConfig::default(), WriterConfig::default(), FakeEncoder);
        let result = converter
            .convert(&record(source.clone(), FileType::SingleImage, 100), &output, &NullProgress)
            .unwrap();
        assert_eq!(result.name, "cells");
        assert_eq!(result.full_path, source);
        assert_eq!(fs::read(result.alt_path.unwrap()).unwrap(), b"payload");
    }

    #[test]
    fn test_large_image_goes_to_encoder() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("big.lof");
        fs::write(&source, b"x").unwrap();
        let output = OutputConfig::new(dir.path().join("out")).with_alt(dir.path().join("alt"));

        let converter = Converter::new(RouterConfig::default(), WriterConfig::default(), FakeEncoder);
        let result = converter
            .convert(&record(source, FileType::SingleImage, 9000), &output, &NullProgress)
            .unwrap();
        assert_eq!(result.name, "abc");
        assert_eq!(result.full_path, dir.path().join("out").join("abc.ome.tiff"));
        assert_eq!(result.alt_path, Some(dir.path().join("alt").join("abc.ome.tiff")));
    }

    #[test]
    fn test_unsupported_encoder_fails() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("big.lif");
        fs::write(&source, b"x").unwrap();

        let converter = Converter::new(
            RouterConfig::default(),
            WriterConfig::default(),
            UnsupportedEncoder,
        );
        let err = converter
            .convert(&record(source, FileType::Container, 10), &OutputConfig::default(), &NullProgress)
            .unwrap_err();
        assert!(matches!(err, MicroImgError::Encoder(_)));
    }
}
