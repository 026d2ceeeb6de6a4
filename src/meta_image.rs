//! MetaImage header handling.
//!
//! A MetaImage is a text header (`.mhd`) of `Key = Value` lines followed by
//! voxel data, either in a separate raw file named by `ElementDataFile` or,
//! for `ElementDataFile = LOCAL`, directly after the header.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::enums::ElementType;

/// Extension of the header half of a header/raw pair.
pub const HEADER_EXTENSION: &str = "mhd";

/// `ElementDataFile` value for data stored inline after the header.
pub const LOCAL_DATA: &str = "LOCAL";

#[derive(Debug, Error)]
pub enum ImageIoError {
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed header '{path}': {reason}")]
    Header { path: String, reason: String },

    #[error("unsupported image '{path}': {reason}")]
    Unsupported { path: String, reason: String },

    #[error("image '{path}' has {found} dimensions, expected {expected}")]
    DimensionMismatch {
        path: String,
        expected: usize,
        found: usize,
    },

    #[error("'{path}' holds {found} bytes of voxel data, expected {expected}")]
    Truncated {
        path: String,
        expected: usize,
        found: usize,
    },
}

/// Path of the raw data file paired with `header`.
///
/// The last three characters of the header name are replaced by `raw`, so
/// `scan.mhd` pairs with `scan.raw`. Writing and temporary-file cleanup
/// both derive the data file through this function.
pub fn raw_data_path(header: &Path) -> PathBuf {
    match header.to_str() {
        Some(name) if name.len() >= 3 && name.is_char_boundary(name.len() - 3) => {
            PathBuf::from(format!("{}raw", &name[..name.len() - 3]))
        }
        _ => header.with_extension("raw"),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaImageHeader {
    /// Extents in file order (x, y, z)
    pub dim_size: Vec<usize>,
    pub element_type: ElementType,
    pub element_spacing: Vec<f32>,
    pub offset: Vec<f32>,
    pub byte_order_msb: bool,
    pub compressed: bool,
    pub channels: usize,
    /// Bytes to skip in the data file; -1 means the data ends the file
    pub header_size: i64,
    pub data_file: String,
}

impl MetaImageHeader {
    /// Header for uncompressed little-endian data in `data_file`.
    pub fn new(
        dim_size: Vec<usize>,
        element_type: ElementType,
        element_spacing: Vec<f32>,
        offset: Vec<f32>,
        data_file: impl Into<String>,
    ) -> Self {
        Self {
            dim_size,
            element_type,
            element_spacing,
            offset,
            byte_order_msb: false,
            compressed: false,
            channels: 1,
            header_size: 0,
            data_file: data_file.into(),
        }
    }

    pub fn ndims(&self) -> usize {
        self.dim_size.len()
    }

    /// Number of scalar elements, `None` if it does not fit in `usize`.
    pub fn element_count(&self) -> Option<usize> {
        self.dim_size
            .iter()
            .try_fold(self.channels, |count, &extent| count.checked_mul(extent))
    }

    /// Size of the voxel data in bytes.
    ///
    /// `path` names the header in the error returned when `DimSize` is too
    /// large to address.
    pub fn data_len(&self, path: &Path) -> Result<usize, ImageIoError> {
        self.element_count()
            .and_then(|count| count.checked_mul(self.element_type.size()))
            .ok_or_else(|| ImageIoError::Header {
                path: path.display().to_string(),
                reason: "DimSize overflows".into(),
            })
    }

    pub fn is_local(&self) -> bool {
        self.data_file == LOCAL_DATA
    }

    /// Parse header text.
    ///
    /// Returns the header and the byte offset right after the
    /// `ElementDataFile` line, where `LOCAL` data starts.
    pub fn parse(bytes: &[u8], path: &Path) -> Result<(Self, usize), ImageIoError> {
        let malformed = |reason: String| ImageIoError::Header {
            path: path.display().to_string(),
            reason,
        };

        let mut ndims = None;
        let mut dim_size = None;
        let mut element_type = None;
        let mut element_spacing = None;
        let mut offset = None;
        let mut byte_order_msb = false;
        let mut compressed = false;
        let mut channels = 1;
        let mut header_size = 0;
        let mut data_file = None;
        let mut position = 0;

        while position < bytes.len() && data_file.is_none() {
            let line_end = bytes[position..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |i| position + i + 1);
            let line = String::from_utf8_lossy(&bytes[position..line_end]);
            position = line_end;

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(malformed(format!("expected 'Key = Value', found '{line}'")));
            };
            let (key, value) = (key.trim(), value.trim());

            match key {
                "NDims" => ndims = Some(parse_value::<usize>(key, value).map_err(malformed)?),
                "DimSize" => dim_size = Some(parse_list::<usize>(key, value).map_err(malformed)?),
                "ElementType" => {
                    element_type = Some(
                        ElementType::from_tag(value)
                            .ok_or_else(|| malformed(format!("unknown element type '{value}'")))?,
                    )
                }
                "ElementSpacing" | "ElementSize" => {
                    if element_spacing.is_none() || key == "ElementSpacing" {
                        element_spacing = Some(parse_list::<f32>(key, value).map_err(malformed)?);
                    }
                }
                "Offset" | "Origin" | "Position" => {
                    offset = Some(parse_list::<f32>(key, value).map_err(malformed)?)
                }
                "BinaryDataByteOrderMSB" | "ElementByteOrderMSB" => {
                    byte_order_msb = parse_bool(key, value).map_err(malformed)?
                }
                "CompressedData" => compressed = parse_bool(key, value).map_err(malformed)?,
                "ElementNumberOfChannels" => {
                    channels = parse_value::<usize>(key, value).map_err(malformed)?
                }
                "HeaderSize" => header_size = parse_value::<i64>(key, value).map_err(malformed)?,
                "ElementDataFile" => data_file = Some(value.to_string()),
                _ => {}
            }
        }

        let dim_size = dim_size.ok_or_else(|| malformed("missing DimSize".into()))?;
        let ndims = ndims.unwrap_or(dim_size.len());
        if dim_size.len() != ndims {
            return Err(malformed(format!(
                "NDims is {ndims} but DimSize lists {} extents",
                dim_size.len()
            )));
        }

        let header = Self {
            element_type: element_type.ok_or_else(|| malformed("missing ElementType".into()))?,
            element_spacing: element_spacing.unwrap_or_else(|| vec![1.0; ndims]),
            offset: offset.unwrap_or_else(|| vec![0.0; ndims]),
            byte_order_msb,
            compressed,
            channels,
            header_size,
            data_file: data_file.ok_or_else(|| malformed("missing ElementDataFile".into()))?,
            dim_size,
        };
        Ok((header, position))
    }

    /// Render the header the way ITK writes it. `ElementDataFile` is last.
    pub fn to_text(&self) -> String {
        let ndims = self.ndims();
        let identity: Vec<&str> = (0..ndims * ndims)
            .map(|i| if i % (ndims + 1) == 0 { "1" } else { "0" })
            .collect();
        let anatomical = &"RAI"[..ndims.min(3)];

        let mut text = String::new();
        let _ = writeln!(text, "ObjectType = Image");
        let _ = writeln!(text, "NDims = {ndims}");
        let _ = writeln!(text, "BinaryData = True");
        let _ = writeln!(text, "BinaryDataByteOrderMSB = {}", format_bool(self.byte_order_msb));
        let _ = writeln!(text, "CompressedData = {}", format_bool(self.compressed));
        let _ = writeln!(text, "TransformMatrix = {}", identity.join(" "));
        let _ = writeln!(text, "Offset = {}", join(&self.offset));
        let _ = writeln!(text, "CenterOfRotation = {}", join(&vec![0; ndims]));
        let _ = writeln!(text, "AnatomicalOrientation = {anatomical}");
        let _ = writeln!(text, "ElementSpacing = {}", join(&self.element_spacing));
        let _ = writeln!(text, "DimSize = {}", join(&self.dim_size));
        if self.channels != 1 {
            let _ = writeln!(text, "ElementNumberOfChannels = {}", self.channels);
        }
        let _ = writeln!(text, "ElementType = {}", self.element_type);
        let _ = writeln!(text, "ElementDataFile = {}", self.data_file);
        text
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("invalid {key} value '{value}'"))
}

fn parse_list<T: std::str::FromStr>(key: &str, value: &str) -> Result<Vec<T>, String> {
    value
        .split_whitespace()
        .map(|word| parse_value(key, word))
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(format!("invalid {key} value '{value}'")),
    }
}

fn format_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CT_HEAD: &str = "ObjectType = Image\n\
        NDims = 3\n\
        BinaryData = True\n\
        BinaryDataByteOrderMSB = False\n\
        CompressedData = False\n\
        Offset = 0 0 -12.5\n\
        ElementSpacing = 1 1 2\n\
        DimSize = 256 256 113\n\
        ElementType = MET_SHORT\n\
        ElementDataFile = CThead_l3.raw\n";

    #[test]
    fn test_raw_data_path() {
        assert_eq!(
            raw_data_path(Path::new("/tmp/grey___k2j3.mhd")),
            PathBuf::from("/tmp/grey___k2j3.raw")
        );
        // only the last three characters are replaced
        assert_eq!(raw_data_path(Path::new("scan.MHD")), PathBuf::from("scan.raw"));
        assert_eq!(raw_data_path(Path::new("a.xmhd")), PathBuf::from("a.xraw"));
    }

    #[test]
    fn test_parse_header() {
        let (header, data_start) =
            MetaImageHeader::parse(CT_HEAD.as_bytes(), Path::new("CThead_l3.mhd")).unwrap();

        assert_eq!(header.ndims(), 3);
        assert_eq!(header.dim_size, vec![256, 256, 113]);
        assert_eq!(header.element_type, ElementType::Short);
        assert_eq!(header.element_spacing, vec![1.0, 1.0, 2.0]);
        assert_eq!(header.offset, vec![0.0, 0.0, -12.5]);
        assert!(!header.byte_order_msb);
        assert_eq!(header.data_file, "CThead_l3.raw");
        assert_eq!(header.element_count(), Some(256 * 256 * 113));
        assert_eq!(header.data_len(Path::new("CThead_l3.mhd")).unwrap(), 256 * 256 * 113 * 2);
        assert_eq!(data_start, CT_HEAD.len());
    }

    #[test]
    fn test_local_data_offset() {
        let mut bytes = b"NDims = 1\nDimSize = 2\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n".to_vec();
        let header_len = bytes.len();
        bytes.extend_from_slice(&[7, 9]);

        let (header, data_start) = MetaImageHeader::parse(&bytes, Path::new("inline.mhd")).unwrap();
        assert!(header.is_local());
        assert_eq!(data_start, header_len);
        assert_eq!(&bytes[data_start..], &[7, 9]);
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = MetaImageHeader::parse(b"NDims = 3\nDimSize = 1 1 1\n", Path::new("x.mhd"));
        assert!(matches!(err, Err(ImageIoError::Header { .. })));

        let err = MetaImageHeader::parse(
            b"NDims = 2\nDimSize = 1 1 1\nElementType = MET_FLOAT\nElementDataFile = x.raw\n",
            Path::new("x.mhd"),
        );
        assert!(matches!(err, Err(ImageIoError::Header { .. })));
    }

    #[test]
    fn test_unknown_element_type_rejected() {
        let err = MetaImageHeader::parse(
            b"DimSize = 1\nElementType = MET_FANCY\nElementDataFile = x.raw\n",
            Path::new("x.mhd"),
        )
        .unwrap_err();
        assert!(err.to_string().contains("MET_FANCY"));
    }

    #[test]
    fn test_written_header_parses_back() {
        let header = MetaImageHeader::new(
            vec![4, 3, 2],
            ElementType::Float,
            vec![0.5, 0.5, 1.25],
            vec![1.0, 2.0, 3.0],
            "vol.raw",
        );
        let text = header.to_text();

        assert!(text.starts_with("ObjectType = Image\nNDims = 3\n"));
        assert!(text.contains("TransformMatrix = 1 0 0 0 1 0 0 0 1\n"));
        assert!(text.ends_with("ElementType = MET_FLOAT\nElementDataFile = vol.raw\n"));

        let (parsed, _) = MetaImageHeader::parse(text.as_bytes(), Path::new("vol.mhd")).unwrap();
        assert_eq!(parsed, header);
    }
}
