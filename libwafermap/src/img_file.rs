use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use ndarray::Array2;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use super::error::ImageError;

const IMAGE_EXTENSION: &str = ".img";

/// Header and pixels of a 2D detector frame
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorImage {
    pub header: BTreeMap<String, String>,
    pub pixels: Array2<u32>,
}

/// Anything which can turn a detector file into a [`DetectorImage`]
pub trait ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DetectorImage, ImageError>;
}

/// Decoder for SMV (ADSC style) frames: a `{ KEY=VALUE; }` text header padded to
/// HEADER_BYTES, followed by a row-major block of unsigned integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmvDecoder;

impl SmvDecoder {
    fn parse_header(path: &Path, bytes: &[u8]) -> Result<BTreeMap<String, String>, ImageError> {
        if bytes.first() != Some(&b'{') {
            return Err(ImageError::MissingHeader(path.to_path_buf()));
        }
        let end = bytes
            .iter()
            .position(|&b| b == b'}')
            .ok_or_else(|| ImageError::MissingHeader(path.to_path_buf()))?;
        let text: String = bytes[1..end].iter().map(|&b| b as char).collect();

        let mut header = BTreeMap::new();
        for entry in text.split(';') {
            if let Some((key, value)) = entry.split_once('=') {
                header.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Ok(header)
    }

    fn require(
        path: &Path,
        header: &BTreeMap<String, String>,
        key: &str,
    ) -> Result<usize, ImageError> {
        let value = header
            .get(key)
            .ok_or_else(|| ImageError::MissingKey(path.to_path_buf(), key.to_string()))?;
        value.parse::<usize>().map_err(|e| {
            ImageError::BadValue(path.to_path_buf(), key.to_string(), e.to_string())
        })
    }
}

impl ImageDecoder for SmvDecoder {
    fn decode(&self, path: &Path) -> Result<DetectorImage, ImageError> {
        let bytes = std::fs::read(path)?;
        let header = Self::parse_header(path, &bytes)?;

        let header_bytes = Self::require(path, &header, "HEADER_BYTES")?;
        let columns = Self::require(path, &header, "SIZE1")?;
        let rows = Self::require(path, &header, "SIZE2")?;
        let big_endian = match header.get("BYTE_ORDER").map(|s| s.as_str()) {
            Some("big_endian") => true,
            Some("little_endian") | None => false,
            Some(other) => {
                return Err(ImageError::BadValue(
                    path.to_path_buf(),
                    String::from("BYTE_ORDER"),
                    other.to_string(),
                ))
            }
        };

        let pixel_bytes = match header.get("TYPE").map(|s| s.as_str()) {
            Some("unsigned_short") | None => 2,
            Some("unsigned_int") | Some("unsigned_long") => 4,
            Some(other) => {
                return Err(ImageError::BadValue(
                    path.to_path_buf(),
                    String::from("TYPE"),
                    other.to_string(),
                ))
            }
        };

        // The pixel block has to fit in what follows the header
        let available = bytes.len().saturating_sub(header_bytes);
        let n_pixels = rows
            .checked_mul(columns)
            .filter(|n| n.checked_mul(pixel_bytes).is_some_and(|size| size <= available))
            .ok_or_else(|| {
                ImageError::BadValue(
                    path.to_path_buf(),
                    String::from("SIZE1"),
                    format!("{columns} x {rows} pixels do not fit in {available} data bytes"),
                )
            })?;

        let mut cursor = Cursor::new(bytes.get(header_bytes..).unwrap_or_default());
        let pixels: Vec<u32> = match pixel_bytes {
            2 => {
                let mut buffer = vec![0u16; n_pixels];
                if big_endian {
                    cursor.read_u16_into::<BigEndian>(&mut buffer)?;
                } else {
                    cursor.read_u16_into::<LittleEndian>(&mut buffer)?;
                }
                buffer.into_iter().map(u32::from).collect()
            }
            _ => {
                let mut buffer = vec![0u32; n_pixels];
                if big_endian {
                    cursor.read_u32_into::<BigEndian>(&mut buffer)?;
                } else {
                    cursor.read_u32_into::<LittleEndian>(&mut buffer)?;
                }
                buffer
            }
        };

        let pixels = Array2::from_shape_vec((rows, columns), pixels).map_err(|e| {
            ImageError::BadValue(path.to_path_buf(), String::from("SIZE1"), e.to_string())
        })?;
        Ok(DetectorImage { header, pixels })
    }
}

/// Find the detector frame recorded with a `.ras` scan: the first file in the same
/// directory (by name) that contains the scan's stem and ends in `.img`
pub fn find_image(ras_path: &Path) -> Result<Option<PathBuf>, std::io::Error> {
    let prefix = match ras_path.file_stem() {
        Some(stem) => stem.to_string_lossy().to_string(),
        None => return Ok(None),
    };
    let parent = match ras_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut file_list: Vec<PathBuf> = Vec::new();
    for item in parent.read_dir()? {
        let item_path = item?.path();
        let name = match item_path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        if name.contains(&prefix) && name.ends_with(IMAGE_EXTENSION) {
            file_list.push(item_path);
        }
    }
    file_list.sort();
    Ok(file_list.into_iter().next())
}
