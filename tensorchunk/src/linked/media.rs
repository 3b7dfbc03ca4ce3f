//! Media decoding for linked samples

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tensorchunk_core::Dtype;

use crate::array::SampleArray;
use crate::compression::{npy, Compression};
use crate::error::{Error, Result};
use crate::index::{DimIndex, FrameWindow};
use crate::storage::LocalProvider;

/// Decoder for the objects linked samples point at
pub trait MediaDecoder: Send + Sync + std::fmt::Debug {
    /// Fully decode the bytes of the object at `path`
    fn decode(&self, bytes: &[u8], path: &str) -> Result<SampleArray>;

    /// Shape of the media at `url` without decoding it; frames come first
    fn probe_shape(&self, url: &str) -> Result<Vec<usize>>;

    /// Decode only the frames in `window`
    fn decode_window(&self, url: &str, window: FrameWindow) -> Result<SampleArray>;
}

/// Decoder for linked `.npy` arrays, treating the leading axis as frames
///
/// Only local and `file://` URLs can be probed or windowed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NpyDecoder;

impl NpyDecoder {
    fn local_path(url: &str) -> Result<&Path> {
        if url.contains("://") && !url.starts_with("file://") {
            return Err(Error::Media(format!("cannot open {url} locally")));
        }
        Ok(Path::new(url.strip_prefix("file://").unwrap_or(url)))
    }

    fn read_url(url: &str) -> Result<SampleArray> {
        let bytes = LocalProvider::read_path(Self::local_path(url)?)?;
        Compression::Npy.decompress_array(&bytes, &[], Dtype::U8)
    }

    /// Read just the npy header of the file at `url`
    fn read_header(url: &str) -> Result<Vec<u8>> {
        let mut file = File::open(Self::local_path(url)?)?;
        let mut header = vec![0u8; npy::PREAMBLE];
        file.read_exact(&mut header)
            .map_err(|e| Error::Media(format!("{url}: {e}")))?;
        let len = npy::header_len(&header)?;
        header.resize(len, 0);
        file.read_exact(&mut header[npy::PREAMBLE..])
            .map_err(|e| Error::Media(format!("{url}: {e}")))?;
        Ok(header)
    }
}

impl MediaDecoder for NpyDecoder {
    fn decode(&self, bytes: &[u8], path: &str) -> Result<SampleArray> {
        Compression::Npy
            .decompress_array(bytes, &[], Dtype::U8)
            .map_err(|e| Error::Media(format!("{path}: {e}")))
    }

    fn probe_shape(&self, url: &str) -> Result<Vec<usize>> {
        let (_, shape, _) = npy::parse_header(&Self::read_header(url)?)?;
        Ok(shape)
    }

    fn decode_window(&self, url: &str, window: FrameWindow) -> Result<SampleArray> {
        let media = Self::read_url(url)?;
        let frames = DimIndex::Slice {
            start: Some(window.start as i64),
            stop: Some(window.stop as i64),
            step: window.step as i64,
        };
        let selected = media.select(&[frames])?;
        if window.reverse {
            return selected.select(&[DimIndex::Slice {
                start: None,
                stop: None,
                step: -1,
            }]);
        }
        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_window_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.npy");
        let clip = SampleArray::from_slice(&[5, 2], &(0..10).collect::<Vec<u16>>()).unwrap();
        fs::write(&path, Compression::Npy.compress_array(&clip).unwrap()).unwrap();
        let url = format!("file://{}", path.display());

        let decoder = NpyDecoder;
        assert_eq!(decoder.probe_shape(&url).unwrap(), vec![5, 2]);

        let window = FrameWindow {
            start: 1,
            stop: 5,
            step: 2,
            reverse: true,
        };
        let frames = decoder.decode_window(&url, window).unwrap();
        assert_eq!(frames.shape(), &[2, 2]);
        assert_eq!(frames.to_vec::<u16>().unwrap(), vec![6, 7, 2, 3]);

        assert!(matches!(
            decoder.probe_shape("s3://bucket/clip.npy"),
            Err(Error::Media(_))
        ));
    }

    #[test]
    fn test_shape_comes_from_header_alone() {
        let dir = tempfile::tempdir().unwrap();
        let clip = SampleArray::from_slice(&[3, 4], &[0f32; 12]).unwrap();
        let encoded = Compression::Npy.compress_array(&clip).unwrap();
        let header_len = encoded.len() - clip.nbytes();

        // payload cut off; decoding fails but the shape is still known
        let path = dir.path().join("truncated.npy");
        fs::write(&path, &encoded[..header_len]).unwrap();
        let decoder = NpyDecoder;
        assert_eq!(decoder.probe_shape(path.to_str().unwrap()).unwrap(), vec![3, 4]);
        assert!(NpyDecoder::read_url(path.to_str().unwrap()).is_err());

        let short = dir.path().join("short.npy");
        fs::write(&short, &encoded[..header_len - 1]).unwrap();
        assert!(matches!(
            decoder.probe_shape(short.to_str().unwrap()),
            Err(Error::Media(_))
        ));
    }
}
