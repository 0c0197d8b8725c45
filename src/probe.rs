//! Header-only inspection of staged images and encoded output

use std::io::Cursor;
use std::time::Duration;

use image::{ImageFormat, ImageReader};
use mp4::TrackType;

use crate::{Error, Result};

/// Format and size of an image, read from its header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// Sniff the format and read the dimensions without decoding pixels
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;

        let format = reader
            .format()
            .ok_or_else(|| Error::StagingFailed("Unrecognized image format".to_string()))?;

        let (width, height) = reader.into_dimensions()?;

        Ok(Self {
            format,
            width,
            height,
        })
    }

    /// Scaled height for a target width, keeping the aspect ratio
    pub fn height_for_width(&self, target_width: u32) -> u32 {
        if self.width == 0 {
            return 0;
        }
        let scale = target_width as f64 / self.width as f64;
        (self.height as f64 * scale).round() as u32
    }
}

/// Stream summary of an encoded MP4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub width: u16,
    pub height: u16,
    pub duration: Duration,
    pub video_tracks: usize,
    pub has_audio: bool,
}

/// Parse the MP4 header of an encoded video
pub fn inspect_mp4(bytes: &[u8]) -> Result<ContainerInfo> {
    let size = bytes.len() as u64;
    let reader = mp4::Mp4Reader::read_header(Cursor::new(bytes), size)
        .map_err(|e| Error::EncodeFailed(format!("Unreadable MP4 output: {}", e)))?;

    let mut info = ContainerInfo {
        width: 0,
        height: 0,
        duration: reader.duration(),
        video_tracks: 0,
        has_audio: false,
    };

    for track in reader.tracks().values() {
        match track.track_type() {
            Ok(TrackType::Video) => {
                info.video_tracks += 1;
                info.width = track.width();
                info.height = track.height();
            }
            Ok(TrackType::Audio) => info.has_audio = true,
            _ => {}
        }
    }

    if info.video_tracks == 0 {
        return Err(Error::EncodeFailed(
            "Encoded output has no video track".to_string(),
        ));
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn encode(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_probe_jpeg_and_png() {
        let jpeg = ImageInfo::from_bytes(&encode(ImageFormat::Jpeg, 64, 32)).unwrap();
        assert_eq!(jpeg.format, ImageFormat::Jpeg);
        assert_eq!((jpeg.width, jpeg.height), (64, 32));

        let png = ImageInfo::from_bytes(&encode(ImageFormat::Png, 10, 20)).unwrap();
        assert_eq!(png.format, ImageFormat::Png);
        assert_eq!(png.height_for_width(5), 10);
    }

    #[test]
    fn test_probe_rejects_non_images() {
        assert!(ImageInfo::from_bytes(b"<html>not found</html>").is_err());
    }

    #[test]
    fn test_inspect_rejects_garbage() {
        assert!(inspect_mp4(b"definitely not an mp4").is_err());
    }
}
