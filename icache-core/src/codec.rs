// Copyright (c) 2023 Yan Ka, Chiu.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions
// are met:
// 1. Redistributions of source code must retain the above copyright
//    notice, this list of conditions, and the following disclaimer,
//    without modification, immediately at the beginning of the file.
// 2. The name of the author may not be used to endorse or promote products
//    derived from this software without specific prior written permission.
//
// THIS SOFTWARE IS PROVIDED BY THE AUTHOR AND CONTRIBUTORS ``AS IS'' AND
// ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO, THE
// IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE
// ARE DISCLAIMED. IN NO EVENT SHALL THE AUTHOR OR CONTRIBUTORS BE LIABLE FOR
// ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL, EXEMPLARY, OR CONSEQUENTIAL
// DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS
// OR SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION)
// HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT
// LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY
// OUT OF THE USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF
// SUCH DAMAGE.

use image::GenericImageView;
use std::path::Path;

/// Everything the coordinator needs to know about a decoded source image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
}

/// External collaborator: decode, verify, resize (fit+crop), encode. The
/// core never depends on a concrete decoding library's error type; it only
/// sees `Result<_, image::ImageError>` translated at the coordinator
/// boundary into `CacheError`.
///
/// Implemented by `RealCodec`, which wraps the `image` crate -- the
/// ecosystem's canonical choice for this role, used the same way by the
/// pack's `trovato::image_style` and `leptos-image::optimizer` modules.
pub trait ImageCodec: Send + Sync {
    /// Decode `path` and verify it is a well-formed image, returning its
    /// dimensions and canonical (upper-cased) format name. Corresponds to
    /// `Image.open(file); img.verify()` in the system this was derived from.
    fn decode_and_verify(&self, path: &Path) -> Result<(ImageInfo, String), image::ImageError>;

    /// Same as `decode_and_verify`, but for an in-memory byte-stream source
    /// (the specification's "filename or byte stream" ingest input).
    fn decode_and_verify_bytes(
        &self,
        bytes: &[u8],
    ) -> Result<(ImageInfo, String), image::ImageError>;

    /// Fit-and-crop: resize to fully cover `(width, height)` preserving
    /// aspect ratio, then centre-crop to the exact target dimensions, and
    /// encode the result to `format` at `dest`.
    fn resize_fit(
        &self,
        source: &Path,
        dest: &Path,
        width: u32,
        height: u32,
        format: &str,
    ) -> Result<(), image::ImageError>;
}

/// Production `ImageCodec` backed by the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealCodec;

impl RealCodec {
    pub fn new() -> RealCodec {
        RealCodec
    }

    fn image_format(format: &str) -> Option<image::ImageFormat> {
        image::ImageFormat::from_extension(format.to_lowercase())
    }
}

fn format_unknown_error() -> image::ImageError {
    image::ImageError::Unsupported(image::error::UnsupportedError::from_format_and_kind(
        image::error::ImageFormatHint::Unknown,
        image::error::UnsupportedErrorKind::Format(image::error::ImageFormatHint::Unknown),
    ))
}

/// Canonical upper-cased format name for a decoded `ImageFormat`, per the
/// specification's "upper-cased canonical name, e.g. `JPEG`, `PNG`". Not the
/// same as `extensions_str()[0]`: for JPEG that is `"jpg"`, not `"jpeg"`, and
/// a stored `"JPG"` would desync from a caller-requested `"JPEG"` in the
/// identity-transform comparison in `coordinator.rs`.
fn canonical_format_name(format: image::ImageFormat) -> String {
    match format {
        image::ImageFormat::Jpeg => "JPEG".to_string(),
        other => other.extensions_str()[0].to_uppercase(),
    }
}

fn decode_reader<R: std::io::BufRead + std::io::Seek>(
    reader: image::io::Reader<R>,
) -> Result<(ImageInfo, String), image::ImageError> {
    let reader = reader.with_guessed_format()?;
    let format = canonical_format_name(reader.format().ok_or_else(format_unknown_error)?);
    let decoded = reader.decode()?;
    Ok((
        ImageInfo {
            width: decoded.width(),
            height: decoded.height(),
        },
        format,
    ))
}

impl ImageCodec for RealCodec {
    fn decode_and_verify(&self, path: &Path) -> Result<(ImageInfo, String), image::ImageError> {
        decode_reader(image::io::Reader::open(path)?)
    }

    fn decode_and_verify_bytes(
        &self,
        bytes: &[u8],
    ) -> Result<(ImageInfo, String), image::ImageError> {
        let cursor = std::io::Cursor::new(bytes);
        decode_reader(image::io::Reader::new(cursor))
    }

    fn resize_fit(
        &self,
        source: &Path,
        dest: &Path,
        width: u32,
        height: u32,
        format: &str,
    ) -> Result<(), image::ImageError> {
        let img = image::io::Reader::open(source)?
            .with_guessed_format()?
            .decode()?;
        // `resize_to_fill` scales to fully cover the target box and
        // centre-crops to it -- the `image` crate's own fit-and-crop, the
        // equivalent of `ImageOps.fit(centering=(0.5, 0.5))`.
        let fitted = img.resize_to_fill(width, height, image::imageops::FilterType::Lanczos3);
        let out_format = Self::image_format(format).ok_or_else(format_unknown_error)?;
        fitted.save_with_format(dest, out_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn write_test_jpeg(path: &Path, width: u32, height: u32) {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
            ImageBuffer::from_fn(width, height, |_, _| Rgb([255, 0, 0]));
        img.save(path).unwrap();
    }

    #[test]
    fn decode_and_verify_reports_dimensions_and_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.jpg");
        write_test_jpeg(&path, 64, 48);

        let codec = RealCodec::new();
        let (info, format) = codec.decode_and_verify(&path).unwrap();
        assert_eq!(info.width, 64);
        assert_eq!(info.height, 48);
        assert_eq!(format, "JPEG");
    }

    #[test]
    fn decode_and_verify_bytes_matches_path_decode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.png");
        write_test_jpeg(&path, 32, 16);
        let bytes = std::fs::read(&path).unwrap();

        let codec = RealCodec::new();
        let (info, format) = codec.decode_and_verify_bytes(&bytes).unwrap();
        assert_eq!((info.width, info.height), (32, 16));
        assert_eq!(format, "PNG");
    }

    #[test]
    fn resize_fit_produces_exact_target_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        let dest = dir.path().join("dest.png");
        write_test_jpeg(&source, 200, 100);

        let codec = RealCodec::new();
        codec.resize_fit(&source, &dest, 50, 50, "PNG").unwrap();

        let (info, _) = codec.decode_and_verify(&dest).unwrap();
        assert_eq!((info.width, info.height), (50, 50));
    }

    #[test]
    fn resize_fit_rejects_unrecognized_format_instead_of_silently_using_png() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.png");
        let dest = dir.path().join("dest.heic");
        write_test_jpeg(&source, 64, 64);

        let codec = RealCodec::new();
        let err = codec
            .resize_fit(&source, &dest, 32, 32, "HEIC")
            .unwrap_err();
        assert!(matches!(err, image::ImageError::Unsupported(_)));
        assert!(!dest.exists());
    }
}
