//! Background-removal client: uploads an image to the remove.bg endpoint and
//! returns the cut-out with a transparent background.

use super::{REQUEST_TIMEOUT, RemoteServiceError, error_for_status};
use crate::raster;
use image::RgbaImage;
use reqwest::blocking::multipart;

const ENDPOINT: &str = "https://api.remove.bg/v1.0/removebg";

/// Upload `image` and return the background-removed raster.
///
/// Blocking — run on a worker thread, never on the UI thread. The contract:
/// multipart body with the image under `image_file` plus `size=auto`, the
/// key in the `X-Api-Key` header; 403 → invalid key, 402 → out of credits,
/// other non-2xx → generic API error with the status text.
pub fn remove_background(
    image: &RgbaImage,
    api_key: &str,
) -> Result<RgbaImage, RemoteServiceError> {
    if api_key.trim().is_empty() {
        return Err(RemoteServiceError::MissingApiKey);
    }

    let png = raster::encode_png(image)
        .map_err(|e| RemoteServiceError::BadResponse(format!("encode failed: {}", e)))?;

    let part = multipart::Part::bytes(png)
        .file_name("image.png")
        .mime_str("image/png")
        .map_err(|e| RemoteServiceError::Network(e.to_string()))?;
    let form = multipart::Form::new()
        .part("image_file", part)
        .text("size", "auto");

    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let response = client
        .post(ENDPOINT)
        .header("X-Api-Key", api_key)
        .multipart(form)
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(error_for_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown status"),
        ));
    }

    let bytes = response.bytes()?;
    raster::load_bytes(&bytes)
        .map_err(|e| RemoteServiceError::BadResponse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_fails_before_any_upload() {
        let img = RgbaImage::new(4, 4);
        assert!(matches!(
            remove_background(&img, "   "),
            Err(RemoteServiceError::MissingApiKey)
        ));
    }
}
