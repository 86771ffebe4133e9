use eframe::egui::ColorImage;
use tracing::warn;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Downloads and decodes a video thumbnail for the preview pane.
/// Blocking; run it off the UI thread. Failures are logged and yield `None`.
pub fn fetch_thumbnail(url: &str) -> Option<ColorImage> {
    match try_fetch(url) {
        Ok(image) => Some(image),
        Err(err) => {
            warn!(%url, %err, "failed to load thumbnail");
            None
        }
    }
}

fn try_fetch(url: &str) -> Result<ColorImage, BoxError> {
    let bytes = reqwest::blocking::get(url)?.error_for_status()?.bytes()?;
    decode(&bytes)
}

/// Decodes image bytes into egui's RGBA layout
fn decode(bytes: &[u8]) -> Result<ColorImage, BoxError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    let size = [img.width() as usize, img.height() as usize];
    Ok(ColorImage::from_rgba_unmultiplied(size, &img))
}
