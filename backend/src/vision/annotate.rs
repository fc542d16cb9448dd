use std::io::Cursor;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use shared::Detection;

const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const LABEL_COLOR: Rgba<u8> = Rgba([255, 165, 0, 255]);
const BOX_THICKNESS: i32 = 3;
const LABEL_OFFSET_Y: i32 = 10;
const LABEL_FONT_SIZE: f32 = 12.0;

const SYSTEM_FONTS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// Draws detection boxes and labels for human inspection of exported images.
pub struct Annotator {
    font: Option<FontVec>,
    scale: PxScale,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self {
            font,
            scale: PxScale::from(LABEL_FONT_SIZE),
        }
    }

    /// Loads the label font from `font_path`, or from the first readable
    /// system font. Without a font only boxes are drawn.
    pub fn from_font_path(font_path: Option<&Path>) -> Self {
        let candidates: Vec<PathBuf> = match font_path {
            Some(path) => vec![path.to_path_buf()],
            None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
        };

        for candidate in &candidates {
            match load_font(candidate) {
                Ok(font) => {
                    log::info!("Using label font {}", candidate.display());
                    return Self::new(Some(font));
                }
                Err(e) => log::debug!("Font {} unavailable: {}", candidate.display(), e),
            }
        }

        log::warn!("No usable font found; annotated images will carry boxes without labels");
        Self::new(None)
    }

    pub fn annotate(&self, image: &DynamicImage, detections: &[Detection]) -> RgbaImage {
        let mut canvas = image.to_rgba8();
        let (canvas_w, canvas_h) = (canvas.width() as f32, canvas.height() as f32);

        for detection in detections {
            // Edges beyond the canvas are pinned one pixel outside it, which
            // keeps every coordinate small and leaves visible edges in place.
            let x = pin(detection.bbox.x_min, canvas_w);
            let y = pin(detection.bbox.y_min, canvas_h);
            let width = pin(detection.bbox.x_max, canvas_w) - x;
            let height = pin(detection.bbox.y_max, canvas_h) - y;

            for inset in 0..BOX_THICKNESS {
                let w = width - 2 * inset;
                let h = height - 2 * inset;
                if w <= 0 || h <= 0 {
                    break;
                }
                let rect = Rect::at(x + inset, y + inset).of_size(w as u32, h as u32);
                draw_hollow_rect_mut(&mut canvas, rect, BOX_COLOR);
            }

            if let Some(font) = &self.font {
                let label = format!("{} {:.2}", detection.class_name, detection.confidence);
                draw_text_mut(
                    &mut canvas,
                    LABEL_COLOR,
                    x,
                    y - LABEL_OFFSET_Y,
                    self.scale,
                    font,
                    &label,
                );
            }
        }

        canvas
    }
}

fn pin(coord: f32, extent: f32) -> i32 {
    coord.round().clamp(-1.0, extent) as i32
}

fn load_font(path: &Path) -> Result<FontVec, String> {
    let data = std::fs::read(path).map_err(|e| e.to_string())?;
    FontVec::try_from_vec(data).map_err(|e| e.to_string())
}

pub fn encode_png(image: RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image).write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}
