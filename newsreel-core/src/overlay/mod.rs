use std::path::Path;

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use tracing::{error, info, warn};

use crate::config::FontSection;

/// Fixed vertical canvas (9:16 short-form format).
pub const CANVAS_WIDTH: u32 = 1080;
pub const CANVAS_HEIGHT: u32 = 1920;
/// Top 25% of the canvas is reserved for the title banner.
pub const BANNER_HEIGHT: u32 = CANVAS_HEIGHT / 4;
/// 30px margin on each side of the banner text.
pub const MAX_TEXT_WIDTH: f32 = 1020.0;

const SCENE_IMAGE_SIDE: u32 = 1024;
const FOREGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

/// Renders the title banner onto a black 1080x1920 canvas and pastes
/// the (square) scene image centered below it.
///
/// Failure contract: every image-I/O problem is reported as `false`,
/// never an error, so the orchestrator can skip a single scene instead
/// of aborting the run.
pub struct OverlayCompositor {
    font: Option<FontArc>,
    base_size: f32,
    min_size: f32,
    step: f32,
}

impl OverlayCompositor {
    /// Loads the configured font, then the fallback path. With neither
    /// available the compositor still composites (empty banner); the
    /// degradation is logged once here, not per call.
    pub fn new(section: &FontSection) -> Self {
        let font = load_font(&section.file).or_else(|| load_font(&section.fallback_file));
        if font.is_none() {
            warn!(
                primary = %section.file,
                fallback = %section.fallback_file,
                "no usable banner font, titles will not be rendered"
            );
        }
        Self {
            font,
            base_size: section.base_size,
            min_size: section.min_size,
            step: section.step,
        }
    }

    pub fn overlay(&self, source: &Path, title: &str, dest: &Path) -> bool {
        let source_image = match image::open(source) {
            Ok(img) => img,
            Err(err) => {
                error!(path = %source.display(), error = %err, "failed to open source image");
                return false;
            }
        };

        let mut canvas = RgbImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, BACKGROUND);

        if let Some(font) = &self.font {
            let measure = |text: &str, size: f32| line_width(font, size, text);
            let size = fit_font_size(
                title,
                self.base_size,
                self.min_size,
                self.step,
                MAX_TEXT_WIDTH,
                &measure,
            );
            let lines = wrap_title(title, size, MAX_TEXT_WIDTH, &measure);

            let scaled = font.as_scaled(PxScale::from(size));
            let line_height = scaled.ascent() - scaled.descent() + scaled.line_gap();
            let block_height = line_height * lines.len() as f32;
            let start_y = (BANNER_HEIGHT as f32 - block_height) / 2.0;

            for (index, line) in lines.iter().enumerate() {
                let width = measure(line, size);
                let x = ((CANVAS_WIDTH as f32 - width) / 2.0).round() as i32;
                let y = (start_y + index as f32 * line_height).round() as i32;
                draw_text_mut(&mut canvas, FOREGROUND, x, y, PxScale::from(size), font, line);
            }
        }

        let resized = source_image
            .resize_exact(SCENE_IMAGE_SIDE, SCENE_IMAGE_SIDE, FilterType::Lanczos3)
            .to_rgb8();
        let paste_x = i64::from((CANVAS_WIDTH - SCENE_IMAGE_SIDE) / 2);
        let paste_y = i64::from(BANNER_HEIGHT)
            + i64::from((CANVAS_HEIGHT - BANNER_HEIGHT - SCENE_IMAGE_SIDE) / 2);
        image::imageops::replace(&mut canvas, &resized, paste_x, paste_y);

        match canvas.save(dest) {
            Ok(()) => {
                info!(path = %dest.display(), "overlay composited");
                true
            }
            Err(err) => {
                error!(path = %dest.display(), error = %err, "failed to save overlay");
                false
            }
        }
    }
}

fn load_font(path: &str) -> Option<FontArc> {
    let bytes = std::fs::read(path).ok()?;
    match FontArc::try_from_vec(bytes) {
        Ok(font) => {
            info!(path, "banner font loaded");
            Some(font)
        }
        Err(err) => {
            warn!(path, error = %err, "font file is not parseable");
            None
        }
    }
}

/// Rendered single-line width: advance widths plus kerning.
fn line_width(font: &FontArc, size: f32, text: &str) -> f32 {
    let scaled = font.as_scaled(PxScale::from(size));
    let mut width = 0.0;
    let mut previous = None;
    for ch in text.chars() {
        let glyph = font.glyph_id(ch);
        if let Some(prev) = previous {
            width += scaled.kern(prev, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }
    width
}

/// Shrinks from `base` in fixed `step` decrements until the single-line
/// width fits `max_width` or the `min` floor is reached.
pub fn fit_font_size(
    text: &str,
    base: f32,
    min: f32,
    step: f32,
    max_width: f32,
    measure: &impl Fn(&str, f32) -> f32,
) -> f32 {
    if step <= 0.0 {
        return base.max(min);
    }
    let mut size = base;
    while size > min && measure(text, size) > max_width {
        size = (size - step).max(min);
    }
    size
}

/// Greedy word wrap at the chosen size. A word that alone exceeds the
/// budget still occupies its own line and overflows; titles without
/// whitespace therefore cannot be wrapped at all.
pub fn wrap_title(
    text: &str,
    size: f32,
    max_width: f32,
    measure: &impl Fn(&str, f32) -> f32,
) -> Vec<String> {
    if measure(text, size) <= max_width {
        return vec![text.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if current.is_empty() || measure(&candidate, size) <= max_width {
            current = candidate;
        } else {
            lines.push(current);
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        vec![text.to_string()]
    } else {
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // Synthetic metric: every character is 0.6 * size wide.
    fn measure(text: &str, size: f32) -> f32 {
        text.chars().count() as f32 * size * 0.6
    }

    fn fontless_section(tmp: &TempDir) -> FontSection {
        FontSection {
            file: tmp.path().join("missing.ttf").display().to_string(),
            fallback_file: tmp.path().join("missing2.ttf").display().to_string(),
            base_size: 50.0,
            min_size: 20.0,
            step: 5.0,
        }
    }

    #[test]
    fn fit_shrinks_until_it_fits() {
        // 40 chars: 1200px at size 50, 1080px at 45, 960px at 40.
        let text = "a".repeat(40);
        let size = fit_font_size(&text, 50.0, 20.0, 5.0, 1020.0, &measure);
        assert!((size - 40.0).abs() < f32::EPSILON);
    }

    #[test]
    fn fit_stops_at_floor() {
        let text = "a".repeat(400);
        let size = fit_font_size(&text, 50.0, 20.0, 5.0, 1020.0, &measure);
        assert!((size - 20.0).abs() < f32::EPSILON);
        // Still too wide at the floor; wrapping has to take over.
        assert!(measure(&text, size) > 1020.0);
    }

    #[test]
    fn short_title_keeps_base_size() {
        let size = fit_font_size("News", 50.0, 20.0, 5.0, 1020.0, &measure);
        assert!((size - 50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn over_budget_title_wraps_into_fitting_lines() {
        let words: Vec<String> = (0..20).map(|i| format!("word{i}")).collect();
        let title = words.join(" ");
        let size = 20.0;
        assert!(measure(&title, size) > 1020.0);

        let lines = wrap_title(&title, size, 1020.0, &measure);
        assert!(lines.len() >= 2);
        for line in &lines {
            assert!(
                measure(line, size) <= 1020.0,
                "line exceeds budget: {line:?}"
            );
        }
        assert_eq!(lines.join(" "), title);
    }

    #[test]
    fn unsplittable_word_overflows_its_own_line() {
        let long_word = "b".repeat(120);
        let title = format!("short {long_word} tail");
        let size = 20.0;
        let lines = wrap_title(&title, size, 1020.0, &measure);
        assert!(lines.iter().any(|line| line == &long_word));
        assert!(measure(&long_word, size) > 1020.0);
    }

    #[test]
    fn fitting_title_stays_single_line() {
        let lines = wrap_title("Economy", 50.0, 1020.0, &measure);
        assert_eq!(lines, vec!["Economy".to_string()]);
    }

    #[test]
    fn overlay_produces_fixed_canvas_even_without_font() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("scene.png");
        RgbImage::from_pixel(512, 512, Rgb([200, 30, 30]))
            .save(&source)
            .unwrap();

        let compositor = OverlayCompositor::new(&fontless_section(&tmp));
        let dest = tmp.path().join("overlay.png");
        assert!(compositor.overlay(&source, "Economy grows faster than expected", &dest));

        let composited = image::open(&dest).unwrap().to_rgb8();
        assert_eq!(composited.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        // Banner region stays background-colored.
        assert_eq!(*composited.get_pixel(540, BANNER_HEIGHT / 2), BACKGROUND);
        // Scene image is centered in the region below the banner.
        let center_y = BANNER_HEIGHT + (CANVAS_HEIGHT - BANNER_HEIGHT) / 2;
        assert_eq!(*composited.get_pixel(540, center_y), Rgb([200, 30, 30]));
        // Left margin outside the pasted 1024px square stays black.
        assert_eq!(*composited.get_pixel(10, center_y), BACKGROUND);
    }

    #[test]
    fn overlay_is_dimension_stable_across_title_lengths() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("scene.png");
        RgbImage::from_pixel(64, 64, Rgb([0, 80, 0])).save(&source).unwrap();

        let compositor = OverlayCompositor::new(&fontless_section(&tmp));
        for title in ["N", &"very long title ".repeat(30)] {
            let dest = tmp.path().join("out.png");
            assert!(compositor.overlay(&source, title, &dest));
            let composited = image::open(&dest).unwrap().to_rgb8();
            assert_eq!(composited.dimensions(), (CANVAS_WIDTH, CANVAS_HEIGHT));
        }
    }

    #[test]
    fn missing_source_reports_false() {
        let tmp = TempDir::new().unwrap();
        let compositor = OverlayCompositor::new(&fontless_section(&tmp));
        let dest = tmp.path().join("out.png");
        assert!(!compositor.overlay(&tmp.path().join("absent.png"), "t", &dest));
        assert!(!dest.exists());
    }

    #[test]
    fn renders_banner_text_when_a_system_font_is_available() {
        let dejavu = "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf";
        if !Path::new(dejavu).exists() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("scene.png");
        RgbImage::from_pixel(128, 128, Rgb([10, 10, 120])).save(&source).unwrap();

        let section = FontSection {
            file: dejavu.to_string(),
            fallback_file: dejavu.to_string(),
            base_size: 50.0,
            min_size: 20.0,
            step: 5.0,
        };
        let compositor = OverlayCompositor::new(&section);
        let dest = tmp.path().join("out.png");
        assert!(compositor.overlay(&source, "Breaking news headline", &dest));

        let composited = image::open(&dest).unwrap().to_rgb8();
        let banner_has_ink = composited
            .enumerate_pixels()
            .any(|(_, y, pixel)| y < BANNER_HEIGHT && *pixel != BACKGROUND);
        assert!(banner_has_ink);
    }
}
