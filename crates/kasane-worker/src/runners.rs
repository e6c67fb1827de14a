//! Built-in runners for the virtual phases: working-size scaling,
//! overlay region extraction and recomposition, and color transfer.
//!
//! These operate purely on the step sequence and configuration; the
//! model-driven core phases live behind [`RestoreBackend`].
//!
//! [`RestoreBackend`]: crate::backend::RestoreBackend

use image::imageops::{self, FilterType};
use image::RgbaImage;
use kasane_pipeline::{Artifact, DispatchError, Phase, PipelineConfig, Region, WORKING_SIZE};

const FILTER: FilterType = FilterType::Triangle;

/// Run one of the scale phases on the latest artifact.
///
/// # Errors
///
/// Returns [`DispatchError`] for a phase name that is not a scale
/// phase.
pub fn scale(phase: &Phase, input: &Artifact, _config: &PipelineConfig) -> Result<Artifact, DispatchError> {
    let image = input.image();
    let scaled = match phase.name() {
        "rescale" => imageops::resize(image, WORKING_SIZE, WORKING_SIZE, FILTER),
        "scale-pad" => fit_and_pad(image),
        "scale-crop" => cover_and_crop(image),
        other => return Err(DispatchError::UnknownPhase(other.to_owned())),
    };
    Ok(Artifact::new(scaled))
}

/// Aspect-preserving fit to the working square, padding the remainder
/// with opaque black, centered.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn fit_and_pad(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let scale = f64::from(WORKING_SIZE) / f64::from(w.max(h).max(1));
    let new_w = ((f64::from(w) * scale).round() as u32).clamp(1, WORKING_SIZE);
    let new_h = ((f64::from(h) * scale).round() as u32).clamp(1, WORKING_SIZE);
    let resized = imageops::resize(image, new_w, new_h, FILTER);

    let mut canvas = RgbaImage::from_pixel(WORKING_SIZE, WORKING_SIZE, image::Rgba([0, 0, 0, 255]));
    let x = i64::from((WORKING_SIZE - new_w) / 2);
    let y = i64::from((WORKING_SIZE - new_h) / 2);
    imageops::replace(&mut canvas, &resized, x, y);
    canvas
}

/// Aspect-preserving cover of the working square, center-cropping the
/// overflow.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn cover_and_crop(image: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let scale = f64::from(WORKING_SIZE) / f64::from(w.min(h).max(1));
    let new_w = ((f64::from(w) * scale).round() as u32).max(WORKING_SIZE);
    let new_h = ((f64::from(h) * scale).round() as u32).max(WORKING_SIZE);
    let resized = imageops::resize(image, new_w, new_h, FILTER);

    let x = (new_w - WORKING_SIZE) / 2;
    let y = (new_h - WORKING_SIZE) / 2;
    imageops::crop_imm(&resized, x, y, WORKING_SIZE, WORKING_SIZE).to_image()
}

/// Extract the configured overlay region from the latest artifact.
///
/// # Errors
///
/// Returns [`DispatchError`] when no overlay region is configured or
/// the region does not fit the artifact.
pub fn crop_region(input: &Artifact, config: &PipelineConfig) -> Result<Artifact, DispatchError> {
    let region = require_region(config)?;
    check_fit(region, input, "crop-region")?;
    let cropped = imageops::crop_imm(
        input.image(),
        region.x0,
        region.y0,
        region.width(),
        region.height(),
    )
    .to_image();
    Ok(Artifact::new(cropped))
}

/// Recompose the latest artifact onto the original input: resize it
/// back to the region's dimensions and paste it at the region's
/// top-left corner.
///
/// # Errors
///
/// Returns [`DispatchError`] when no overlay region is configured, the
/// region does not fit the original, or the step sequence is too short
/// to hold both an original and a processed artifact.
pub fn overlay(steps: &[Artifact], config: &PipelineConfig) -> Result<Artifact, DispatchError> {
    let region = require_region(config)?;
    let (Some(original), Some(processed)) = (steps.first(), steps.last()) else {
        return Err(DispatchError::failed("empty step sequence"));
    };
    check_fit(region, original, "overlay")?;

    let patch = imageops::resize(processed.image(), region.width(), region.height(), FILTER);
    let mut composed = original.image().clone();
    imageops::replace(&mut composed, &patch, i64::from(region.x0), i64::from(region.y0));
    Ok(Artifact::new(composed))
}

/// Transfer the color distribution of the original input onto the
/// latest artifact (per-channel mean/deviation matching).
///
/// # Errors
///
/// Returns [`DispatchError`] when the step sequence is empty.
pub fn color_transfer(steps: &[Artifact]) -> Result<Artifact, DispatchError> {
    let (Some(reference), Some(subject)) = (steps.first(), steps.last()) else {
        return Err(DispatchError::failed("empty step sequence"));
    };

    let ref_stats = channel_stats(reference.image());
    let sub_stats = channel_stats(subject.image());

    let mut out = subject.image().clone();
    for pixel in out.pixels_mut() {
        for c in 0..3 {
            let (ref_mean, ref_dev) = ref_stats[c];
            let (sub_mean, sub_dev) = sub_stats[c];
            let scale = if sub_dev > f64::EPSILON {
                ref_dev / sub_dev
            } else {
                0.0
            };
            let shifted = (f64::from(pixel.0[c]) - sub_mean).mul_add(scale, ref_mean);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                pixel.0[c] = shifted.clamp(0.0, 255.0).round() as u8;
            }
        }
    }
    Ok(Artifact::new(out))
}

/// Per-channel (R, G, B) mean and standard deviation.
#[allow(clippy::cast_precision_loss)]
fn channel_stats(image: &RgbaImage) -> [(f64, f64); 3] {
    let count = (u64::from(image.width()) * u64::from(image.height())).max(1) as f64;
    let mut sums = [0.0f64; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            sums[c] += f64::from(pixel.0[c]);
        }
    }
    let means = sums.map(|s| s / count);

    let mut variances = [0.0f64; 3];
    for pixel in image.pixels() {
        for c in 0..3 {
            let d = f64::from(pixel.0[c]) - means[c];
            variances[c] += d * d;
        }
    }
    [
        (means[0], (variances[0] / count).sqrt()),
        (means[1], (variances[1] / count).sqrt()),
        (means[2], (variances[2] / count).sqrt()),
    ]
}

fn require_region(config: &PipelineConfig) -> Result<Region, DispatchError> {
    config
        .overlay
        .ok_or_else(|| DispatchError::failed("no overlay region configured"))
}

fn check_fit(region: Region, artifact: &Artifact, phase: &str) -> Result<(), DispatchError> {
    let (w, h) = artifact.dimensions();
    if region.width() == 0 || region.height() == 0 || region.x1 > w || region.y1 > h {
        return Err(DispatchError::failed(format!(
            "{phase}: region {}..{}x{}..{} does not fit {w}x{h} artifact",
            region.x0, region.x1, region.y0, region.y1,
        )));
    }
    Ok(())
}
