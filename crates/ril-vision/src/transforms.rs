// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! CPU frame transforms over `(H, W, C)` arrays.
//!
//! Random operations draw from the RNG handed to [`TransformPipeline::apply`].
//! [`TransformPipeline::apply_clip`] draws a single clip seed so every frame of
//! a clip sees the same crop offsets and flip decision.

use ndarray::{s, Array3, ArrayView3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use ril_config::determinism;
use ril_core::error::{geometry, shape_mismatch};
use ril_core::{FrameSequence, RilError, RilResult};

/// Per-channel RGB means subtracted by [`Normalize::default`].
pub const RGB_MEANS: [f32; 3] = [123.68, 116.78, 103.94];

/// Flip probability used by [`TransformPipeline::train`].
pub const DEFAULT_FLIP_PROBABILITY: f64 = 0.5;

fn ensure_extent(height: usize, width: usize) -> RilResult<()> {
    if height == 0 || width == 0 {
        return Err(geometry(format!(
            "spatial dimensions must be positive, got {height}x{width}"
        )));
    }
    Ok(())
}

fn ensure_fits(frame: &ArrayView3<'_, f32>, height: usize, width: usize) -> RilResult<()> {
    ensure_extent(height, width)?;
    let (src_h, src_w, _) = frame.dim();
    if height > src_h || width > src_w {
        return Err(geometry(format!(
            "crop {height}x{width} must fit inside {src_h}x{src_w}"
        )));
    }
    Ok(())
}

/// Bilinear resize with half-pixel centres.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resize {
    pub height: usize,
    pub width: usize,
}

impl Resize {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn apply(&self, frame: ArrayView3<'_, f32>) -> RilResult<Array3<f32>> {
        let (src_h, src_w, channels) = frame.dim();
        ensure_extent(src_h, src_w)?;
        ensure_extent(self.height, self.width)?;
        if (src_h, src_w) == (self.height, self.width) {
            return Ok(frame.to_owned());
        }

        let scale_y = src_h as f32 / self.height as f32;
        let scale_x = src_w as f32 / self.width as f32;
        let mut output = Array3::<f32>::zeros((self.height, self.width, channels));
        for y in 0..self.height {
            let src_y = (y as f32 + 0.5) * scale_y - 0.5;
            let y0 = src_y.floor().clamp(0.0, (src_h - 1) as f32) as usize;
            let y1 = (y0 + 1).min(src_h - 1);
            let ly = (src_y - y0 as f32).clamp(0.0, 1.0);
            for x in 0..self.width {
                let src_x = (x as f32 + 0.5) * scale_x - 0.5;
                let x0 = src_x.floor().clamp(0.0, (src_w - 1) as f32) as usize;
                let x1 = (x0 + 1).min(src_w - 1);
                let lx = (src_x - x0 as f32).clamp(0.0, 1.0);
                for c in 0..channels {
                    let top = frame[[y0, x0, c]] * (1.0 - lx) + frame[[y0, x1, c]] * lx;
                    let bottom = frame[[y1, x0, c]] * (1.0 - lx) + frame[[y1, x1, c]] * lx;
                    output[[y, x, c]] = top * (1.0 - ly) + bottom * ly;
                }
            }
        }
        Ok(output)
    }
}

/// Resize keeping the aspect ratio so the shorter side lands on `smallest_side`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AspectResize {
    pub smallest_side: usize,
}

impl AspectResize {
    pub fn new(smallest_side: usize) -> Self {
        Self { smallest_side }
    }

    /// Target `(height, width)`. The shorter side is exactly `smallest_side`; the
    /// longer one is scaled in integer arithmetic and truncated.
    pub fn target_size(&self, height: usize, width: usize) -> (usize, usize) {
        let side = self.smallest_side;
        if height > width {
            (height.saturating_mul(side) / width.max(1), side)
        } else {
            (side, width.saturating_mul(side) / height.max(1))
        }
    }

    pub fn apply(&self, frame: ArrayView3<'_, f32>) -> RilResult<Array3<f32>> {
        let (height, width, _) = frame.dim();
        ensure_extent(height, width)?;
        let (dst_h, dst_w) = self.target_size(height, width);
        Resize::new(dst_h, dst_w).apply(frame)
    }
}

/// Crop centred on the frame; odd margins leave the extra row/column at the end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CenterCrop {
    pub height: usize,
    pub width: usize,
}

impl CenterCrop {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn apply(&self, frame: ArrayView3<'_, f32>) -> RilResult<Array3<f32>> {
        ensure_fits(&frame, self.height, self.width)?;
        let (src_h, src_w, _) = frame.dim();
        let top = (src_h - self.height) / 2;
        let left = (src_w - self.width) / 2;
        Ok(crop(frame, top, left, self.height, self.width))
    }
}

/// Crop at a uniformly drawn offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomCrop {
    pub height: usize,
    pub width: usize,
}

impl RandomCrop {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        frame: ArrayView3<'_, f32>,
        rng: &mut R,
    ) -> RilResult<Array3<f32>> {
        ensure_fits(&frame, self.height, self.width)?;
        let (src_h, src_w, _) = frame.dim();
        let top = rng.gen_range(0..=src_h - self.height);
        let left = rng.gen_range(0..=src_w - self.width);
        Ok(crop(frame, top, left, self.height, self.width))
    }
}

fn crop(
    frame: ArrayView3<'_, f32>,
    top: usize,
    left: usize,
    height: usize,
    width: usize,
) -> Array3<f32> {
    frame
        .slice(s![top..top + height, left..left + width, ..])
        .to_owned()
}

/// Per-channel mean subtraction.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalize {
    pub means: Vec<f32>,
}

impl Default for Normalize {
    fn default() -> Self {
        Self {
            means: RGB_MEANS.to_vec(),
        }
    }
}

impl Normalize {
    pub fn new(means: Vec<f32>) -> Self {
        Self { means }
    }

    pub fn apply(&self, frame: ArrayView3<'_, f32>) -> RilResult<Array3<f32>> {
        let (height, width, channels) = frame.dim();
        if channels != self.means.len() {
            return Err(shape_mismatch(
                &[height, width, self.means.len()],
                &[height, width, channels],
            ));
        }
        let mut output = frame.to_owned();
        for (mut plane, &mean) in output.axis_iter_mut(Axis(2)).zip(&self.means) {
            plane -= mean;
        }
        Ok(output)
    }
}

/// Mirrors the frame left-right with the given probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RandomHorizontalFlip {
    pub probability: f64,
}

impl Default for RandomHorizontalFlip {
    fn default() -> Self {
        Self {
            probability: DEFAULT_FLIP_PROBABILITY,
        }
    }
}

impl RandomHorizontalFlip {
    pub fn new(probability: f64) -> RilResult<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(RilError::InvalidValue {
                label: "flip_probability",
            });
        }
        Ok(Self { probability })
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        frame: ArrayView3<'_, f32>,
        rng: &mut R,
    ) -> RilResult<Array3<f32>> {
        if !(0.0..=1.0).contains(&self.probability) {
            return Err(RilError::InvalidValue {
                label: "flip_probability",
            });
        }
        if rng.gen_bool(self.probability) {
            Ok(frame.slice(s![.., ..;-1, ..]).to_owned())
        } else {
            Ok(frame.to_owned())
        }
    }
}

/// A single step of a [`TransformPipeline`].
#[derive(Clone, Debug, PartialEq)]
pub enum TransformOperation {
    Resize(Resize),
    AspectResize(AspectResize),
    CenterCrop(CenterCrop),
    RandomCrop(RandomCrop),
    Normalize(Normalize),
    RandomHorizontalFlip(RandomHorizontalFlip),
}

impl TransformOperation {
    pub fn name(&self) -> &'static str {
        match self {
            TransformOperation::Resize(_) => "resize",
            TransformOperation::AspectResize(_) => "aspect_resize",
            TransformOperation::CenterCrop(_) => "center_crop",
            TransformOperation::RandomCrop(_) => "random_crop",
            TransformOperation::Normalize(_) => "normalize",
            TransformOperation::RandomHorizontalFlip(_) => "random_horizontal_flip",
        }
    }

    pub fn is_random(&self) -> bool {
        matches!(
            self,
            TransformOperation::RandomCrop(_) | TransformOperation::RandomHorizontalFlip(_)
        )
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        frame: ArrayView3<'_, f32>,
        rng: &mut R,
    ) -> RilResult<Array3<f32>> {
        match self {
            TransformOperation::Resize(op) => op.apply(frame),
            TransformOperation::AspectResize(op) => op.apply(frame),
            TransformOperation::CenterCrop(op) => op.apply(frame),
            TransformOperation::RandomCrop(op) => op.apply(frame, rng),
            TransformOperation::Normalize(op) => op.apply(frame),
            TransformOperation::RandomHorizontalFlip(op) => op.apply(frame, rng),
        }
    }
}

/// Ordered list of frame transforms.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransformPipeline {
    operations: Vec<TransformOperation>,
}

impl TransformPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluation preprocessing: aspect resize, centre crop, mean subtraction.
    pub fn eval(height: usize, width: usize, resize_side: usize) -> Self {
        Self::new()
            .with(TransformOperation::AspectResize(AspectResize::new(resize_side)))
            .with(TransformOperation::CenterCrop(CenterCrop::new(height, width)))
            .with(TransformOperation::Normalize(Normalize::default()))
    }

    /// Training preprocessing: aspect resize, random crop, random flip, mean subtraction.
    pub fn train(height: usize, width: usize, resize_side: usize) -> Self {
        Self::new()
            .with(TransformOperation::AspectResize(AspectResize::new(resize_side)))
            .with(TransformOperation::RandomCrop(RandomCrop::new(height, width)))
            .with(TransformOperation::RandomHorizontalFlip(
                RandomHorizontalFlip::default(),
            ))
            .with(TransformOperation::Normalize(Normalize::default()))
    }

    pub fn with(mut self, operation: TransformOperation) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn push(&mut self, operation: TransformOperation) {
        self.operations.push(operation);
    }

    pub fn operations(&self) -> &[TransformOperation] {
        &self.operations
    }

    pub fn operations_mut(&mut self) -> &mut [TransformOperation] {
        &mut self.operations
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn is_random(&self) -> bool {
        self.operations.iter().any(TransformOperation::is_random)
    }

    /// Runs every operation on a single frame.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        frame: ArrayView3<'_, f32>,
        rng: &mut R,
    ) -> RilResult<Array3<f32>> {
        let mut current = frame.to_owned();
        for operation in &self.operations {
            current = operation.apply(current.view(), rng)?;
        }
        Ok(current)
    }

    /// Runs the pipeline on every frame of a clip with one shared set of random draws.
    pub fn apply_clip<R: Rng + ?Sized>(
        &self,
        clip: &FrameSequence,
        rng: &mut R,
    ) -> RilResult<FrameSequence> {
        let clip_seed: u64 = rng.gen();
        let transform = |frame: ArrayView3<'_, f32>| {
            let mut draws = StdRng::seed_from_u64(clip_seed);
            self.apply(frame, &mut draws)
        };
        let frames: Vec<Array3<f32>> = if determinism::lock_reduction_order() {
            clip.frames().map(transform).collect::<RilResult<_>>()?
        } else {
            let views: Vec<ArrayView3<'_, f32>> = clip.frames().collect();
            views
                .into_par_iter()
                .map(transform)
                .collect::<RilResult<_>>()?
        };
        FrameSequence::from_frames(&frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(height: usize, width: usize, channels: usize) -> Array3<f32> {
        Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
            (y * 10 + x) as f32 + c as f32 * 100.0
        })
    }

    #[test]
    fn resize_to_same_size_is_identity() {
        let frame = grid(4, 5, 3);
        let out = Resize::new(4, 5).apply(frame.view()).unwrap();
        assert_eq!(out, frame);
    }

    #[test]
    fn downsampling_by_two_averages_neighbour_rows() {
        let frame = Array3::from_shape_vec((4, 1, 1), vec![0.0, 2.0, 4.0, 6.0]).unwrap();
        let out = Resize::new(2, 1).apply(frame.view()).unwrap();
        assert_eq!(out.shape(), &[2, 1, 1]);
        assert!((out[[0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((out[[1, 0, 0]] - 5.0).abs() < 1e-6);
    }

    #[test]
    fn upsampling_keeps_constant_frames_constant() {
        let frame = Array3::from_elem((2, 3, 2), 7.5f32);
        let out = Resize::new(5, 7).apply(frame.view()).unwrap();
        assert_eq!(out.shape(), &[5, 7, 2]);
        assert!(out.iter().all(|&v| (v - 7.5).abs() < 1e-5));
    }

    #[test]
    fn zero_sized_targets_are_rejected() {
        let frame = grid(4, 4, 1);
        assert!(matches!(
            Resize::new(0, 4).apply(frame.view()),
            Err(RilError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn aspect_resize_scales_the_shorter_side() {
        // Landscape: height is the shorter side.
        assert_eq!(AspectResize::new(100).target_size(200, 400), (100, 200));
        // Portrait: width is the shorter side.
        assert_eq!(AspectResize::new(100).target_size(400, 200), (200, 100));
        // Square frames use the height branch.
        assert_eq!(AspectResize::new(64).target_size(128, 128), (64, 64));
        // 224 / 110 is not representable; the short side must still land on 224.
        assert_eq!(AspectResize::new(224).target_size(110, 200), (224, 407));
    }

    #[test]
    fn aspect_resize_short_side_is_exact_for_every_extent() {
        for side in [112, 171, 224, 256] {
            let resize = AspectResize::new(side);
            for short in 1..=1000 {
                let long = short + short / 3 + 1;
                let (h, w) = resize.target_size(short, long);
                assert_eq!(h, side, "landscape {short}x{long} -> {side}");
                assert!(w >= side);
                let (h, w) = resize.target_size(long, short);
                assert_eq!(w, side, "portrait {long}x{short} -> {side}");
                assert!(h >= side);
            }
        }
    }

    #[test]
    fn eval_pipeline_crops_after_an_inexact_aspect_resize() {
        let frame = grid(110, 200, 3);
        let mut rng = StdRng::seed_from_u64(3);
        let out = TransformPipeline::eval(224, 224, 224)
            .apply(frame.view(), &mut rng)
            .unwrap();
        assert_eq!(out.dim(), (224, 224, 3));
    }

    #[test]
    fn center_crop_takes_the_middle() {
        let frame = grid(5, 5, 1);
        let out = CenterCrop::new(3, 3).apply(frame.view()).unwrap();
        assert_eq!(out.shape(), &[3, 3, 1]);
        assert_eq!(out[[0, 0, 0]], 11.0);
        assert_eq!(out[[2, 2, 0]], 33.0);
    }

    #[test]
    fn crops_larger_than_the_frame_fail() {
        let frame = grid(4, 4, 1);
        assert!(matches!(
            CenterCrop::new(5, 2).apply(frame.view()),
            Err(RilError::InvalidGeometry(_))
        ));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(RandomCrop::new(2, 6).apply(frame.view(), &mut rng).is_err());
    }

    #[test]
    fn random_crop_stays_inside_the_frame() {
        let frame = grid(6, 8, 1);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..64 {
            let out = RandomCrop::new(3, 4).apply(frame.view(), &mut rng).unwrap();
            let top = (out[[0, 0, 0]] as usize) / 10;
            let left = (out[[0, 0, 0]] as usize) % 10;
            assert!(top <= 3 && left <= 4, "offset ({top}, {left})");
        }
    }

    #[test]
    fn normalize_subtracts_channel_means() {
        let frame = Array3::from_elem((2, 2, 3), 200.0f32);
        let out = Normalize::default().apply(frame.view()).unwrap();
        assert!((out[[1, 1, 0]] - (200.0 - 123.68)).abs() < 1e-4);
        assert!((out[[0, 1, 2]] - (200.0 - 103.94)).abs() < 1e-4);
    }

    #[test]
    fn normalize_requires_one_mean_per_channel() {
        let frame = grid(2, 2, 4);
        assert!(matches!(
            Normalize::default().apply(frame.view()),
            Err(RilError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn flip_probability_bounds_the_decision() {
        let frame = grid(2, 3, 1);
        let mut rng = StdRng::seed_from_u64(5);
        let flipped = RandomHorizontalFlip::new(1.0)
            .unwrap()
            .apply(frame.view(), &mut rng)
            .unwrap();
        assert_eq!(flipped[[0, 0, 0]], 2.0);
        assert_eq!(flipped[[1, 2, 0]], 10.0);
        let kept = RandomHorizontalFlip::new(0.0)
            .unwrap()
            .apply(frame.view(), &mut rng)
            .unwrap();
        assert_eq!(kept, frame);
        assert!(RandomHorizontalFlip::new(1.5).is_err());
    }

    #[test]
    fn eval_pipeline_is_deterministic() {
        let frame = grid(40, 60, 3);
        let pipeline = TransformPipeline::eval(16, 16, 20);
        assert!(!pipeline.is_random());
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);
        let a = pipeline.apply(frame.view(), &mut rng_a).unwrap();
        let b = pipeline.apply(frame.view(), &mut rng_b).unwrap();
        assert_eq!(a.shape(), &[16, 16, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn train_pipeline_orders_its_operations() {
        let pipeline = TransformPipeline::train(8, 8, 10);
        let names: Vec<_> = pipeline.operations().iter().map(|op| op.name()).collect();
        assert_eq!(
            names,
            ["aspect_resize", "random_crop", "random_horizontal_flip", "normalize"]
        );
        assert!(pipeline.is_random());
    }

    #[test]
    fn clip_frames_share_random_draws() {
        // Identical frames must stay identical after a random pipeline.
        let frame = grid(12, 12, 3);
        let clip = FrameSequence::from_frames(&[frame.clone(), frame.clone(), frame]).unwrap();
        let pipeline = TransformPipeline::train(5, 5, 12);
        let mut rng = StdRng::seed_from_u64(99);
        let out = pipeline.apply_clip(&clip, &mut rng).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.frame(0).unwrap(), out.frame(1).unwrap());
        assert_eq!(out.frame(1).unwrap(), out.frame(2).unwrap());
    }
}
