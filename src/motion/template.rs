//! Template-matching motion engine.
//!
//! Each object keeps the luminance samples it had when it was registered.
//! On every frame the template is searched in a square window around the
//! last position using normalised cross-correlation; the best offset
//! becomes the new position and its score becomes the correlation.

use std::collections::HashMap;

use super::traits::{
    EngineDiagnostics, EngineObjectId, KeypointChange, MotionEngine, MotionEngineFactory,
};
use crate::frame::FrameGeometry;
use crate::geometry::Rect;
use crate::{Error, Result};

/// Per-sample variance under which a patch counts as flat.
const FLAT_VARIANCE: f64 = 1e-3;

/// Mean luminance difference tolerated between two flat patches.
const FLAT_TOLERANCE: f64 = 8.0;

/// Tunables for [`TemplateEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateConfig {
    /// Half size of the search window, in engine pixels.
    pub search_radius: usize,

    /// Longest template side in samples. Larger objects are subsampled.
    pub max_template_side: usize,

    /// Correlation at or above which an object counts as visible.
    pub visible_threshold: f32,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            search_radius: 8,
            max_template_side: 24,
            visible_threshold: 0.5,
        }
    }
}

impl TemplateConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_template_side == 0 {
            return Err(Error::InvalidConfig(
                "max_template_side must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.visible_threshold) {
            return Err(Error::InvalidConfig(format!(
                "visible_threshold {} outside [0, 1]",
                self.visible_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Template {
    /// Sample offsets from the integer origin of the position, with the
    /// luminance seen at registration.
    samples: Vec<(isize, isize, f64)>,
}

#[derive(Debug, Clone)]
struct TemplateObject {
    template: Template,
    position: Rect,
    correlation: f32,
    visible: bool,
}

/// [`MotionEngine`] based on normalised cross-correlation search.
#[derive(Debug)]
pub struct TemplateEngine {
    config: TemplateConfig,
    geometry: FrameGeometry,
    current: Option<Vec<u8>>,
    objects: HashMap<EngineObjectId, TemplateObject>,
    /// Search offsets ordered by distance, so ties keep the smaller move.
    offsets: Vec<(isize, isize)>,
    keypoints: Vec<KeypointChange>,
}

impl TemplateEngine {
    pub fn new(geometry: FrameGeometry, config: TemplateConfig) -> Result<Self> {
        config.validate()?;

        let r = config.search_radius as isize;
        let mut offsets: Vec<(isize, isize)> = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .collect();
        offsets.sort_by_key(|&(dx, dy)| dx * dx + dy * dy);

        Ok(Self {
            config,
            geometry,
            current: None,
            objects: HashMap::new(),
            offsets,
            keypoints: Vec::new(),
        })
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    fn build_template(&self, position: &Rect, frame: &[u8]) -> Template {
        let (x0, y0) = origin(position);
        let nx = sample_count(position.width(), self.config.max_template_side);
        let ny = sample_count(position.height(), self.config.max_template_side);
        let step_x = position.width().max(1.0) / nx as f32;
        let step_y = position.height().max(1.0) / ny as f32;

        let mut samples = Vec::with_capacity(nx * ny);
        for j in 0..ny {
            let oy = ((j as f32 + 0.5) * step_y).floor() as isize;
            for i in 0..nx {
                let ox = ((i as f32 + 0.5) * step_x).floor() as isize;
                if let Some(v) = self.pixel(frame, x0 + ox, y0 + oy) {
                    samples.push((ox, oy, v as f64));
                }
            }
        }
        Template { samples }
    }

    fn pixel(&self, frame: &[u8], x: isize, y: isize) -> Option<u8> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.geometry.width || y >= self.geometry.height {
            return None;
        }
        frame.get(y * self.geometry.row_stride + x).copied()
    }

    /// Correlation of the template placed at `origin`, `None` when less
    /// than half of it lies inside the frame.
    fn score_at(&self, template: &Template, frame: &[u8], origin: (isize, isize)) -> Option<f64> {
        let (mut n, mut st, mut sp, mut stt, mut spp, mut stp) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        for &(ox, oy, t) in &template.samples {
            if let Some(p) = self.pixel(frame, origin.0 + ox, origin.1 + oy) {
                let p = p as f64;
                n += 1.0;
                st += t;
                sp += p;
                stt += t * t;
                spp += p * p;
                stp += t * p;
            }
        }
        if n == 0.0 || n * 2.0 < template.samples.len() as f64 {
            return None;
        }

        let var_t = stt - st * st / n;
        let var_p = spp - sp * sp / n;
        let flat_t = var_t / n < FLAT_VARIANCE;
        let flat_p = var_p / n < FLAT_VARIANCE;
        if flat_t && flat_p {
            let same = ((st - sp) / n).abs() <= FLAT_TOLERANCE;
            return Some(if same { 1.0 } else { 0.0 });
        }
        if flat_t || flat_p {
            return Some(0.0);
        }
        Some((stp - st * sp / n) / (var_t * var_p).sqrt())
    }

    /// Best offset around `position` in `frame`.
    fn search(&self, template: &Template, position: &Rect, frame: &[u8]) -> Option<(isize, isize, f32)> {
        let (x0, y0) = origin(position);
        let mut best: Option<(isize, isize, f64)> = None;
        for &(dx, dy) in &self.offsets {
            if let Some(score) = self.score_at(template, frame, (x0 + dx, y0 + dy)) {
                if best.map_or(true, |(_, _, b)| score > b) {
                    best = Some((dx, dy, score));
                }
            }
        }
        best.map(|(dx, dy, s)| (dx, dy, s.max(0.0) as f32))
    }

    fn relocate(&mut self, id: EngineObjectId) -> Option<KeypointChange> {
        let frame = self.current.as_deref()?;
        let object = self.objects.get(&id)?;
        let found = self.search(&object.template, &object.position, frame);

        let threshold = self.config.visible_threshold;
        let object = self.objects.get_mut(&id)?;
        let from = object.position.center();
        match found {
            Some((dx, dy, correlation)) => {
                object.position = object.position.offset(dx as f32, dy as f32);
                object.correlation = correlation;
                object.visible = correlation >= threshold;
            }
            None => {
                object.correlation = 0.0;
                object.visible = false;
            }
        }
        Some(KeypointChange {
            from,
            to: object.position.center(),
            score: object.correlation,
            found: object.visible,
        })
    }
}

impl MotionEngine for TemplateEngine {
    fn next_frame(&mut self, frame: &[u8], _timestamp: u64) {
        self.current = Some(frame.to_vec());
        let ids: Vec<EngineObjectId> = self.objects.keys().copied().collect();
        let keypoints = ids.into_iter().filter_map(|id| self.relocate(id)).collect();
        self.keypoints = keypoints;
    }

    fn register_object(&mut self, id: EngineObjectId, position: &Rect, frame: &[u8]) {
        let template = self.build_template(position, frame);
        self.objects.insert(
            id,
            TemplateObject {
                template,
                position: *position,
                correlation: 1.0,
                visible: true,
            },
        );
        self.relocate(id);
    }

    fn set_previous_position(&mut self, id: EngineObjectId, position: &Rect, _timestamp: u64) {
        if let Some(object) = self.objects.get_mut(&id) {
            object.position = *position;
        }
        self.relocate(id);
    }

    fn tracked_position(&self, id: EngineObjectId) -> Rect {
        self.objects
            .get(&id)
            .map(|o| o.position)
            .unwrap_or_default()
    }

    fn correlation(&self, id: EngineObjectId) -> f32 {
        self.objects.get(&id).map(|o| o.correlation).unwrap_or(0.0)
    }

    fn is_visible(&self, id: EngineObjectId) -> bool {
        self.objects.get(&id).map(|o| o.visible).unwrap_or(false)
    }

    fn forget(&mut self, id: EngineObjectId) {
        self.objects.remove(&id);
    }

    fn diagnostics(&self) -> Option<EngineDiagnostics> {
        Some(EngineDiagnostics {
            keypoints: self.keypoints.clone(),
        })
    }
}

/// Factory for [`TemplateEngine`]s.
#[derive(Debug, Clone, Default)]
pub struct TemplateEngineFactory {
    pub config: TemplateConfig,
}

impl TemplateEngineFactory {
    pub fn new(config: TemplateConfig) -> Self {
        Self { config }
    }
}

impl MotionEngineFactory for TemplateEngineFactory {
    fn create(&self, geometry: FrameGeometry) -> Result<Box<dyn MotionEngine>> {
        Ok(Box::new(TemplateEngine::new(geometry, self.config)?))
    }
}

fn origin(position: &Rect) -> (isize, isize) {
    (position.left.floor() as isize, position.top.floor() as isize)
}

fn sample_count(extent: f32, max_side: usize) -> usize {
    (extent.round().max(1.0) as usize).min(max_side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SIZE: usize = 64;

    fn texture(x: i64, y: i64, seed: u32) -> u8 {
        let h = (x as u32)
            .wrapping_mul(73_856_093)
            ^ (y as u32).wrapping_mul(19_349_663)
            ^ seed.wrapping_mul(83_492_791);
        (h.wrapping_mul(2_654_435_761) >> 24) as u8
    }

    /// Textured frame with its content shifted by `(dx, dy)`.
    fn textured(dx: i64, dy: i64, seed: u32) -> Vec<u8> {
        let mut data = vec![0u8; SIZE * SIZE];
        for y in 0..SIZE {
            for x in 0..SIZE {
                data[y * SIZE + x] = texture(x as i64 - dx + 1000, y as i64 - dy + 1000, seed);
            }
        }
        data
    }

    fn engine() -> TemplateEngine {
        let geometry = FrameGeometry::new(SIZE, SIZE, SIZE).unwrap();
        TemplateEngine::new(geometry, TemplateConfig::default()).unwrap()
    }

    #[test]
    fn test_register_without_current_frame_is_fully_correlated() {
        let mut engine = engine();
        let rect = Rect::new(10.0, 10.0, 26.0, 26.0);
        engine.register_object(1, &rect, &textured(0, 0, 1));
        assert_eq!(engine.correlation(1), 1.0);
        assert_eq!(engine.tracked_position(1), rect);
        assert!(engine.is_visible(1));
    }

    #[test]
    fn test_follows_shifted_texture() {
        let mut engine = engine();
        engine.register_object(1, &Rect::new(20.0, 20.0, 36.0, 36.0), &textured(0, 0, 1));

        engine.next_frame(&textured(3, 2, 1), 1);
        assert_eq!(engine.tracked_position(1), Rect::new(23.0, 22.0, 39.0, 38.0));
        assert_relative_eq!(engine.correlation(1), 1.0, epsilon = 1e-4);

        let diagnostics = engine.diagnostics().unwrap();
        assert_eq!(diagnostics.keypoints.len(), 1);
        assert_eq!(diagnostics.keypoints[0].from, (28.0, 28.0));
        assert_eq!(diagnostics.keypoints[0].to, (31.0, 30.0));
        assert!(diagnostics.keypoints[0].found);
    }

    #[test]
    fn test_lost_when_texture_changes() {
        let mut engine = engine();
        engine.register_object(1, &Rect::new(20.0, 20.0, 36.0, 36.0), &textured(0, 0, 1));
        engine.next_frame(&textured(0, 0, 2), 1);
        assert!(engine.correlation(1) < 0.5);
        assert!(!engine.is_visible(1));
    }

    #[test]
    fn test_flat_frames_keep_position() {
        let mut engine = engine();
        let flat = vec![128u8; SIZE * SIZE];
        let rect = Rect::new(5.0, 5.0, 21.0, 21.0);
        engine.register_object(1, &rect, &flat);
        engine.next_frame(&flat, 1);
        assert_eq!(engine.tracked_position(1), rect);
        assert_eq!(engine.correlation(1), 1.0);
    }

    #[test]
    fn test_object_outside_frame_has_zero_correlation() {
        let mut engine = engine();
        engine.next_frame(&textured(0, 0, 1), 1);
        engine.register_object(1, &Rect::new(200.0, 200.0, 216.0, 216.0), &textured(0, 0, 1));
        assert_eq!(engine.correlation(1), 0.0);
        assert!(!engine.is_visible(1));
    }

    #[test]
    fn test_large_objects_are_subsampled() {
        let engine = engine();
        let template = engine.build_template(&Rect::new(0.0, 0.0, 60.0, 48.0), &textured(0, 0, 1));
        assert_eq!(template.samples.len(), 24 * 24);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let geometry = FrameGeometry::new(8, 8, 8).unwrap();
        let config = TemplateConfig {
            max_template_side: 0,
            ..TemplateConfig::default()
        };
        assert!(TemplateEngine::new(geometry, config).is_err());
    }
}
