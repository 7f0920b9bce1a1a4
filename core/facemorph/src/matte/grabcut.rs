//! Iterative graph-cut segmentation with Gaussian-mixture colour models.

use image::{GrayImage, Luma, RgbImage};
use nalgebra::{Matrix3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::maxflow::FlowNetwork;
use crate::error::MorphError;
use crate::geometry::FaceBox;

/// Mixture components per colour model.
const COMPONENTS: usize = 5;
const KMEANS_ITERATIONS: usize = 10;
/// Added to the covariance diagonal when a component collapses.
const COVARIANCE_REGULARIZER: f64 = 0.01;
/// Floor for mixture likelihoods before taking the log.
const MIN_LIKELIHOOD: f64 = f64::MIN_POSITIVE;

/// Per-pixel segmentation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Label {
    Background = 0,
    Foreground = 1,
    ProbableBackground = 2,
    ProbableForeground = 3,
}

impl Label {
    pub fn is_foreground(self) -> bool {
        matches!(self, Label::Foreground | Label::ProbableForeground)
    }

    fn is_probable(self) -> bool {
        matches!(self, Label::ProbableBackground | Label::ProbableForeground)
    }
}

/// Label map with one [`Label`] per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trimap {
    width: u32,
    height: u32,
    labels: Vec<Label>,
}

impl Trimap {
    pub fn new(width: u32, height: u32, label: Label) -> Self {
        Self {
            width,
            height,
            labels: vec![label; width as usize * height as usize],
        }
    }

    /// Definite background outside `rect`, probable foreground inside.
    pub fn from_rect(width: u32, height: u32, rect: &FaceBox) -> Self {
        let mut trimap = Self::new(width, height, Label::Background);
        trimap.fill(rect, Label::ProbableForeground);
        trimap
    }

    pub fn get(&self, x: u32, y: u32) -> Label {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, label: Label) {
        self.labels[y as usize * self.width as usize + x as usize] = label;
    }

    /// Overwrite every pixel of `rect` (clamped to the map).
    pub fn fill(&mut self, rect: &FaceBox, label: Label) {
        let r = rect.clamped(self.width, self.height);
        for y in r.y1..r.y2 {
            for x in r.x1..r.x2 {
                self.set(x as u32, y as u32, label);
            }
        }
    }

    /// Overwrite a frame `thickness` pixels wide along every image edge.
    pub fn fill_border(&mut self, thickness: u32, label: Label) {
        let t = thickness.min(self.width).min(self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                if x < t || y < t || x >= self.width - t || y >= self.height - t {
                    self.set(x, y, label);
                }
            }
        }
    }

    /// 255 on (probable) foreground, 0 elsewhere.
    pub fn to_binary(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y).is_foreground() { 255 } else { 0 }])
        })
    }
}

#[derive(Debug, Clone)]
struct Component {
    weight: f64,
    mean: Vector3<f64>,
    inv_cov: Matrix3<f64>,
    /// `1 / sqrt(det(cov))`.
    norm: f64,
}

impl Default for Component {
    fn default() -> Self {
        Self {
            weight: 0.0,
            mean: Vector3::zeros(),
            inv_cov: Matrix3::identity(),
            norm: 0.0,
        }
    }
}

impl Component {
    fn density(&self, color: &Vector3<f64>) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        let d = color - self.mean;
        self.norm * (-0.5 * d.dot(&(self.inv_cov * d))).exp()
    }
}

/// Running sums for re-estimating one component.
#[derive(Clone)]
struct Accumulator {
    count: usize,
    sum: Vector3<f64>,
    prod: Matrix3<f64>,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            count: 0,
            sum: Vector3::zeros(),
            prod: Matrix3::zeros(),
        }
    }
}

impl Accumulator {
    fn add(&mut self, color: &Vector3<f64>) {
        self.count += 1;
        self.sum += color;
        self.prod += color * color.transpose();
    }
}

/// Full-covariance Gaussian mixture over RGB.
#[derive(Debug, Clone, Default)]
struct Gmm {
    components: [Component; COMPONENTS],
}

impl Gmm {
    fn learn(samples: &[Vector3<f64>], assignment: &[usize]) -> Self {
        let mut acc: [Accumulator; COMPONENTS] = Default::default();
        for (color, &k) in samples.iter().zip(assignment) {
            acc[k].add(color);
        }
        let total = samples.len() as f64;
        let mut gmm = Gmm::default();
        for (comp, a) in gmm.components.iter_mut().zip(&acc) {
            if a.count == 0 {
                continue;
            }
            let n = a.count as f64;
            let mean = a.sum / n;
            let mut cov = a.prod / n - mean * mean.transpose();
            let mut det = cov.determinant();
            if det <= f64::EPSILON {
                cov += Matrix3::identity() * COVARIANCE_REGULARIZER;
                det = cov.determinant();
            }
            comp.weight = n / total;
            comp.mean = mean;
            comp.inv_cov = cov.try_inverse().unwrap_or_else(Matrix3::identity);
            comp.norm = if det > 0.0 { 1.0 / det.sqrt() } else { 0.0 };
        }
        gmm
    }

    fn likelihood(&self, color: &Vector3<f64>) -> f64 {
        self.components
            .iter()
            .map(|c| c.weight * c.density(color))
            .sum()
    }

    /// Component with the highest unweighted density.
    fn best_component(&self, color: &Vector3<f64>) -> usize {
        let mut best = 0;
        let mut best_p = f64::NEG_INFINITY;
        for (k, c) in self.components.iter().enumerate() {
            let p = c.density(color);
            if p > best_p {
                best = k;
                best_p = p;
            }
        }
        best
    }
}

fn squared_distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (a - b).norm_squared()
}

/// k-means with k-means++ seeding; returns the cluster index of each sample.
fn kmeans(samples: &[Vector3<f64>], k: usize, rng: &mut StdRng) -> Vec<usize> {
    let k = k.min(samples.len());
    let mut labels = vec![0; samples.len()];
    if k == 0 {
        return labels;
    }

    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.gen_range(0..samples.len())]);
    let mut nearest: Vec<f64> = samples.iter().map(|s| squared_distance(s, &centers[0])).collect();
    while centers.len() < k {
        let total: f64 = nearest.iter().sum();
        let pick = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut idx = samples.len() - 1;
            for (i, d) in nearest.iter().enumerate() {
                if target < *d {
                    idx = i;
                    break;
                }
                target -= d;
            }
            idx
        } else {
            rng.gen_range(0..samples.len())
        };
        let c = samples[pick];
        for (d, s) in nearest.iter_mut().zip(samples) {
            *d = d.min(squared_distance(s, &c));
        }
        centers.push(c);
    }

    for _ in 0..KMEANS_ITERATIONS {
        for (label, s) in labels.iter_mut().zip(samples) {
            *label = nearest_center(&centers, s);
        }
        let mut sums = vec![Vector3::zeros(); k];
        let mut counts = vec![0usize; k];
        for (&label, s) in labels.iter().zip(samples) {
            sums[label] += s;
            counts[label] += 1;
        }
        for ((center, sum), n) in centers.iter_mut().zip(&sums).zip(&counts) {
            if *n > 0 {
                *center = sum / *n as f64;
            }
        }
    }
    for (label, s) in labels.iter_mut().zip(samples) {
        *label = nearest_center(&centers, s);
    }
    labels
}

fn nearest_center(centers: &[Vector3<f64>], s: &Vector3<f64>) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let d = squared_distance(s, c);
        if d < best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Colour samples of each class and their pixel indices.
struct ClassSamples {
    fg: Vec<Vector3<f64>>,
    bg: Vec<Vector3<f64>>,
}

impl ClassSamples {
    fn collect(colors: &[Vector3<f64>], trimap: &Trimap) -> Result<Self, MorphError> {
        let mut fg = Vec::new();
        let mut bg = Vec::new();
        for (c, label) in colors.iter().zip(&trimap.labels) {
            if label.is_foreground() {
                fg.push(*c);
            } else {
                bg.push(*c);
            }
        }
        if fg.is_empty() {
            return Err(MorphError::SegmentationFailure("no foreground samples".into()));
        }
        if bg.is_empty() {
            return Err(MorphError::SegmentationFailure("no background samples".into()));
        }
        Ok(Self { fg, bg })
    }
}

/// Smoothness weights to the left, up-left, up and up-right neighbours.
struct NeighbourWeights {
    width: usize,
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

impl NeighbourWeights {
    fn new(colors: &[Vector3<f64>], width: usize, height: usize, gamma: f64) -> Self {
        let idx = |x: usize, y: usize| y * width + x;

        let mut sum = 0.0;
        let mut pairs = 0usize;
        for y in 0..height {
            for x in 0..width {
                let c = &colors[idx(x, y)];
                if x > 0 {
                    sum += squared_distance(c, &colors[idx(x - 1, y)]);
                    pairs += 1;
                }
                if y > 0 {
                    if x > 0 {
                        sum += squared_distance(c, &colors[idx(x - 1, y - 1)]);
                        pairs += 1;
                    }
                    sum += squared_distance(c, &colors[idx(x, y - 1)]);
                    pairs += 1;
                    if x + 1 < width {
                        sum += squared_distance(c, &colors[idx(x + 1, y - 1)]);
                        pairs += 1;
                    }
                }
            }
        }
        let beta = if sum <= f64::EPSILON || pairs == 0 {
            0.0
        } else {
            1.0 / (2.0 * sum / pairs as f64)
        };

        let diag = gamma / std::f64::consts::SQRT_2;
        let len = width * height;
        let mut w = Self {
            width,
            left: vec![0.0; len],
            up_left: vec![0.0; len],
            up: vec![0.0; len],
            up_right: vec![0.0; len],
        };
        for y in 0..height {
            for x in 0..width {
                let i = idx(x, y);
                let c = &colors[i];
                let weight = |other: usize, g: f64| g * (-beta * squared_distance(c, &colors[other])).exp();
                if x > 0 {
                    w.left[i] = weight(idx(x - 1, y), gamma);
                }
                if y > 0 {
                    if x > 0 {
                        w.up_left[i] = weight(idx(x - 1, y - 1), diag);
                    }
                    w.up[i] = weight(idx(x, y - 1), gamma);
                    if x + 1 < width {
                        w.up_right[i] = weight(idx(x + 1, y - 1), diag);
                    }
                }
            }
        }
        w
    }
}

/// Refine `trimap` in place with `iterations` rounds of GrabCut.
///
/// Definite labels are never changed; probable pixels are relabelled by each
/// min-cut. The mixture models are seeded by k-means from the current labels.
pub fn grabcut(
    image: &RgbImage,
    trimap: &mut Trimap,
    iterations: u32,
    gamma: f64,
    seed: u64,
) -> Result<(), MorphError> {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return Err(MorphError::ZeroDimensions);
    }
    let colors: Vec<Vector3<f64>> = image
        .pixels()
        .map(|p| Vector3::new(p.0[0] as f64, p.0[1] as f64, p.0[2] as f64))
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    let initial = ClassSamples::collect(&colors, trimap)?;
    let mut fg_gmm = Gmm::learn(&initial.fg, &kmeans(&initial.fg, COMPONENTS, &mut rng));
    let mut bg_gmm = Gmm::learn(&initial.bg, &kmeans(&initial.bg, COMPONENTS, &mut rng));

    let lambda = 9.0 * gamma;
    let weights = NeighbourWeights::new(&colors, width, height, gamma);

    for iteration in 0..iterations {
        // Assign each pixel to a component of its class's model, then refit.
        let samples = ClassSamples::collect(&colors, trimap)?;
        let fg_assign: Vec<usize> = samples.fg.iter().map(|c| fg_gmm.best_component(c)).collect();
        let bg_assign: Vec<usize> = samples.bg.iter().map(|c| bg_gmm.best_component(c)).collect();
        fg_gmm = Gmm::learn(&samples.fg, &fg_assign);
        bg_gmm = Gmm::learn(&samples.bg, &bg_assign);

        let mut net = FlowNetwork::new(width * height, width * height * 12);
        for (i, (color, label)) in colors.iter().zip(&trimap.labels).enumerate() {
            let (source, sink) = match label {
                Label::Background => (0.0, lambda),
                Label::Foreground => (lambda, 0.0),
                _ => (
                    -bg_gmm.likelihood(color).max(MIN_LIKELIHOOD).ln(),
                    -fg_gmm.likelihood(color).max(MIN_LIKELIHOOD).ln(),
                ),
            };
            net.set_terminal(i, source, sink);

            let x = i % weights.width;
            if x > 0 {
                net.add_edge(i, i - 1, weights.left[i]);
            }
            if i >= width {
                if x > 0 {
                    net.add_edge(i, i - width - 1, weights.up_left[i]);
                }
                net.add_edge(i, i - width, weights.up[i]);
                if x + 1 < width {
                    net.add_edge(i, i - width + 1, weights.up_right[i]);
                }
            }
        }

        let flow = net.max_flow();
        let source_side = net.source_side();
        let mut changed = 0usize;
        for (label, fg) in trimap.labels.iter_mut().zip(source_side) {
            if !label.is_probable() {
                continue;
            }
            let next = if fg {
                Label::ProbableForeground
            } else {
                Label::ProbableBackground
            };
            if *label != next {
                changed += 1;
                *label = next;
            }
        }
        tracing::debug!(iteration, flow, changed, "grabcut iteration");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Red disc on a noisy blue background.
    fn disc_image(size: u32) -> RgbImage {
        let c = size as i32 / 2;
        let r = size as i32 / 4;
        RgbImage::from_fn(size, size, |x, y| {
            let (dx, dy) = (x as i32 - c, y as i32 - c);
            let jitter = ((x * 7 + y * 13) % 9) as u8;
            if dx * dx + dy * dy <= r * r {
                Rgb([200 + jitter, 40 + jitter, 30])
            } else {
                Rgb([20, 60 + jitter, 190 + jitter])
            }
        })
    }

    #[test]
    fn trimap_rect_and_border() {
        let mut t = Trimap::from_rect(10, 8, &FaceBox::new(2, 2, 6, 5));
        assert_eq!(t.get(0, 0), Label::Background);
        assert_eq!(t.get(2, 2), Label::ProbableForeground);
        assert_eq!(t.get(5, 4), Label::ProbableForeground);
        assert_eq!(t.get(6, 4), Label::Background);

        t.fill_border(2, Label::Background);
        t.fill(&FaceBox::new(3, 3, 4, 4), Label::Foreground);
        assert_eq!(t.get(1, 3), Label::Background);
        assert_eq!(t.get(2, 2), Label::ProbableForeground);
        assert_eq!(t.get(3, 3), Label::Foreground);
        let bin = t.to_binary();
        assert_eq!(bin.get_pixel(3, 3).0[0], 255);
        assert_eq!(bin.get_pixel(4, 4).0[0], 255);
        assert_eq!(bin.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn kmeans_separates_two_clusters() {
        let mut samples = vec![Vector3::new(0.0, 0.0, 0.0); 20];
        samples.extend(vec![Vector3::new(250.0, 250.0, 250.0); 20]);
        let mut rng = StdRng::seed_from_u64(7);
        let labels = kmeans(&samples, 2, &mut rng);
        assert!(labels[..20].iter().all(|&l| l == labels[0]));
        assert!(labels[20..].iter().all(|&l| l == labels[20]));
        assert_ne!(labels[0], labels[20]);
    }

    #[test]
    fn kmeans_handles_fewer_samples_than_clusters() {
        let samples = vec![Vector3::new(1.0, 2.0, 3.0), Vector3::new(9.0, 9.0, 9.0)];
        let mut rng = StdRng::seed_from_u64(1);
        let labels = kmeans(&samples, COMPONENTS, &mut rng);
        assert_eq!(labels.len(), 2);
    }

    #[test]
    fn gmm_prefers_its_own_colour() {
        let samples: Vec<_> = (0..50)
            .map(|i| Vector3::new(200.0 + (i % 5) as f64, 40.0 + (i % 3) as f64, 30.0))
            .collect();
        let gmm = Gmm::learn(&samples, &vec![0; samples.len()]);
        let near = gmm.likelihood(&Vector3::new(202.0, 41.0, 30.0));
        let far = gmm.likelihood(&Vector3::new(20.0, 60.0, 190.0));
        assert!(near > far);
        assert!(near.is_finite());
    }

    #[test]
    fn rect_covering_frame_fails() {
        let image = disc_image(16);
        let mut t = Trimap::from_rect(16, 16, &FaceBox::new(0, 0, 16, 16));
        assert!(matches!(
            grabcut(&image, &mut t, 1, 50.0, 0),
            Err(MorphError::SegmentationFailure(_))
        ));
    }

    #[test]
    fn segments_disc_from_background() {
        let image = disc_image(48);
        let mut t = Trimap::from_rect(48, 48, &FaceBox::new(6, 6, 42, 42));
        grabcut(&image, &mut t, 3, 50.0, 42).unwrap();
        assert!(t.get(24, 24).is_foreground());
        assert!(!t.get(8, 8).is_foreground());
        assert_eq!(t.get(1, 1), Label::Background);
    }
}
