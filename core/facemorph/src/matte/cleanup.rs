//! Binary mask post-processing: edge snapping, morphology and blob filtering.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, dilate, erode, open};
use imageproc::region_labelling::{connected_components, Connectivity};

use super::MatteConfig;

/// Pull boundary pixels that sit on a strong image edge into the mask.
pub(crate) fn snap_to_edges(image: &RgbImage, binary: &mut GrayImage, config: &MatteConfig) {
    let gray = image::imageops::grayscale(image);
    let blurred = gaussian_blur_f32(&gray, config.edge_blur_sigma);
    let edges = canny(&blurred, config.canny_low, config.canny_high);
    let edges = dilate(&edges, Norm::L1, config.edge_dilate_radius);

    let grown = dilate(binary, Norm::L1, config.boundary_band_radius);
    let shrunk = erode(binary, Norm::L1, config.boundary_band_radius);

    let mut snapped = 0usize;
    for (x, y, pixel) in binary.enumerate_pixels_mut() {
        let band = grown.get_pixel(x, y).0[0].saturating_sub(shrunk.get_pixel(x, y).0[0]) > 0;
        if band && edges.get_pixel(x, y).0[0] > 0 && pixel.0[0] == 0 {
            pixel.0[0] = 255;
            snapped += 1;
        }
    }
    tracing::debug!(snapped, "edge snapping");
}

/// Close small holes, then drop thin spurs.
pub(crate) fn smooth(binary: &GrayImage, config: &MatteConfig) -> GrayImage {
    let closed = close(binary, Norm::L2, config.close_radius);
    open(&closed, Norm::L2, config.open_radius)
}

/// Keep only the largest 8-connected foreground blob.
///
/// A mask without any foreground is returned unchanged.
pub fn keep_largest_component(binary: &GrayImage) -> GrayImage {
    let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
    let mut areas: Vec<usize> = Vec::new();
    for label in labels.pixels() {
        let l = label.0[0] as usize;
        if l == 0 {
            continue;
        }
        if areas.len() <= l {
            areas.resize(l + 1, 0);
        }
        areas[l] += 1;
    }
    let Some((largest, _)) = areas
        .iter()
        .enumerate()
        .skip(1)
        .max_by_key(|&(l, &area)| (area, std::cmp::Reverse(l)))
    else {
        return binary.clone();
    };
    tracing::debug!(blobs = areas.len().saturating_sub(1), largest, "component filter");

    GrayImage::from_fn(binary.width(), binary.height(), |x, y| {
        Luma([if labels.get_pixel(x, y).0[0] as usize == largest { 255 } else { 0 }])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn largest_blob_wins() {
        let mut mask = GrayImage::new(60, 40);
        draw_filled_rect_mut(&mut mask, Rect::at(2, 2).of_size(5, 5), Luma([255]));
        draw_filled_rect_mut(&mut mask, Rect::at(20, 10).of_size(20, 20), Luma([255]));
        draw_filled_rect_mut(&mut mask, Rect::at(50, 30).of_size(3, 3), Luma([255]));

        let kept = keep_largest_component(&mask);
        assert_eq!(kept.get_pixel(25, 15).0[0], 255);
        assert_eq!(kept.get_pixel(3, 3).0[0], 0);
        assert_eq!(kept.get_pixel(51, 31).0[0], 0);
        let lit = kept.pixels().filter(|p| p.0[0] == 255).count();
        assert_eq!(lit, 400);
    }

    #[test]
    fn diagonal_neighbours_are_connected() {
        let mut mask = GrayImage::new(10, 10);
        for i in 0..6 {
            mask.put_pixel(i, i, Luma([255]));
        }
        mask.put_pixel(9, 0, Luma([255]));
        let kept = keep_largest_component(&mask);
        assert_eq!(kept.get_pixel(5, 5).0[0], 255);
        assert_eq!(kept.get_pixel(9, 0).0[0], 0);
    }

    #[test]
    fn empty_mask_is_unchanged() {
        let mask = GrayImage::new(12, 9);
        assert_eq!(keep_largest_component(&mask), mask);
    }

    #[test]
    fn smoothing_fills_pinholes() {
        let mut mask = GrayImage::new(100, 60);
        draw_filled_rect_mut(&mut mask, Rect::at(10, 10).of_size(40, 40), Luma([255]));
        mask.put_pixel(30, 30, Luma([0]));
        mask.put_pixel(80, 30, Luma([255]));
        let out = smooth(&mask, &MatteConfig::default());
        assert_eq!(out.get_pixel(30, 30).0[0], 255);
        assert_eq!(out.get_pixel(80, 30).0[0], 0);
    }

    #[test]
    fn edges_inside_band_are_added() {
        // Dark left half / bright right half with the mask stopping short of
        // the boundary.
        let image = RgbImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                image::Rgb([10, 10, 10])
            } else {
                image::Rgb([240, 240, 240])
            }
        });
        let mut mask = GrayImage::new(40, 20);
        draw_filled_rect_mut(&mut mask, Rect::at(0, 0).of_size(16, 20), Luma([255]));
        snap_to_edges(&image, &mut mask, &MatteConfig::default());
        assert_eq!(mask.get_pixel(19, 10).0[0], 255);
        assert_eq!(mask.get_pixel(35, 10).0[0], 0);
    }
}
