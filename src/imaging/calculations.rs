//! Pure dimension math for the built-in filter loaders.
//!
//! Everything here is a pure function, testable without I/O or pixel data.

/// Dimensions that fit inside `target` while preserving the source aspect
/// ratio. At least one output dimension matches the target; neither exceeds.
/// Never upscales: a source smaller than the target is returned unchanged.
pub fn fit_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if src_w <= tgt_w && src_h <= tgt_h {
        return source;
    }

    let ratio_w = tgt_w as f64 / src_w as f64;
    let ratio_h = tgt_h as f64 / src_h as f64;
    let ratio = ratio_w.min(ratio_h);

    (
        ((src_w as f64 * ratio).round() as u32).max(1),
        ((src_h as f64 * ratio).round() as u32).max(1),
    )
}

/// Dimensions that completely cover `target` while preserving the source
/// aspect ratio. One dimension matches the target exactly, the other may
/// exceed it — the excess is what a center crop removes afterwards.
pub fn fill_dimensions(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    let src_aspect = src_w as f64 / src_h as f64;
    let tgt_aspect = tgt_w as f64 / tgt_h as f64;

    if src_aspect > tgt_aspect {
        // Source is wider: height matches, width exceeds
        let h = tgt_h;
        let w = (h as f64 * src_aspect).round() as u32;
        (w.max(tgt_w), h)
    } else {
        // Source is taller: width matches, height exceeds
        let w = tgt_w;
        let h = (w as f64 / src_aspect).round() as u32;
        (w, h.max(tgt_h))
    }
}

/// Top-left origin of a centered `crop` inside a `scaled` image.
pub fn center_crop_origin(scaled: (u32, u32), crop: (u32, u32)) -> (u32, u32) {
    (
        scaled.0.saturating_sub(crop.0) / 2,
        scaled.1.saturating_sub(crop.1) / 2,
    )
}

/// Dimensions scaled by a factor, rounded, floored at 1x1.
pub fn scaled_dimensions(source: (u32, u32), factor: f64) -> (u32, u32) {
    (
        ((source.0 as f64 * factor).round() as u32).max(1),
        ((source.1 as f64 * factor).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_shrinks_landscape_into_box() {
        // 800x600 into 400x400: width is the constraint
        assert_eq!(fit_dimensions((800, 600), (400, 400)), (400, 300));
    }

    #[test]
    fn fit_shrinks_portrait_into_box() {
        assert_eq!(fit_dimensions((600, 800), (400, 400)), (300, 400));
    }

    #[test]
    fn fit_never_upscales() {
        assert_eq!(fit_dimensions((200, 100), (400, 400)), (200, 100));
    }

    #[test]
    fn fit_exact_match_is_identity() {
        assert_eq!(fit_dimensions((400, 300), (400, 300)), (400, 300));
    }

    #[test]
    fn fill_wider_source_covers_portrait_target() {
        // 800x600 (4:3) covering 400x500: height matches, width exceeds
        assert_eq!(fill_dimensions((800, 600), (400, 500)), (667, 500));
    }

    #[test]
    fn fill_taller_source_covers_landscape_target() {
        assert_eq!(fill_dimensions((600, 800), (500, 400)), (500, 667));
    }

    #[test]
    fn fill_same_aspect_matches_exactly() {
        assert_eq!(fill_dimensions((800, 600), (400, 300)), (400, 300));
    }

    #[test]
    fn center_crop_origin_centers_excess() {
        assert_eq!(center_crop_origin((667, 500), (400, 500)), (133, 0));
        assert_eq!(center_crop_origin((500, 667), (500, 400)), (0, 133));
    }

    #[test]
    fn center_crop_origin_saturates_when_crop_exceeds() {
        assert_eq!(center_crop_origin((100, 100), (200, 200)), (0, 0));
    }

    #[test]
    fn scaled_dimensions_rounds_and_floors() {
        assert_eq!(scaled_dimensions((800, 600), 0.5), (400, 300));
        assert_eq!(scaled_dimensions((3, 3), 0.1), (1, 1));
        assert_eq!(scaled_dimensions((100, 50), 1.5), (150, 75));
    }
}
