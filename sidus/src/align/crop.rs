//! Largest axis-aligned rectangle inside a validity mask.

use common::{Buffer2, Rect};

/// Bounding box of all `true` pixels, `None` if there are none.
pub fn valid_bounds(mask: &Buffer2<bool>) -> Option<Rect> {
    let (mut min_x, mut min_y) = (usize::MAX, usize::MAX);
    let (mut max_x, mut max_y) = (0, 0);
    let mut any = false;

    for y in 0..mask.height() {
        for (x, &valid) in mask.row(y).iter().enumerate() {
            if valid {
                any = true;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
            }
        }
    }

    any.then(|| Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1))
}

/// Shrink the bounding box of the valid region until it holds no invalid pixel.
///
/// Each step drops the edge row or column carrying the largest share of
/// invalid pixels (ties: top, bottom, left, right). Returns `None` when the
/// region collapses.
pub fn crop_to_valid(mask: &Buffer2<bool>) -> Option<Rect> {
    let mut rect = valid_bounds(mask)?;

    loop {
        let invalid_in_row = |y: usize| -> usize {
            mask.row(y)[rect.x..rect.right()].iter().filter(|&&v| !v).count()
        };
        let invalid_in_col = |x: usize| -> usize {
            (rect.y..rect.bottom()).filter(|&y| !mask[(x, y)]).count()
        };

        let top = invalid_in_row(rect.y);
        let bottom = invalid_in_row(rect.bottom() - 1);
        let left = invalid_in_col(rect.x);
        let right = invalid_in_col(rect.right() - 1);

        if top + bottom + left + right == 0 {
            // Edges are clean; the interior may still have holes.
            if let Some(y) = (rect.y..rect.bottom()).find(|&y| invalid_in_row(y) > 0) {
                // Split at the hole row and keep the larger half.
                let above = y - rect.y;
                let below = rect.bottom() - y - 1;
                rect = if above >= below {
                    Rect::new(rect.x, rect.y, rect.width, above)
                } else {
                    Rect::new(rect.x, y + 1, rect.width, below)
                };
                if rect.is_empty() {
                    return None;
                }
                continue;
            }
            return Some(rect);
        }

        // Compare fractions of the edge length: row edges span `width`, column edges `height`.
        let scores = [
            (top as f64 / rect.width as f64, 0),
            (bottom as f64 / rect.width as f64, 1),
            (left as f64 / rect.height as f64, 2),
            (right as f64 / rect.height as f64, 3),
        ];
        let mut side = 0;
        let mut best = scores[0].0;
        for &(score, s) in &scores[1..] {
            if score > best {
                best = score;
                side = s;
            }
        }

        rect = match side {
            0 => Rect::new(rect.x, rect.y + 1, rect.width, rect.height - 1),
            1 => Rect::new(rect.x, rect.y, rect.width, rect.height - 1),
            2 => Rect::new(rect.x + 1, rect.y, rect.width - 1, rect.height),
            _ => Rect::new(rect.x, rect.y, rect.width - 1, rect.height),
        };
        if rect.is_empty() {
            return None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> Buffer2<bool> {
        let height = rows.len();
        let width = rows[0].len();
        Buffer2::from_fn(width, height, |x, y| rows[y].as_bytes()[x] == b'#')
    }

    #[test]
    fn test_full_mask() {
        let mask = Buffer2::new_filled(6, 4, true);
        assert_eq!(crop_to_valid(&mask), Some(Rect::new(0, 0, 6, 4)));
    }

    #[test]
    fn test_empty_mask() {
        let mask = Buffer2::new_filled(6, 4, false);
        assert_eq!(valid_bounds(&mask), None);
        assert_eq!(crop_to_valid(&mask), None);
    }

    #[test]
    fn test_shifted_frame_border() {
        // A frame shifted right by 2 and down by 1.
        let mask = mask_from(&[
            "........", //
            "..######",
            "..######",
            "..######",
        ]);
        assert_eq!(crop_to_valid(&mask), Some(Rect::new(2, 1, 6, 3)));
    }

    #[test]
    fn test_rotated_corners_trimmed() {
        let mask = mask_from(&[
            "..####..", //
            ".######.",
            "########",
            "########",
            ".######.",
            "..####..",
        ]);
        let rect = crop_to_valid(&mask).unwrap();
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                assert!(mask[(x, y)], "({x},{y}) invalid inside {rect:?}");
            }
        }
        assert!(rect.area() >= 16, "{rect:?}");
    }

    #[test]
    fn test_interior_hole() {
        let mask = mask_from(&[
            "######", //
            "######",
            "##.###",
            "######",
            "######",
            "######",
        ]);
        let rect = crop_to_valid(&mask).unwrap();
        assert_eq!(rect, Rect::new(0, 3, 6, 3));
    }
}
