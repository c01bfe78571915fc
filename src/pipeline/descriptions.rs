use std::collections::BTreeMap;

const BUILT_IN_DESCRIPTIONS: &[(&str, &str)] = &[
    // Color operations
    ("grayscale", "Converts image to grayscale (black and white)"),
    ("color_convert", "Converts image to different color space"),
    ("brightness_contrast", "Adjusts brightness and contrast of image"),
    // Blurring and smoothing
    ("average_blur", "Applies average blur to smooth the image"),
    ("gaussian_blur", "Applies Gaussian blur for smooth noise reduction"),
    ("median_blur", "Applies median blur to remove salt-and-pepper noise"),
    ("bilateral_filter", "Applies bilateral filter for edge-preserving smoothing"),
    // Edge detection
    ("canny", "Detects edges using Canny edge detection algorithm"),
    ("sobel", "Detects edges using Sobel operator"),
    // Thresholding
    ("binary_threshold", "Applies binary threshold to create binary image"),
    ("adaptive_threshold", "Applies adaptive threshold for varying lighting conditions"),
    // Morphology
    ("erode", "Erodes the boundaries of foreground objects"),
    ("dilate", "Expands the boundaries of foreground objects"),
    ("opening", "Performs morphological opening (erosion followed by dilation)"),
    ("closing", "Performs morphological closing (dilation followed by erosion)"),
    ("morph_gradient", "Computes morphological gradient (difference between dilation and erosion)"),
    ("top_hat", "Computes top-hat transformation (difference between input and opening)"),
    ("black_hat", "Computes black-hat transformation (difference between closing and input)"),
    // Geometry
    ("resize", "Resizes the image to specified dimensions"),
    ("rotate", "Rotates the image by specified angle"),
    ("flip", "Flips the image horizontally or vertically"),
    // Gradients
    ("laplacian", "Detects edges using Laplacian operator"),
    ("scharr", "Detects edges using Scharr operator"),
    ("magnitude_gradient", "Computes gradient magnitude from Sobel operators"),
    // Histogram and intensity
    ("equalize_histogram", "Equalizes image histogram to improve contrast"),
    ("clahe", "Applies Contrast Limited Adaptive Histogram Equalization"),
    ("normalize", "Normalizes image pixel values to specified range"),
    // Contours
    ("find_contours", "Finds and draws contours in the image"),
    ("draw_contours", "Draws detected contours on a blank background"),
    ("bounding_box", "Draws bounding boxes around detected contours"),
    // Features
    ("orb_features", "Detects ORB (Oriented FAST and Rotated BRIEF) features"),
    ("harris_corner", "Detects corners using Harris corner detection"),
    // Denoising
    ("denoise_gray", "Applies non-local means denoising for grayscale images"),
    ("denoise_color", "Applies non-local means denoising for color images"),
    // Kernels
    ("sharpen", "Applies sharpening filter to enhance image details"),
    ("custom_kernel", "Applies custom convolution kernel to the image"),
    // Arithmetic
    ("add_constant", "Adds a constant value to all pixels"),
    ("multiply_constant", "Multiplies all pixels by a constant value"),
    // Bitwise
    ("bitwise_not", "Applies bitwise NOT operation to image pixels"),
    ("bitwise_and", "Applies bitwise AND operation to image pixels"),
    ("bitwise_or", "Applies bitwise OR operation to image pixels"),
    ("bitwise_xor", "Applies bitwise XOR operation to image pixels"),
    // Pyramids
    ("pyr_down", "Reduces image resolution by half (pyramid down)"),
    ("pyr_up", "Increases image resolution by factor of 2 (pyramid up)"),
];

/// Fixed filter-name to description lookup handed to each session at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptions {
    entries: BTreeMap<String, String>,
}

impl Default for FilterDescriptions {
    fn default() -> Self {
        Self::built_in()
    }
}

impl FilterDescriptions {
    pub fn built_in() -> Self {
        Self {
            entries: BUILT_IN_DESCRIPTIONS
                .iter()
                .map(|(name, text)| (name.to_string(), text.to_string()))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns a copy with `overrides` layered on top; blank texts are ignored.
    pub fn with_overrides<I, K, V>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, text) in overrides {
            let name = name.into();
            let text = text.into();
            if name.trim().is_empty() || text.trim().is_empty() {
                continue;
            }
            self.entries.insert(name.trim().to_string(), text.trim().to_string());
        }
        self
    }

    pub fn describe(&self, filter_name: &str) -> String {
        self.entries
            .get(filter_name)
            .cloned()
            .unwrap_or_else(|| fallback_description(filter_name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// Only the first underscore becomes a space.
fn fallback_description(filter_name: &str) -> String {
    format!("{} filter applied", filter_name.replacen('_', " ", 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_table_covers_known_filters() {
        let table = FilterDescriptions::built_in();
        assert_eq!(
            table.describe("grayscale"),
            "Converts image to grayscale (black and white)"
        );
        assert_eq!(
            table.describe("pyr_up"),
            "Increases image resolution by factor of 2 (pyramid up)"
        );
        assert_eq!(table.len(), BUILT_IN_DESCRIPTIONS.len());
    }

    #[test]
    fn unknown_filters_get_templated_fallback() {
        let table = FilterDescriptions::built_in();
        assert_eq!(table.describe("posterize"), "posterize filter applied");
        assert_eq!(
            table.describe("hough_line_detect"),
            "hough line_detect filter applied"
        );
    }

    #[test]
    fn overrides_replace_and_extend_without_touching_blanks() {
        let table = FilterDescriptions::empty().with_overrides([
            ("grayscale", "Drops color"),
            ("posterize", "Reduces color levels"),
            ("blank", "   "),
        ]);
        assert_eq!(table.describe("grayscale"), "Drops color");
        assert_eq!(table.describe("posterize"), "Reduces color levels");
        assert_eq!(table.describe("blank"), "blank filter applied");
        assert_eq!(table.len(), 2);
    }
}
