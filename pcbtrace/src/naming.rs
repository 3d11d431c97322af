//! Component identifiers.
//!
//! Parts that usually carry printed markings (ICs, diodes, LEDs,
//! transistors) are named from OCR text when it can be read. Everything
//! else gets a reference-designator style label such as `R3` or `U1`.
//! Counters live in a [`NamingContext`] owned by one analysis run.

use std::collections::{HashMap, HashSet};

use image::{imageops, RgbImage};

use crate::circuit::Component;
use crate::detection::{BoundingBox, Detection};
use crate::ocr::TextReader;

const OCR_CLASSES: &[&str] = &["ic", "chip", "integrated", "circuit", "diode", "led", "transistor"];
const NO_OCR_CLASSES: &[&str] = &["resistor", "capacitor", "smd"];

/// Whether a detector class is worth sending to OCR.
pub fn should_run_ocr(class_name: &str) -> bool {
    let class = class_name.to_lowercase();
    if OCR_CLASSES.iter().any(|k| class.contains(k)) {
        return true;
    }
    !NO_OCR_CLASSES.iter().any(|k| class.contains(k))
}

/// Reference-designator prefix for a detector class.
pub fn generic_prefix(class_name: &str) -> &'static str {
    let class = class_name.to_lowercase();
    if class.contains("resistor") {
        "R"
    } else if class.contains("capacitor") {
        "C"
    } else if class.contains("ic") || class.contains("chip") || class.contains("integrated") {
        "U"
    } else if class.contains("diode") {
        "D"
    } else if class.contains("led") {
        "LED"
    } else if class.contains("transistor") {
        "Q"
    } else {
        "X"
    }
}

/// Per-run naming state: label counters and every identifier handed out.
#[derive(Debug, Default)]
pub struct NamingContext {
    counters: HashMap<&'static str, u32>,
    taken: HashSet<String>,
}

impl NamingContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next free generic label for `class_name`, e.g. `R1`, `R2`.
    pub fn generic_id(&mut self, class_name: &str) -> String {
        let prefix = generic_prefix(class_name);
        let counter = self.counters.entry(prefix).or_insert(0);
        loop {
            *counter += 1;
            let id = format!("{}{}", prefix, counter);
            if self.taken.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Claim an OCR-derived identifier, suffixing `-2`, `-3`, ... on collision.
    pub fn claim(&mut self, text: &str) -> String {
        if self.taken.insert(text.to_string()) {
            return text.to_string();
        }
        let mut n = 2;
        loop {
            let id = format!("{}-{}", text, n);
            if self.taken.insert(id.clone()) {
                return id;
            }
            n += 1;
        }
    }

    pub fn is_taken(&self, id: &str) -> bool {
        self.taken.contains(id)
    }
}

/// Crop a component region, clipped to the image. `None` when nothing remains.
pub fn crop_component(image: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    if bbox.is_degenerate() {
        return None;
    }
    let (cx, cy) = (bbox.x as i64, bbox.y as i64);
    let (half_w, half_h) = (bbox.width as i64 / 2, bbox.height as i64 / 2);
    let x1 = (cx - half_w).max(0);
    let y1 = (cy - half_h).max(0);
    let x2 = (cx + half_w).min(image.width() as i64);
    let y2 = (cy + half_h).min(image.height() as i64);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(imageops::crop_imm(image, x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32).to_image())
}

/// Name one detection: OCR text when readable, otherwise a generic label.
pub async fn name_component(
    image: &RgbImage,
    detection: &Detection,
    reader: &dyn TextReader,
    ctx: &mut NamingContext,
) -> String {
    if should_run_ocr(&detection.class_name) {
        if let Some(crop) = crop_component(image, &detection.bbox) {
            match reader.read_text(&crop).await {
                Ok(Some(text)) if !text.trim().is_empty() => {
                    tracing::debug!("OCR read '{}' for {}", text.trim(), detection.class_name);
                    return ctx.claim(text.trim());
                }
                Ok(_) => tracing::debug!("OCR found no text for {}", detection.class_name),
                Err(e) => tracing::warn!("OCR via {} failed: {}", reader.name(), e),
            }
        }
    }
    ctx.generic_id(&detection.class_name)
}

/// Turn final detections into named components, preserving order.
pub async fn name_components(
    image: &RgbImage,
    detections: &[Detection],
    reader: &dyn TextReader,
    ctx: &mut NamingContext,
) -> Vec<Component> {
    let mut components = Vec::with_capacity(detections.len());
    for detection in detections {
        let id = name_component(image, detection, reader, ctx).await;
        components.push(
            Component::new(id, detection.class_name.clone(), detection.bbox)
                .with_confidence(detection.confidence),
        );
    }
    tracing::info!(
        "Component naming complete: {:?}",
        components.iter().map(|c| c.id.as_str()).collect::<Vec<_>>()
    );
    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{NoTextReader, OcrError};
    use async_trait::async_trait;

    struct FixedReader(&'static str);

    #[async_trait]
    impl TextReader for FixedReader {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn read_text(&self, _crop: &RgbImage) -> Result<Option<String>, OcrError> {
            Ok(Some(self.0.to_string()))
        }
    }

    struct BrokenReader;

    #[async_trait]
    impl TextReader for BrokenReader {
        fn name(&self) -> &str {
            "broken"
        }

        async fn read_text(&self, _crop: &RgbImage) -> Result<Option<String>, OcrError> {
            Err(OcrError::Failed("model not loaded".to_string()))
        }
    }

    fn det(class: &str, x: f64, y: f64) -> Detection {
        Detection::new(class, 0.9, BoundingBox::new(x, y, 20.0, 20.0))
    }

    #[test]
    fn test_should_run_ocr() {
        assert!(should_run_ocr("IC"));
        assert!(should_run_ocr("LED"));
        assert!(should_run_ocr("Transistor"));
        assert!(!should_run_ocr("Resistor"));
        assert!(!should_run_ocr("SMD Capacitor"));
        assert!(should_run_ocr("Connector"));
    }

    #[test]
    fn test_generic_prefixes() {
        assert_eq!(generic_prefix("Resistor"), "R");
        assert_eq!(generic_prefix("Electrolytic Capacitor"), "C");
        assert_eq!(generic_prefix("IC"), "U");
        assert_eq!(generic_prefix("Diode"), "D");
        assert_eq!(generic_prefix("LED"), "LED");
        assert_eq!(generic_prefix("Transistor"), "Q");
        assert_eq!(generic_prefix("Button"), "X");
    }

    #[test]
    fn test_counters_are_per_prefix_and_per_context() {
        let mut ctx = NamingContext::new();
        assert_eq!(ctx.generic_id("Resistor"), "R1");
        assert_eq!(ctx.generic_id("Resistor"), "R2");
        assert_eq!(ctx.generic_id("Capacitor"), "C1");

        let mut fresh = NamingContext::new();
        assert_eq!(fresh.generic_id("Resistor"), "R1");
    }

    #[test]
    fn test_collisions_are_resolved() {
        let mut ctx = NamingContext::new();
        assert_eq!(ctx.claim("U2"), "U2");
        assert_eq!(ctx.generic_id("IC"), "U1");
        assert_eq!(ctx.generic_id("IC"), "U3");
        assert_eq!(ctx.claim("NE555"), "NE555");
        assert_eq!(ctx.claim("NE555"), "NE555-2");
        assert_eq!(ctx.claim("NE555"), "NE555-3");
        assert!(ctx.is_taken("U3"));
    }

    #[test]
    fn test_crop_is_clipped() {
        let image = RgbImage::new(100, 50);
        let crop = crop_component(&image, &BoundingBox::new(95.0, 45.0, 20.0, 20.0)).unwrap();
        assert_eq!(crop.dimensions(), (15, 15));
        assert!(crop_component(&image, &BoundingBox::new(300.0, 45.0, 20.0, 20.0)).is_none());
        assert!(crop_component(&image, &BoundingBox::new(10.0, 10.0, 1.0, 1.0)).is_none());
    }

    #[tokio::test]
    async fn test_ocr_text_names_labelled_parts_only() {
        let image = RgbImage::new(200, 200);
        let detections = vec![det("IC", 50.0, 50.0), det("Resistor", 100.0, 100.0), det("IC", 150.0, 150.0)];
        let mut ctx = NamingContext::new();
        let components = name_components(&image, &detections, &FixedReader("  LM358 "), &mut ctx).await;
        let ids: Vec<_> = components.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["LM358", "R1", "LM358-2"]);
        assert_eq!(components[1].component_type, "Resistor");
    }

    #[tokio::test]
    async fn test_ocr_failures_fall_back_to_generic() {
        let image = RgbImage::new(200, 200);
        let detections = vec![det("IC", 50.0, 50.0), det("LED", 100.0, 100.0), det("IC", 500.0, 500.0)];

        let mut ctx = NamingContext::new();
        let broken = name_components(&image, &detections, &BrokenReader, &mut ctx).await;
        assert_eq!(broken.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(), vec!["U1", "LED1", "U2"]);

        let mut ctx = NamingContext::new();
        let blank = name_components(&image, &detections, &FixedReader("   "), &mut ctx).await;
        assert_eq!(blank[0].id, "U1");

        let mut ctx = NamingContext::new();
        let none = name_components(&image, &detections, &NoTextReader, &mut ctx).await;
        assert_eq!(none[1].id, "LED1");
    }
}
