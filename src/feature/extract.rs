use super::iris::IrisExtractor;
use super::makeup::{EyeshadowColorExtractor, LipstickColorExtractor};
use crate::color::ColorExtractor;
use crate::error::{Error, Result};
use crate::segment::{FaceParser, ParsingSegmenter, SegmentInput};
use crate::shapes::{
    LabelMap, Mask, biggest_contour, bounding_rect, crop, crop_mask, erode, safe_rect, squareify,
};
use crate::stage::Stage;
use image::RgbImage;
use ndarray::{Array1, Array2, ArrayView2, Axis, concatenate};
use tracing::{Level, debug, span};

/// Turns face crops into fixed-length feature vectors.
pub trait FeatureExtractor {
    /// Fills components whose region had no usable pixels.
    const MISSING_VALUE: f32 = -1.0;

    /// Column names, in output order.
    fn labels(&self) -> Vec<String>;

    /// One row per face.
    fn extract_batch(&self, faces: &[&RgbImage]) -> Result<Array2<f32>>;

    fn extract(&self, face: &RgbImage) -> Result<Array1<f32>> {
        let batch = self.extract_batch(&[face])?;
        let n = batch.nrows();
        batch
            .axis_iter(Axis(0))
            .next()
            .map(|row| row.to_owned())
            .ok_or(Error::StageOutput {
                expected: 1,
                actual: n,
            })
    }
}

fn rgb_labels(parts: &[&str]) -> Vec<String> {
    parts
        .iter()
        .flat_map(|p| ["r", "g", "b"].map(|c| format!("{p}_{c}")))
        .collect()
}

// First color of `colors` (or the sentinel) padded to `width` values.
fn padded(colors: ArrayView2<u8>, width: usize, missing: f32) -> Vec<f32> {
    let mut values: Vec<f32> = colors.iter().map(|v| *v as f32).take(width).collect();
    values.resize(width, missing);
    values
}

fn stack(rows: Vec<Array1<f32>>, width: usize) -> Result<Array2<f32>> {
    if rows.is_empty() {
        return Ok(Array2::zeros((0, width)));
    }
    let views: Vec<_> = rows.iter().map(|r| r.view().insert_axis(Axis(0))).collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// Skin, hair, lips and iris colors.
pub struct ColorsFeatureExtractor<P> {
    segmenter: ParsingSegmenter<P>,
    color: ColorExtractor,
    iris: IrisExtractor,
}

impl<P: FaceParser> ColorsFeatureExtractor<P> {
    pub const SKIN: i32 = 1;
    pub const HAIR: i32 = 2;
    pub const LIPS: i32 = 3;
    pub const EYES: i32 = 4;

    pub fn new(parser: P) -> Result<Self> {
        Self::with_extractors(parser, ColorExtractor::Median, IrisExtractor::default())
    }

    pub fn with_extractors(parser: P, color: ColorExtractor, iris: IrisExtractor) -> Result<Self> {
        let parts = [
            ("skin", Self::SKIN),
            ("hair", Self::HAIR),
            ("u_lip", Self::LIPS),
            ("l_lip", Self::LIPS),
            ("l_eye", Self::EYES),
            ("r_eye", Self::EYES),
        ];
        Ok(ColorsFeatureExtractor {
            segmenter: ParsingSegmenter::new(parser, Some(&parts), 0)?,
            color,
            iris,
        })
    }

    /// Region codes of `face`, 0 outside every region.
    pub fn segment(&self, face: &RgbImage) -> Result<LabelMap> {
        self.segmenter.call(SegmentInput::new(face))
    }

    fn region_color(&self, img: &RgbImage, mask: &Mask) -> Vec<f32> {
        padded(self.color.extract(img, mask).view(), 3, Self::MISSING_VALUE)
    }

    /// Iris color of the biggest eye, cropped to its square surroundings.
    fn eye_color(&self, img: &RgbImage, eyes_mask: &Mask) -> Result<Vec<f32>> {
        let contour = biggest_contour(eyes_mask);
        let (img, mask) = match bounding_rect(&contour) {
            Some(eye_rect) => {
                let square = safe_rect(squareify(eye_rect), img.dimensions(), true)?;
                let margin = ((0.1 * eye_rect.height() as f64).round() as usize).max(1);
                let mask = erode(&crop_mask(eyes_mask, square), margin, true);
                (crop(img, square), mask)
            }
            None => (img.clone(), eyes_mask.clone()),
        };

        let iris = self.iris.extract(&img, &mask)?;
        Ok(self.region_color(&img, &iris))
    }

    fn extract_single(&self, img: &RgbImage, labels: &LabelMap) -> Result<Array1<f32>> {
        let region = |code: i32| labels.mapv(|l| l == code);

        let mut values = Vec::with_capacity(12);
        values.extend(self.region_color(img, &region(Self::SKIN)));
        values.extend(self.region_color(img, &region(Self::HAIR)));
        values.extend(self.region_color(img, &region(Self::LIPS)));
        values.extend(self.eye_color(img, &region(Self::EYES))?);
        Ok(Array1::from(values))
    }
}

impl<P: FaceParser> Stage for ColorsFeatureExtractor<P> {
    type Input<'a> = &'a RgbImage;
    type Output = Array1<f32>;
    const BATCHABLE: bool = true;

    fn perform(&self, faces: &[&RgbImage]) -> Result<Vec<Array1<f32>>> {
        let span = span!(Level::DEBUG, "colors_features", n = faces.len());
        let _guard = span.enter();

        let inputs: Vec<SegmentInput> = faces.iter().map(|f| SegmentInput::new(f)).collect();
        let segmented = self.segmenter.call_batch(&inputs)?;
        faces
            .iter()
            .zip(&segmented)
            .map(|(face, labels)| self.extract_single(face, labels))
            .collect()
    }
}

impl<P: FaceParser> FeatureExtractor for ColorsFeatureExtractor<P> {
    fn labels(&self) -> Vec<String> {
        rgb_labels(&["skin", "hair", "lips", "eyes"])
    }

    fn extract_batch(&self, faces: &[&RgbImage]) -> Result<Array2<f32>> {
        let rows = self.call_batch(faces)?;
        debug!(n = rows.len(), "extracted color features");
        stack(rows, 12)
    }
}

/// Lipstick color and three eyeshadow bands.
pub struct MakeupFeatureExtractor<P> {
    segmenter: ParsingSegmenter<P>,
    lipstick: LipstickColorExtractor,
    eyeshadow: EyeshadowColorExtractor,
}

impl<P: FaceParser> MakeupFeatureExtractor<P> {
    pub const SKIN: i32 = 1;
    pub const EYES: i32 = 2;
    pub const LIPS: i32 = 4;

    pub fn new(parser: P) -> Result<Self> {
        Self::with_extractors(
            parser,
            LipstickColorExtractor::default(),
            EyeshadowColorExtractor::default(),
        )
    }

    pub fn with_extractors(
        parser: P,
        lipstick: LipstickColorExtractor,
        eyeshadow: EyeshadowColorExtractor,
    ) -> Result<Self> {
        let parts = [
            ("skin", Self::SKIN),
            ("l_eye", Self::EYES),
            ("r_eye", Self::EYES),
            ("u_lip", Self::LIPS),
            ("l_lip", Self::LIPS),
        ];
        Ok(MakeupFeatureExtractor {
            segmenter: ParsingSegmenter::new(parser, Some(&parts), 0)?,
            lipstick,
            eyeshadow,
        })
    }

    fn extract_single(&self, img: &RgbImage, labels: &LabelMap) -> Result<Array1<f32>> {
        let region = |code: i32| labels.mapv(|l| l == code);

        let lipstick = self.lipstick.extract(img, &region(Self::LIPS));
        let eyeshadow = self
            .eyeshadow
            .extract(img, &region(Self::SKIN), &region(Self::EYES))?;

        let mut values = padded(lipstick.view(), 3, Self::MISSING_VALUE);
        values.extend(padded(eyeshadow.view(), 9, Self::MISSING_VALUE));
        Ok(Array1::from(values))
    }
}

impl<P: FaceParser> Stage for MakeupFeatureExtractor<P> {
    type Input<'a> = &'a RgbImage;
    type Output = Array1<f32>;
    const BATCHABLE: bool = true;

    fn perform(&self, faces: &[&RgbImage]) -> Result<Vec<Array1<f32>>> {
        let span = span!(Level::DEBUG, "makeup_features", n = faces.len());
        let _guard = span.enter();

        let inputs: Vec<SegmentInput> = faces.iter().map(|f| SegmentInput::new(f)).collect();
        let segmented = self.segmenter.call_batch(&inputs)?;
        faces
            .iter()
            .zip(&segmented)
            .map(|(face, labels)| self.extract_single(face, labels))
            .collect()
    }
}

impl<P: FaceParser> FeatureExtractor for MakeupFeatureExtractor<P> {
    fn labels(&self) -> Vec<String> {
        rgb_labels(&["lipstick", "eyeshadow0", "eyeshadow1", "eyeshadow2"])
    }

    fn extract_batch(&self, faces: &[&RgbImage]) -> Result<Array2<f32>> {
        stack(self.call_batch(faces)?, 12)
    }
}

/// Face embedding network.
pub trait Embedder: Send + Sync {
    /// Length of every embedding.
    fn width(&self) -> usize;

    fn embed(&self, faces: &[&RgbImage]) -> Result<Array2<f32>>;
}

pub struct EmbeddingFeatureExtractor<E> {
    embedder: E,
}

impl<E: Embedder> EmbeddingFeatureExtractor<E> {
    pub fn new(embedder: E) -> Self {
        EmbeddingFeatureExtractor { embedder }
    }
}

impl<E: Embedder> FeatureExtractor for EmbeddingFeatureExtractor<E> {
    fn labels(&self) -> Vec<String> {
        (0..self.embedder.width()).map(|i| format!("f{i}")).collect()
    }

    fn extract_batch(&self, faces: &[&RgbImage]) -> Result<Array2<f32>> {
        let embedded = self.embedder.embed(faces)?;
        if embedded.nrows() != faces.len() {
            return Err(Error::InconsistentSamples(faces.len(), embedded.nrows()));
        }
        if embedded.ncols() != self.embedder.width() {
            return Err(Error::DimensionMismatch {
                what: "embedding",
                expected: self.embedder.width(),
                actual: embedded.ncols(),
            });
        }
        Ok(embedded)
    }
}
