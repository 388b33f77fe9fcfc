use automakeup::color::{lab8_to_rgb, rgb_to_lab8};
use automakeup::face::{BoundingBoxFinder, FaceExtractor, SimpleFaceExtractor};
use automakeup::feature::{ColorsFeatureExtractor, FeatureExtractor};
use automakeup::recommend::{EncodedRecommender, EncodingRecommender, KEYS};
use automakeup::segment::FaceParser;
use automakeup::shapes::{LabelMap, Rect};
use automakeup::{Error, Recommender, Result};
use image::{Rgb, RgbImage};
use ndarray::{Array1, Array2};
use std::collections::BTreeMap;

struct FixedFinder(Option<Rect>);

impl BoundingBoxFinder for FixedFinder {
    fn find(&self, _img: &RgbImage) -> Result<Option<Rect>> {
        Ok(self.0)
    }
}

struct FixedFeatures;

impl FeatureExtractor for FixedFeatures {
    fn labels(&self) -> Vec<String> {
        (0..12).map(|i| format!("f{i}")).collect()
    }

    fn extract_batch(&self, faces: &[&RgbImage]) -> Result<Array2<f32>> {
        let row = [
            200., 150., 120., 40., 30., 20., 180., 60., 70., -1., -1., -1.,
        ];
        Ok(Array2::from_shape_fn((faces.len(), 12), |(_, j)| row[j]))
    }
}

struct FixedMakeup;

impl EncodedRecommender for FixedMakeup {
    fn recommend(&self, features: &Array1<f32>) -> Result<Array1<f32>> {
        assert_eq!(features.len(), 12);
        Ok(Array1::from(vec![
            190., 20., 40., 80., 50., 100., 140., 90., 150., 230., 210., 220.,
        ]))
    }
}

#[test]
fn stubbed_pipeline_gives_named_colors() -> Result<()> {
    let recommender = EncodingRecommender::new(
        FixedFinder(Some(Rect::from_tl(20, 20, 40, 40))),
        SimpleFaceExtractor::new(64, 1.5),
        FixedFeatures,
        FixedMakeup,
    );
    let rec = recommender.recommend(&RgbImage::new(100, 100))?;

    let got: Vec<(&str, [u8; 3])> = rec.iter().collect();
    assert_eq!(
        got,
        vec![
            ("lipstick_color", [190, 20, 40]),
            ("eyeshadow_outer_color", [80, 50, 100]),
            ("eyeshadow_middle_color", [140, 90, 150]),
            ("eyeshadow_inner_color", [230, 210, 220]),
            ("skin", [200, 150, 120]),
            ("hair", [40, 30, 20]),
            ("lips", [180, 60, 70]),
            ("eyes", [0, 0, 0]),
        ]
    );
    assert_eq!(rec.len(), KEYS.len());

    let json = serde_json::to_value(&rec).map_err(Error::from)?;
    assert_eq!(json["lipstick_color"], serde_json::json!([190, 20, 40]));
    Ok(())
}

#[test]
fn no_face_is_an_error() {
    let recommender = EncodingRecommender::new(
        FixedFinder(None),
        SimpleFaceExtractor::default(),
        FixedFeatures,
        FixedMakeup,
    );
    assert!(matches!(
        recommender.recommend(&RgbImage::new(10, 10)),
        Err(Error::NoFace)
    ));
}

/// Labels every pixel by its red channel.
struct RedParser {
    codes: BTreeMap<i32, String>,
}

impl FaceParser for RedParser {
    fn codes(&self) -> &BTreeMap<i32, String> {
        &self.codes
    }

    fn parse(&self, images: &[&RgbImage]) -> Result<Vec<LabelMap>> {
        Ok(images
            .iter()
            .map(|img| {
                LabelMap::from_shape_fn((img.height() as usize, img.width() as usize), |(y, x)| {
                    img.get_pixel(x as u32, y as u32)[0] as i32
                })
            })
            .collect())
    }
}

#[test]
fn real_extractors_on_a_painted_face() -> Result<()> {
    let parser = RedParser {
        codes: [
            (0, "background"),
            (1, "skin"),
            (4, "l_eye"),
            (5, "r_eye"),
            (12, "u_lip"),
            (13, "l_lip"),
            (17, "hair"),
        ]
        .into_iter()
        .map(|(c, n)| (c, n.to_string()))
        .collect(),
    };
    let img = RgbImage::from_fn(120, 120, |x, y| match (x, y) {
        (_, 0..30) => Rgb([17, 30, 20]),
        (40..80, 90..100) => Rgb([12, 10, 90]),
        _ => Rgb([1, 150, 120]),
    });
    let face_extractor = SimpleFaceExtractor::new(120, 1.0);
    let face = face_extractor.extract(&img, Rect::from_tl(0, 0, 120, 120))?;
    assert_eq!(face.dimensions(), img.dimensions());

    let recommender = EncodingRecommender::new(
        FixedFinder(Some(Rect::from_tl(0, 0, 120, 120))),
        face_extractor,
        ColorsFeatureExtractor::new(parser)?,
        FixedMakeup,
    );
    let rec = recommender.recommend(&img)?;
    let through_lab = |c| Some(lab8_to_rgb(rgb_to_lab8(c)));
    assert_eq!(rec.get("skin"), through_lab([1, 150, 120]));
    assert_eq!(rec.get("hair"), through_lab([17, 30, 20]));
    assert_eq!(rec.get("lips"), through_lab([12, 10, 90]));
    // no eyes painted
    assert_eq!(rec.get("eyes"), Some([0, 0, 0]));
    Ok(())
}
