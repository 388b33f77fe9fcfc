use crate::cluster::{ClusterOrder, Clustering};
use crate::color::rgb_to_lab_pixel;
use crate::error::{Error, Result};
use crate::shapes::{LabelMap, Mask};
use crate::stage::Stage;
use image::RgbImage;
use palette::Lab;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Level, span, trace};

/// Face parsing network.
pub trait FaceParser: Send + Sync {
    /// Part name per code emitted by [`FaceParser::parse`].
    fn codes(&self) -> &BTreeMap<i32, String>;

    /// Code the parser uses for "no face part".
    fn background(&self) -> i32 {
        0
    }

    fn parse(&self, images: &[&RgbImage]) -> Result<Vec<LabelMap>>;
}

impl<P: FaceParser + ?Sized> FaceParser for Arc<P> {
    fn codes(&self) -> &BTreeMap<i32, String> {
        (**self).codes()
    }

    fn background(&self) -> i32 {
        (**self).background()
    }

    fn parse(&self, images: &[&RgbImage]) -> Result<Vec<LabelMap>> {
        (**self).parse(images)
    }
}

/// Source-to-target code table. Without a table source codes pass through.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentCodes {
    pub target: Option<BTreeMap<i32, i32>>,
    pub background: i32,
}

impl SegmentCodes {
    pub fn map(&self, code: i32) -> i32 {
        match &self.target {
            Some(target) => target.get(&code).copied().unwrap_or(self.background),
            None => code,
        }
    }
}

/// Image to segment plus the optional region it is restricted to.
#[derive(Debug, Clone, Copy)]
pub struct SegmentInput<'a> {
    pub image: &'a RgbImage,
    pub mask: Option<&'a Mask>,
}

impl<'a> SegmentInput<'a> {
    pub fn new(image: &'a RgbImage) -> SegmentInput<'a> {
        SegmentInput { image, mask: None }
    }

    pub fn masked(image: &'a RgbImage, mask: &'a Mask) -> SegmentInput<'a> {
        SegmentInput {
            image,
            mask: Some(mask),
        }
    }

    fn check(&self) -> Result<()> {
        if let Some(mask) = self.mask {
            let (h, w) = mask.dim();
            let actual = (w as u32, h as u32);
            if actual != self.image.dimensions() {
                return Err(Error::MaskShape {
                    expected: self.image.dimensions(),
                    actual,
                });
            }
        }
        Ok(())
    }

    fn selected(&self, y: usize, x: usize) -> bool {
        self.mask.is_none_or(|m| m[[y, x]])
    }
}

/// Labels faces with a parsing network, remapped to caller codes.
pub struct ParsingSegmenter<P> {
    parser: P,
    codes: SegmentCodes,
}

impl<P: FaceParser> ParsingSegmenter<P> {
    /// `parts` maps parser part names to output codes; `None` keeps parser codes.
    pub fn new(parser: P, parts: Option<&[(&str, i32)]>, background: i32) -> Result<Self> {
        let target = match parts {
            Some(parts) => {
                let by_name: BTreeMap<&str, i32> = parser
                    .codes()
                    .iter()
                    .map(|(code, name)| (name.as_str(), *code))
                    .collect();
                let mut target = BTreeMap::new();
                for (name, out) in parts {
                    let code = by_name
                        .get(name)
                        .ok_or_else(|| Error::UnknownPart(name.to_string()))?;
                    target.insert(*code, *out);
                }
                Some(target)
            }
            None => None,
        };

        Ok(ParsingSegmenter {
            parser,
            codes: SegmentCodes { target, background },
        })
    }

    pub fn codes(&self) -> &SegmentCodes {
        &self.codes
    }
}

impl<P: FaceParser> Stage for ParsingSegmenter<P> {
    type Input<'a> = SegmentInput<'a>;
    type Output = LabelMap;
    const BATCHABLE: bool = true;

    fn perform(&self, inputs: &[SegmentInput<'_>]) -> Result<Vec<LabelMap>> {
        let span = span!(Level::DEBUG, "parse", n = inputs.len());
        let _guard = span.enter();

        for input in inputs {
            input.check()?;
        }
        let images: Vec<&RgbImage> = inputs.iter().map(|i| i.image).collect();
        let parsed = self.parser.parse(&images)?;
        if parsed.len() != inputs.len() {
            return Err(Error::StageOutput {
                expected: inputs.len(),
                actual: parsed.len(),
            });
        }

        for (labels, input) in parsed.iter().zip(inputs) {
            let (h, w) = labels.dim();
            let actual = (w as u32, h as u32);
            if actual != input.image.dimensions() {
                return Err(Error::MaskShape {
                    expected: input.image.dimensions(),
                    actual,
                });
            }
        }

        let parser_bg = self.parser.background();
        Ok(parsed
            .into_iter()
            .zip(inputs)
            .map(|(labels, input)| {
                LabelMap::from_shape_fn(labels.dim(), |(y, x)| {
                    let code = labels[[y, x]];
                    if code == parser_bg || !input.selected(y, x) {
                        self.codes.background
                    } else {
                        self.codes.map(code)
                    }
                })
            })
            .collect())
    }
}

/// Labels pixels by clustering their Lab colors; cluster ranks are the
/// source codes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringSegmenter {
    clustering: Clustering,
    ordering: ClusterOrder,
    codes: SegmentCodes,
}

impl ClusteringSegmenter {
    pub fn new(
        clustering: Clustering,
        ordering: ClusterOrder,
        parts: Option<BTreeMap<i32, i32>>,
        background: i32,
    ) -> ClusteringSegmenter {
        ClusteringSegmenter {
            clustering,
            ordering,
            codes: SegmentCodes {
                target: parts,
                background,
            },
        }
    }

    fn segment(&self, input: &SegmentInput<'_>) -> Result<LabelMap> {
        input.check()?;
        let (w, h) = input.image.dimensions();
        let mut out = LabelMap::from_elem((h as usize, w as usize), self.codes.background);

        let mut positions = Vec::new();
        let mut pixels: Vec<Lab> = Vec::new();
        for (x, y, px) in input.image.enumerate_pixels() {
            if input.selected(y as usize, x as usize) {
                positions.push((y as usize, x as usize));
                pixels.push(rgb_to_lab_pixel(px.0));
            }
        }

        let Some(fit) = self.clustering.fit(&pixels) else {
            trace!(pixels = pixels.len(), "too few pixels to cluster");
            return Ok(out);
        };

        let ranks = self.ordering.ranks(&fit);
        for (pos, label) in positions.into_iter().zip(&fit.labels) {
            out[pos] = self.codes.map(ranks[*label] as i32);
        }
        Ok(out)
    }
}

impl Stage for ClusteringSegmenter {
    type Input<'a> = SegmentInput<'a>;
    type Output = LabelMap;
    const BATCHABLE: bool = false;

    fn perform(&self, inputs: &[SegmentInput<'_>]) -> Result<Vec<LabelMap>> {
        inputs.iter().map(|input| self.segment(input)).collect()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::shapes::empty_mask;
    use image::Rgb;

    /// Parser that labels pixels by their red channel.
    pub(crate) struct RedParser {
        codes: BTreeMap<i32, String>,
    }

    impl RedParser {
        pub(crate) fn new() -> RedParser {
            let names = [
                "background", "skin", "l_brow", "r_brow", "l_eye", "r_eye", "eye_g", "l_ear",
                "r_ear", "ear_r", "nose", "mouth", "u_lip", "l_lip", "neck", "neck_l", "cloth",
                "hair", "hat",
            ];
            RedParser {
                codes: names
                    .iter()
                    .enumerate()
                    .map(|(i, n)| (i as i32, n.to_string()))
                    .collect(),
            }
        }
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
                        (img.get_pixel(x as u32, y as u32)[0] as i32).min(18)
                    })
                })
                .collect())
        }
    }

    fn striped() -> RgbImage {
        // columns: background, skin, hair, u_lip
        RgbImage::from_fn(4, 2, |x, _| Rgb([[0, 1, 17, 12][x as usize], 0, 0]))
    }

    /// Answers with a fixed 2x2 map whatever the input size.
    struct TinyParser(RedParser);

    impl FaceParser for TinyParser {
        fn codes(&self) -> &BTreeMap<i32, String> {
            self.0.codes()
        }

        fn parse(&self, images: &[&RgbImage]) -> Result<Vec<LabelMap>> {
            Ok(images.iter().map(|_| LabelMap::from_elem((2, 2), 1)).collect())
        }
    }

    #[test]
    fn parser_output_must_match_image() -> Result<()> {
        let segmenter = ParsingSegmenter::new(TinyParser(RedParser::new()), None, 0)?;
        let img = RgbImage::new(4, 4);
        let mask = Mask::from_elem((4, 4), true);
        assert!(matches!(
            segmenter.call(SegmentInput::masked(&img, &mask)),
            Err(Error::MaskShape {
                expected: (4, 4),
                actual: (2, 2)
            })
        ));
        Ok(())
    }

    #[test]
    fn parsing_remaps_parts() -> Result<()> {
        let segmenter = ParsingSegmenter::new(
            RedParser::new(),
            Some(&[("skin", 1), ("hair", 2), ("u_lip", 3), ("l_lip", 3)]),
            0,
        )?;
        let img = striped();
        let labels = segmenter.call(SegmentInput::new(&img))?;
        assert_eq!(labels.row(0).to_vec(), vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn parsing_unknown_part() {
        let err = ParsingSegmenter::new(RedParser::new(), Some(&[("tail", 1)]), 0);
        assert!(matches!(err, Err(Error::UnknownPart(name)) if name == "tail"));
    }

    #[test]
    fn parsing_background_is_idempotent() -> Result<()> {
        let img = striped();
        let tables: [&[(&str, i32)]; 3] = [
            &[("skin", 1)],
            &[("background", 7), ("skin", 1)],
            &[("hair", -1), ("u_lip", 9)],
        ];
        for bg in [0, -1, 42] {
            for parts in tables {
                let segmenter = ParsingSegmenter::new(RedParser::new(), Some(parts), bg)?;
                let labels = segmenter.call(SegmentInput::new(&img))?;
                assert_eq!(labels[[0, 0]], bg);
                assert_eq!(labels[[1, 0]], bg);
            }
            let identity = ParsingSegmenter::new(RedParser::new(), None, bg)?;
            let labels = identity.call(SegmentInput::new(&img))?;
            assert_eq!(labels.row(0).to_vec(), vec![bg, 1, 17, 12]);
        }
        Ok(())
    }

    #[test]
    fn parsing_mask_forces_background() -> Result<()> {
        let img = striped();
        let mut mask = empty_mask(4, 2);
        mask[[0, 2]] = true;
        let segmenter = ParsingSegmenter::new(RedParser::new(), None, -1)?;
        let labels = segmenter.call(SegmentInput::masked(&img, &mask))?;
        assert_eq!(labels.row(0).to_vec(), vec![-1, -1, 17, -1]);
        assert!(labels.row(1).iter().all(|v| *v == -1));
        Ok(())
    }

    #[test]
    fn parsing_rejects_mismatched_mask() -> Result<()> {
        let img = striped();
        let mask = empty_mask(3, 3);
        let segmenter = ParsingSegmenter::new(RedParser::new(), None, 0)?;
        assert!(matches!(
            segmenter.call(SegmentInput::masked(&img, &mask)),
            Err(Error::MaskShape { .. })
        ));
        Ok(())
    }

    #[test]
    fn parsing_batch_matches_single() -> Result<()> {
        let a = striped();
        let b = RgbImage::from_pixel(4, 2, Rgb([17, 0, 0]));
        let segmenter = ParsingSegmenter::new(RedParser::new(), Some(&[("hair", 5)]), 0)?;
        let batch = segmenter.call_batch(&[SegmentInput::new(&a), SegmentInput::new(&b)])?;
        assert_eq!(batch[0], segmenter.call(SegmentInput::new(&a))?);
        assert!(batch[1].iter().all(|v| *v == 5));
        Ok(())
    }

    fn three_tones() -> RgbImage {
        RgbImage::from_fn(9, 3, |x, _| match x / 3 {
            0 => Rgb([230, 230, 230]),
            1 => Rgb([20, 20, 20]),
            _ => Rgb([120, 120, 120]),
        })
    }

    #[test]
    fn clustering_ranks_by_lightness() -> Result<()> {
        let segmenter =
            ClusteringSegmenter::new(Clustering::kmeans(3), ClusterOrder::FirstChannel, None, -1);
        let img = three_tones();
        let labels = segmenter.call(SegmentInput::new(&img))?;
        assert_eq!(labels.row(0).to_vec(), vec![2, 2, 2, 0, 0, 0, 1, 1, 1]);
        Ok(())
    }

    #[test]
    fn clustering_too_few_pixels_is_background() -> Result<()> {
        let segmenter =
            ClusteringSegmenter::new(Clustering::kmeans(3), ClusterOrder::FirstChannel, None, -1);
        let img = three_tones();

        let mut mask = empty_mask(9, 3);
        mask[[0, 0]] = true;
        mask[[0, 4]] = true;
        let labels = segmenter.call(SegmentInput::masked(&img, &mask))?;
        assert!(labels.iter().all(|v| *v == -1));

        let labels = segmenter.call(SegmentInput::masked(&img, &empty_mask(9, 3)))?;
        assert!(labels.iter().all(|v| *v == -1));
        Ok(())
    }

    #[test]
    fn clustering_remaps_ranks() -> Result<()> {
        let parts = BTreeMap::from([(0, 10), (2, 30)]);
        let segmenter = ClusteringSegmenter::new(
            Clustering::agglomerative(3),
            ClusterOrder::FirstChannel,
            Some(parts),
            0,
        );
        let img = three_tones();
        let mut mask = Mask::from_elem((3, 9), true);
        mask[[2, 8]] = false;
        let labels = segmenter.call(SegmentInput::masked(&img, &mask))?;
        assert_eq!(labels.row(0).to_vec(), vec![30, 30, 30, 10, 10, 10, 0, 0, 0]);
        assert_eq!(labels[[2, 8]], 0);
        Ok(())
    }
}
