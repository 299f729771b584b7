//! Class index to name table scoped to one loaded model.

use std::collections::BTreeMap;

/// COCO class names (80 classes).
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck",
    "boat", "traffic light", "fire hydrant", "stop sign", "parking meter", "bench",
    "bird", "cat", "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra",
    "giraffe", "backpack", "umbrella", "handbag", "tie", "suitcase", "frisbee",
    "skis", "snowboard", "sports ball", "kite", "baseball bat", "baseball glove",
    "skateboard", "surfboard", "tennis racket", "bottle", "wine glass", "cup",
    "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink",
    "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier",
    "toothbrush",
];

/// Mapping from class index to human-readable name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassNames {
    names: BTreeMap<usize, String>,
}

impl ClassNames {
    /// The 80 COCO classes.
    pub fn coco() -> Self {
        Self::from_list(COCO_CLASSES.iter().copied())
    }

    /// Names indexed by position.
    pub fn from_list<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).enumerate().collect(),
        }
    }

    /// Parse the `names` metadata written by Ultralytics ONNX exports,
    /// e.g. `{0: 'person', 1: 'bicycle'}`.
    ///
    /// Returns `None` when the text is not a non-empty dict literal.
    pub fn parse_metadata(text: &str) -> Option<Self> {
        let body = text.trim().strip_prefix('{')?.strip_suffix('}')?;

        let mut names = BTreeMap::new();
        let mut rest = body.trim();
        while !rest.is_empty() {
            let (key, after_key) = rest.split_once(':')?;
            let index: usize = key.trim().parse().ok()?;

            let after_key = after_key.trim_start();
            let quote = after_key.chars().next().filter(|c| *c == '\'' || *c == '"')?;
            let value_start = &after_key[1..];
            let end = value_start.find(quote)?;
            names.insert(index, value_start[..end].to_string());

            rest = value_start[end + 1..].trim_start();
            rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
        }

        if names.is_empty() {
            None
        } else {
            Some(Self { names })
        }
    }

    /// Resolve an index, falling back to `class_<id>` for unknown indices.
    pub fn resolve(&self, class_id: usize) -> String {
        self.names
            .get(&class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
