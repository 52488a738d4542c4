//! Image variant tags and target sizes.

use serde::{Deserialize, Serialize};

/// Tag of the pseudo-variant that points at the unmodified source bytes.
pub const ORIGINAL_VARIANT: &str = "original";

/// A derived variant: a tag and the target longest side in pixels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSpec {
    /// Variant tag, e.g. "256". Unique per upload.
    pub tag: String,
    /// Target longest side in pixels. Sources smaller than this are not
    /// enlarged.
    pub longest_side: u32,
}

impl VariantSpec {
    /// Create a new variant spec.
    pub fn new(tag: impl Into<String>, longest_side: u32) -> Self {
        Self {
            tag: tag.into(),
            longest_side,
        }
    }

    /// File name of the encoded variant inside the session directory.
    pub fn file_name(&self) -> String {
        format!("{}.jpg", self.tag)
    }
}

/// The default variant ladder: 256, 512 and 1024 px longest side.
pub fn default_variants() -> Vec<VariantSpec> {
    vec![
        VariantSpec::new("256", 256),
        VariantSpec::new("512", 512),
        VariantSpec::new("1024", 1024),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder() {
        let variants = default_variants();
        assert_eq!(variants.len(), 3);
        assert_eq!(variants[0].tag, "256");
        assert_eq!(variants[2].longest_side, 1024);
    }

    #[test]
    fn test_file_name() {
        assert_eq!(VariantSpec::new("512", 512).file_name(), "512.jpg");
    }
}
