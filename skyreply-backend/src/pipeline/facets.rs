//! Hashtag text + facet construction.
//!
//! Facet offsets are UTF-8 byte offsets into the joined text, which is what
//! the richtext lexicon expects (not char or UTF-16 indices).

use crate::bluesky::types::{ByteSlice, Facet, FacetFeature};

/// Rendered reply text and the tag facets covering it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashtagFacets {
    pub text: String,
    pub facets: Vec<Facet>,
}

/// Join hashtags with single spaces and annotate each one.
///
/// Each facet spans the whole token including `#`; the recorded tag drops
/// the leading `#`.
pub fn build_facets<S: AsRef<str>>(hashtags: &[S]) -> HashtagFacets {
    let mut text = String::new();
    let mut facets = Vec::with_capacity(hashtags.len());

    for (i, tag) in hashtags.iter().enumerate() {
        let tag = tag.as_ref();
        if i > 0 {
            text.push(' ');
        }
        let byte_start = text.len();
        text.push_str(tag);

        facets.push(Facet {
            index: ByteSlice {
                byte_start,
                byte_end: text.len(),
            },
            features: vec![FacetFeature::Tag {
                tag: tag.strip_prefix('#').unwrap_or(tag).to_string(),
            }],
        });
    }

    HashtagFacets { text, facets }
}

/// Clean up hashtags coming back from the generator: trim, drop inner
/// whitespace, force a single leading `#`, discard empties.
pub fn normalize_hashtags<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    raw.iter()
        .filter_map(|tag| {
            let compact: String = tag.as_ref().chars().filter(|c| !c.is_whitespace()).collect();
            let bare = compact.trim_start_matches('#');
            if bare.is_empty() {
                None
            } else {
                Some(format!("#{}", bare))
            }
        })
        .collect()
}
