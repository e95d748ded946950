//! Metadata normalization.
//!
//! Every fragment persisted in the collection carries a fully populated
//! metadata mapping, so the retriever can always filter and attribute
//! results. Normalization is pure: it augments, never rejects.

use crate::models::{Fragment, FragmentMeta, SourceKind};

const UNKNOWN: &str = "unknown";

/// Force the fragment's source kind and fill any missing required keys.
pub fn normalize(mut fragment: Fragment, kind: SourceKind) -> Fragment {
    fragment.meta = normalize_meta(fragment.meta, kind);
    fragment
}

/// Force `source` to the actual origin kind (overwriting a conflicting
/// input value) and default `file`/`path`/`module` to "unknown" on
/// code-origin metadata.
pub fn normalize_meta(mut meta: FragmentMeta, kind: SourceKind) -> FragmentMeta {
    meta.source = kind;
    if kind == SourceKind::Code {
        for slot in [&mut meta.file, &mut meta.path, &mut meta.module] {
            slot.get_or_insert_with(|| UNKNOWN.to_string());
        }
    }
    meta
}
