use std::collections::HashSet;

use crate::dataset::Dataset;
use crate::layout::{ByteRange, RecordSpan, ValueSite, validate_sites};
use crate::scanner::{self, SiteDepth, TextMap};
use crate::value::EditValue;

use super::types::{DiffEntry, EditIssue, EditRequest, EditResult, EditScope, Report};

/// Applies `edits` in order against the evolving text.
///
/// The literal map is built once and spliced after every rewrite, so a batch
/// scans the document for strings and comments only once.
pub fn apply_edits(mut dataset: Dataset, edits: &[EditRequest]) -> (Dataset, Vec<EditResult>) {
    let mut map = TextMap::build(&dataset.text);
    let mut results = Vec::with_capacity(edits.len());
    for edit in edits {
        let result = match &edit.scope {
            EditScope::Everywhere => apply_everywhere(&mut dataset.text, &mut map, edit),
            _ => apply_scoped(&mut dataset.text, &mut map, edit),
        };
        tracing::debug!(
            edit = %result.label(),
            occurrences = result.occurrences,
            rewritten = result.rewritten,
            "edit applied"
        );
        results.push(result);
    }
    (dataset, results)
}

fn rewrite(text: &mut String, map: &mut TextMap, range: ByteRange, rendered: &str) {
    text.replace_range(range.start..range.end, rendered);
    map.splice(range, rendered);
}

fn apply_scoped(text: &mut String, map: &mut TextMap, edit: &EditRequest) -> EditResult {
    let mut result = EditResult::pending(edit);
    let lookup = locate_scoped(text, map, &edit.scope, &edit.property);

    if lookup.records > 1 {
        tracing::warn!(edit = %result.label(), records = lookup.records, "record key is not unique");
        result.issues.push(EditIssue::DuplicateRecord {
            records: lookup.records,
        });
    }
    result.occurrences = lookup.occurrences;
    if lookup.occurrences > 1 {
        tracing::warn!(
            edit = %result.label(),
            occurrences = lookup.occurrences,
            "ambiguous property in record"
        );
        result.issues.push(EditIssue::AmbiguousMatch {
            occurrences: lookup.occurrences,
        });
    }
    let Some(site) = lookup.site else {
        result.issues.push(EditIssue::UnmatchedEdit);
        return result;
    };

    result.matched = true;
    result.previous = Some(site.value.slice(text).to_string());
    if !site.kind.is_primitive() {
        result.issues.push(EditIssue::NonPrimitiveTarget { sites: 1 });
        tracing::warn!(edit = %result.label(), "target holds an object or array; skipped");
        return result;
    }

    note_type_mismatch(&mut result, &site);
    let rendered = edit.value.render_for(site.kind);
    rewrite(text, map, site.value, &rendered);
    result.rewritten = 1;
    result.written = Some(rendered);
    result
}

#[derive(Debug, Default)]
struct ScopedLookup {
    records: usize,
    occurrences: usize,
    site: Option<ValueSite>,
}

/// Records `scope` names. A grouped scope only searches the direct children
/// of the first object opened by its category key.
fn scoped_records(
    text: &str,
    map: &TextMap,
    scope: &EditScope,
) -> Result<Vec<RecordSpan>, regex::Error> {
    match scope {
        EditScope::Record(key) => scanner::find_records(text, map, key),
        EditScope::Grouped { category, record } => {
            let groups = scanner::find_records(text, map, category)?;
            if groups.len() > 1 {
                tracing::warn!(
                    category = %category,
                    groups = groups.len(),
                    "category key is not unique"
                );
            }
            match groups.first() {
                Some(group) => scanner::find_records_in(
                    text,
                    map,
                    record,
                    group.body,
                    SiteDepth::DirectChildren,
                ),
                None => Ok(Vec::new()),
            }
        }
        EditScope::Everywhere => Ok(Vec::new()),
    }
}

/// First property site of the first record `scope` names.
fn locate_scoped(text: &str, map: &TextMap, scope: &EditScope, property: &str) -> ScopedLookup {
    let records = match scoped_records(text, map, scope) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(scope = ?scope, "could not build record pattern: {e}");
            return ScopedLookup::default();
        }
    };
    let Some(record) = records.first() else {
        return ScopedLookup::default();
    };

    let sites = match scanner::property_sites(
        text,
        map,
        property,
        record.body,
        SiteDepth::DirectChildren,
    ) {
        Ok(sites) => sites,
        Err(e) => {
            tracing::warn!(scope = ?scope, property, "could not build property pattern: {e}");
            Vec::new()
        }
    };

    ScopedLookup {
        records: records.len(),
        occurrences: sites.len(),
        site: sites.first().copied(),
    }
}

fn everywhere_sites(text: &str, map: &TextMap, property: &str) -> Option<Vec<ValueSite>> {
    let whole = ByteRange::new(0, text.len());
    match scanner::property_sites(text, map, property, whole, SiteDepth::Any) {
        Ok(sites) => Some(sites),
        Err(e) => {
            tracing::warn!(property, "could not build property pattern: {e}");
            None
        }
    }
}

fn apply_everywhere(text: &mut String, map: &mut TextMap, edit: &EditRequest) -> EditResult {
    let mut result = EditResult::pending(edit);
    let sites = everywhere_sites(text, map, &edit.property).unwrap_or_default();
    result.occurrences = sites.len();
    if sites.is_empty() {
        result.issues.push(EditIssue::UnmatchedEdit);
        return result;
    }
    result.matched = true;

    let (primitive, nested): (Vec<ValueSite>, Vec<ValueSite>) =
        sites.into_iter().partition(|site| site.kind.is_primitive());
    if !nested.is_empty() {
        result.issues.push(EditIssue::NonPrimitiveTarget {
            sites: nested.len(),
        });
    }
    if let Err(e) = validate_sites(&primitive, text.len()) {
        tracing::warn!(property = %edit.property, "unusable site layout: {e}");
        return result;
    }
    let Some(first) = primitive.first().copied() else {
        return result;
    };

    result.previous = Some(first.value.slice(text).to_string());
    note_type_mismatch(&mut result, &first);
    result.written = Some(edit.value.render_for(first.kind));

    // Back to front so earlier offsets stay valid.
    for site in primitive.iter().rev() {
        let rendered = edit.value.render_for(site.kind);
        rewrite(text, map, site.value, &rendered);
    }
    result.rewritten = primitive.len();
    result
}

fn note_type_mismatch(result: &mut EditResult, site: &ValueSite) {
    if result.value.conflicts_with(site.kind) {
        tracing::warn!(
            edit = %result.label(),
            existing = site.kind.as_str(),
            requested = result.value.type_name(),
            "value type differs from existing quoting"
        );
        result.issues.push(EditIssue::TypeMismatch {
            existing: site.kind.as_str().to_string(),
            requested: result.value.type_name().to_string(),
        });
    }
}

/// Re-locates every edit that rewrote something and checks its text.
///
/// Edits are checked newest first. A site is owned by the newest edit that
/// reaches it, so an older edit is only checked on the sites no later edit
/// rewrote. A site that can no longer be found fails the check.
pub fn verify(dataset: &Dataset, results: &[EditResult]) -> bool {
    let text = dataset.text();
    let map = TextMap::build(text);
    // Value offsets already owned by a later edit.
    let mut claimed: HashSet<usize> = HashSet::new();

    for result in results.iter().rev() {
        if result.rewritten == 0 {
            continue;
        }
        let ok = match &result.scope {
            EditScope::Everywhere => verify_everywhere(text, &map, result, &mut claimed),
            scope => verify_scoped(text, &map, scope, result, &mut claimed),
        };
        if !ok {
            tracing::error!(edit = %result.label(), "written value not found");
            return false;
        }
    }

    true
}

fn verify_scoped(
    text: &str,
    map: &TextMap,
    scope: &EditScope,
    result: &EditResult,
    claimed: &mut HashSet<usize>,
) -> bool {
    let Some(site) = locate_scoped(text, map, scope, &result.property).site else {
        return false;
    };
    !claimed.insert(site.value.start) || site_holds(text, &site, &result.value)
}

fn verify_everywhere(
    text: &str,
    map: &TextMap,
    result: &EditResult,
    claimed: &mut HashSet<usize>,
) -> bool {
    let Some(sites) = everywhere_sites(text, map, &result.property) else {
        return false;
    };
    let primitive: Vec<&ValueSite> = sites.iter().filter(|s| s.kind.is_primitive()).collect();
    if primitive.len() != result.rewritten {
        return false;
    }
    primitive
        .into_iter()
        .filter(|site| claimed.insert(site.value.start))
        .all(|site| site_holds(text, site, &result.value))
}

fn site_holds(text: &str, site: &ValueSite, value: &EditValue) -> bool {
    site.kind.is_primitive() && site.value.slice(text) == value.render_for(site.kind)
}

pub fn summarize(results: &[EditResult]) -> Report {
    let matched = results.iter().filter(|r| r.matched).count();
    let diff = results
        .iter()
        .filter(|r| r.rewritten > 0)
        .filter_map(|r| {
            Some(DiffEntry {
                label: r.label(),
                removed: r.previous.clone(),
                added: r.written.clone()?,
            })
        })
        .collect();

    Report {
        requested: results.len(),
        matched,
        unmatched: results.len() - matched,
        sites_changed: results.iter().map(|r| r.rewritten).sum(),
        warnings: results.iter().filter(|r| r.has_warnings()).count(),
        results: results.to_vec(),
        diff,
    }
}
