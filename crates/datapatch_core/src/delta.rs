use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeltaKind {
    Removed,
    Added,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaLine {
    /// 1-based line number in the version the text comes from.
    pub line: usize,
    pub kind: DeltaKind,
    pub text: String,
}

/// Line-by-line changes between a backup and the current dataset.
///
/// Value rewrites never add or remove lines, so lines are paired by
/// position; surplus lines on either side are reported as removed or added.
pub fn delta(before: &str, after: &str) -> Vec<DeltaLine> {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();
    let mut out = Vec::new();

    for idx in 0..old.len().max(new.len()) {
        let (a, b) = (old.get(idx), new.get(idx));
        if a == b {
            continue;
        }
        if let Some(a) = a {
            out.push(DeltaLine {
                line: idx + 1,
                kind: DeltaKind::Removed,
                text: a.trim().to_string(),
            });
        }
        if let Some(b) = b {
            out.push(DeltaLine {
                line: idx + 1,
                kind: DeltaKind::Added,
                text: b.trim().to_string(),
            });
        }
    }

    out
}

/// Number of changed lines, counting each removed/added pair once.
pub fn changed_lines(lines: &[DeltaLine]) -> usize {
    let removed = lines.iter().filter(|l| l.kind == DeltaKind::Removed).count();
    let added = lines.iter().filter(|l| l.kind == DeltaKind::Added).count();
    removed.max(added)
}
