//! Suggestions for misspelled keys and identifier checks.

/// The candidate nearest to `input` by edit distance, ignoring case.
/// Nothing is suggested when more than half of the longer string would
/// have to change.
pub(super) fn closest<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    let needle = input.to_lowercase();
    candidates
        .iter()
        .map(|&candidate| (candidate, edit_distance(&needle, &candidate.to_lowercase())))
        .min_by_key(|&(_, distance)| distance)
        .filter(|&(candidate, distance)| distance <= input.len().max(candidate.len()) / 2)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance over chars, one row at a time.
pub(super) fn edit_distance(a: &str, b: &str) -> usize {
    let target: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=target.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in target.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[target.len()]
}

/// Lowercase alphanumeric words joined by single hyphens.
pub(super) fn is_kebab_case(s: &str) -> bool {
    !s.is_empty()
        && s.split('-').all(|word| {
            !word.is_empty() && word.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        })
}
