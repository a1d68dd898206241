//! Line-based undo used by the in-memory wiki.
//!
//! Handles the single-hunk case: the change from `target` to `candidate`
//! is located in `current` (with one line of context on each side) and
//! swapped back. Anything ambiguous is a conflict.

pub fn undo(target: &str, candidate: &str, current: &str) -> Option<String> {
    if current == candidate {
        return Some(target.to_string());
    }

    let t: Vec<&str> = target.split_inclusive('\n').collect();
    let c: Vec<&str> = candidate.split_inclusive('\n').collect();
    let cur: Vec<&str> = current.split_inclusive('\n').collect();

    let prefix = t.iter().zip(&c).take_while(|(a, b)| a == b).count();
    let max_suffix = t.len().min(c.len()) - prefix;
    let suffix = t
        .iter()
        .rev()
        .zip(c.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let c_mid = &c[prefix..c.len() - suffix];
    let t_mid = &t[prefix..t.len() - suffix];
    if c_mid.is_empty() && t_mid.is_empty() {
        // candidate changed nothing
        return Some(current.to_string());
    }

    let before = prefix.checked_sub(1).map(|i| c[i]);
    let after = (suffix > 0).then(|| c[c.len() - suffix]);

    let needle: Vec<&str> = before
        .into_iter()
        .chain(c_mid.iter().copied())
        .chain(after)
        .collect();
    if needle.is_empty() || cur.len() < needle.len() {
        return None;
    }

    let mut matches =
        (0..=cur.len() - needle.len()).filter(|&i| cur[i..i + needle.len()] == needle[..]);
    let start = matches.next()?;
    if matches.next().is_some() {
        return None;
    }

    let mut out: Vec<&str> = Vec::with_capacity(cur.len());
    out.extend_from_slice(&cur[..start]);
    out.extend(before);
    out.extend_from_slice(t_mid);
    out.extend(after);
    out.extend_from_slice(&cur[start + needle.len()..]);
    Some(out.concat())
}
