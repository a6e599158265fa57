/// Build a URL slug from a display name: lowercase alphanumeric runs joined
/// by single hyphens.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for c in input.chars() {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Candidate slugs for de-duplication: the base slug, then `base-2`,
/// `base-3`, ... Callers walk the sequence until one is free.
pub fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    (1u32..).map(move |n| {
        if n == 1 {
            base.to_string()
        } else {
            format!("{base}-{n}")
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_slugs() {
        assert_eq!(slugify("The Name of the Wind"), "the-name-of-the-wind");
        assert_eq!(slugify("  Dune!  "), "dune");
        assert_eq!(slugify("C++ for Rustaceans"), "c-for-rustaceans");
    }

    #[test]
    fn unicode_is_kept() {
        assert_eq!(slugify("Café Книга"), "café-книга");
    }

    #[test]
    fn candidates_append_counters() {
        let mut it = slug_candidates("dune");
        assert_eq!(it.next().unwrap(), "dune");
        assert_eq!(it.next().unwrap(), "dune-2");
        assert_eq!(it.next().unwrap(), "dune-3");
    }
}
