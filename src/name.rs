//! Segmented identifier with structural equality and lexicographic
//! ordering over parts, rendered as `a::b::c`.

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    parts: Vec<String>,
}

impl Name {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn root() -> Self {
        Self { parts: Vec::new() }
    }

    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    pub fn append<I, S>(&self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut new_parts = self.parts.clone();
        new_parts.extend(parts.into_iter().map(Into::into));
        Self { parts: new_parts }
    }

    pub fn prepend<I, S>(&self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut new_parts: Vec<String> = parts.into_iter().map(Into::into).collect();
        new_parts.extend(self.parts.clone());
        Self { parts: new_parts }
    }

    pub fn last_part(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.parts.join("::"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        assert_eq!(Name::new(["a", "b"]), Name::new(["a", "b"]));
        assert_ne!(Name::new(["a", "b"]), Name::new(["a", "c"]));
    }

    #[test]
    fn append_extends_parts() {
        let base = Name::new(["a", "b"]);
        assert_eq!(base.append(["c"]).parts(), ["a", "b", "c"]);
    }

    #[test]
    fn renders_with_double_colon() {
        assert_eq!(Name::new(["a", "b", "c"]).to_string(), "a::b::c");
    }

    #[test]
    fn ordering_is_lexicographic_over_parts() {
        assert!(Name::new(["a", "a"]) < Name::new(["a", "b"]));
        assert!(Name::new(["a"]) < Name::new(["a", "a"]));
    }
}
