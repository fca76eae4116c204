//! Hierarchical, restriction-filtered, additive-or-replace attribute
//! store with three scopes (local / sticky / pervasive).

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::Error;

/// A restriction or query context: tag -> value. A restriction
/// matches a context when every tag it names is present in the
/// context with an equal value; a tag missing from the context
/// disqualifies the match.
pub type Restriction = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl Value {
    pub fn as_list(&self) -> Vec<String> {
        match self {
            Value::List(l) => l.clone(),
            Value::Str(s) => vec![s.clone()],
            Value::Bool(b) => vec![b.to_string()],
        }
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    restriction: Restriction,
}

impl Entry {
    fn matches(&self, ctx: &Restriction) -> bool {
        self.restriction
            .iter()
            .all(|(tag, value)| ctx.get(tag) == Some(value))
    }
}

#[derive(Debug, Clone)]
struct Setting {
    entries: Vec<Entry>,
    is_sticky: bool,
    is_additive: bool,
}

struct SettingsData {
    settings: BTreeMap<String, Setting>,
    parent: Option<Settings>,
    is_pervasive: bool,
}

/// A scope in the hierarchical settings tree. Cheaply cloneable; all
/// clones refer to the same underlying scope.
#[derive(Clone)]
pub struct Settings(Rc<RefCell<SettingsData>>);

impl Settings {
    pub fn new_root(is_pervasive: bool) -> Self {
        Self(Rc::new(RefCell::new(SettingsData {
            settings: BTreeMap::new(),
            parent: None,
            is_pervasive,
        })))
    }

    /// A child scope nested under `self`.
    pub fn child(&self, is_pervasive: bool) -> Self {
        Self(Rc::new(RefCell::new(SettingsData {
            settings: BTreeMap::new(),
            parent: Some(self.clone()),
            is_pervasive,
        })))
    }

    fn add_entry(
        &self,
        name: &str,
        value: Value,
        restriction: Restriction,
        sticky: bool,
        additive: bool,
    ) -> Result<(), Error> {
        let mut data = self.0.borrow_mut();
        let setting = data
            .settings
            .entry(name.to_string())
            .or_insert_with(|| Setting {
                entries: Vec::new(),
                is_sticky: sticky,
                is_additive: additive,
            });
        if setting.is_sticky != sticky || setting.is_additive != additive {
            return Err(Error::ConflictingSetting(name.to_string()));
        }
        setting.entries.push(Entry { value, restriction });
        Ok(())
    }

    /// Local scope: visible only in this `Settings`, not inherited by
    /// children.
    pub fn add_local(&self, name: &str, value: Value, additive: bool) -> Result<(), Error> {
        self.add_entry(name, value, Restriction::new(), false, additive)
    }

    pub fn add_local_restricted(
        &self,
        name: &str,
        value: Value,
        restriction: Restriction,
        additive: bool,
    ) -> Result<(), Error> {
        self.add_entry(name, value, restriction, false, additive)
    }

    /// Sticky scope: visible here and inherited by descendants.
    pub fn add_sticky(&self, name: &str, value: Value, additive: bool) -> Result<(), Error> {
        self.add_entry(name, value, Restriction::new(), true, additive)
    }

    pub fn add_sticky_restricted(
        &self,
        name: &str,
        value: Value,
        restriction: Restriction,
        additive: bool,
    ) -> Result<(), Error> {
        self.add_entry(name, value, restriction, true, additive)
    }

    /// Pervasive scope: bubbles upward until a `Settings` marked
    /// pervasive is found, and is stored there.
    pub fn add_pervasive(&self, name: &str, value: Value, additive: bool) -> Result<(), Error> {
        if self.0.borrow().is_pervasive {
            return self.add_entry(name, value, Restriction::new(), true, additive);
        }
        let parent = self
            .0
            .borrow()
            .parent
            .clone()
            .expect("pervasive setting requires a pervasive ancestor in the settings chain");
        parent.add_pervasive(name, value, additive)
    }

    /// Resolve `name` under query context `ctx`. If `only_sticky` is
    /// set, a local (non-sticky) entry bound here is invisible.
    pub fn get(&self, name: &str, ctx: &Restriction, only_sticky: bool) -> Option<Value> {
        let data = self.0.borrow();
        if let Some(setting) = data.settings.get(name) {
            if !only_sticky || setting.is_sticky {
                let own = Self::resolve_matches(setting, ctx);
                if setting.is_additive {
                    if let Some(parent) = &data.parent {
                        let parent_value = parent.get(name, ctx, true);
                        let mut combined = match own {
                            Some(Value::List(l)) => l,
                            _ => Vec::new(),
                        };
                        if let Some(Value::List(p)) = parent_value {
                            combined.extend(p);
                        }
                        return Some(Value::List(combined));
                    }
                }
                return own;
            }
        }
        match &data.parent {
            Some(parent) => parent.get(name, ctx, true),
            None => None,
        }
    }

    fn resolve_matches(setting: &Setting, ctx: &Restriction) -> Option<Value> {
        let matching: Vec<&Entry> = setting.entries.iter().filter(|e| e.matches(ctx)).collect();
        if setting.is_additive {
            let mut combined = Vec::new();
            for entry in matching {
                combined.extend(entry.value.as_list());
            }
            Some(Value::List(combined))
        } else {
            assert!(
                matching.len() <= 1,
                "multiple non-additive entries match the same restriction"
            );
            matching.first().map(|e| e.value.clone())
        }
    }

    pub fn get_list(&self, name: &str, ctx: &Restriction) -> Vec<String> {
        self.get(name, ctx, false)
            .map(|v| v.as_list())
            .unwrap_or_default()
    }

    pub fn get_bool(&self, name: &str, ctx: &Restriction, default: bool) -> bool {
        self.get(name, ctx, false)
            .map(|v| v.as_bool())
            .unwrap_or(default)
    }

    pub fn get_str(&self, name: &str, ctx: &Restriction) -> Option<String> {
        self.get(name, ctx, false).and_then(|v| v.as_str().map(String::from))
    }
}

pub fn ctx(pairs: &[(&str, &str)]) -> Restriction {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_is_invisible_from_child() {
        let parent = Settings::new_root(false);
        parent.add_local("x", Value::Str("v".into()), false).unwrap();
        let child = parent.child(false);
        assert_eq!(child.get("x", &Restriction::new(), false), None);
    }

    #[test]
    fn additive_concatenates_child_before_parent() {
        let parent = Settings::new_root(false);
        parent
            .add_sticky("cflags", Value::List(vec!["-DFOO".into()]), true)
            .unwrap();
        let child = parent.child(false);
        child
            .add_local("cflags", Value::List(vec!["-DBAR".into()]), true)
            .unwrap();
        let resolved = child.get_list("cflags", &ctx(&[("toolchain", "gcc"), ("language", "c")]));
        assert_eq!(resolved, vec!["-DBAR".to_string(), "-DFOO".to_string()]);

        let sibling = parent.child(false);
        assert_eq!(
            sibling.get_list("cflags", &ctx(&[("toolchain", "gcc"), ("language", "c")])),
            vec!["-DFOO".to_string()]
        );
    }

    #[test]
    fn conflicting_shape_is_rejected() {
        let s = Settings::new_root(false);
        s.add_local("x", Value::Bool(true), false).unwrap();
        let err = s.add_sticky("x", Value::Bool(true), false).unwrap_err();
        assert!(matches!(err, Error::ConflictingSetting(_)));
    }

    #[test]
    fn restriction_missing_tag_disqualifies() {
        let s = Settings::new_root(false);
        s.add_local_restricted(
            "cflags",
            Value::List(vec!["-Wc".into()]),
            ctx(&[("language", "c")]),
            true,
        )
        .unwrap();
        assert_eq!(s.get_list("cflags", &ctx(&[("toolchain", "gcc")])), Vec::<String>::new());
        assert_eq!(
            s.get_list("cflags", &ctx(&[("language", "c"), ("toolchain", "gcc")])),
            vec!["-Wc".to_string()]
        );
    }

    #[test]
    fn pervasive_bubbles_to_pervasive_ancestor() {
        let root = Settings::new_root(true);
        let mid = root.child(false);
        let leaf = mid.child(false);
        leaf.add_pervasive("flag", Value::Bool(true), false).unwrap();
        assert_eq!(root.get("flag", &Restriction::new(), false), Some(Value::Bool(true)));
    }
}
